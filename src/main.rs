/// Version injected at compile time via STACKWIRE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("STACKWIRE_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use stackwire::config::Config;
use stackwire::provider::{HttpRealizer, ProviderClient, ProviderError};
use stackwire::resolve::{Attributes, Realize, ResourceNode};
use stackwire::stack::StackDef;
use stackwire::{ResolutionEngine, Scalar};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Resolve and apply declarative stacks with deferred attributes
#[derive(Parser, Debug)]
#[command(name = "stackwire", version = VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Provider API endpoint (overrides config)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the apply order without contacting the provider
    Plan(StackArgs),
    /// Resolve and realize every resource of a stack
    Apply {
        #[command(flatten)]
        stack: StackArgs,

        /// Nodes realized at once (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Keep realizing independent nodes after a failure
        #[arg(long)]
        keep_going: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct StackArgs {
    /// Stack file (YAML)
    stack: PathBuf,

    /// Override a stack parameter
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("stackwire {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("stackwire").join("stackwire.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".stackwire").join("stackwire.log");
    }
    PathBuf::from("stackwire.log")
}

/// Stands in for the provider when only planning
struct PlanOnly;

#[async_trait]
impl Realize for PlanOnly {
    async fn realize(
        &self,
        node: &ResourceNode,
        _inputs: &BTreeMap<String, Scalar>,
    ) -> Result<Attributes, ProviderError> {
        Err(ProviderError::Permanent(format!(
            "{} cannot be realized while planning",
            node.id()
        )))
    }
}

fn overrides(params: &[(String, String)]) -> BTreeMap<String, String> {
    params.iter().cloned().collect()
}

fn plan(stack: &StackArgs) -> Result<()> {
    let def = StackDef::load(&stack.stack)?;
    let compiled = def.compile(&overrides(&stack.params), Arc::new(PlanOnly))?;
    let plan = compiled.graph.build()?;

    println!("Apply order ({} resources):", plan.len());
    for (i, planned) in plan.nodes().iter().enumerate() {
        let deps = plan.dependencies_of(planned.node.id());
        if deps.is_empty() {
            println!("  {}. {} ({})", i + 1, planned.node.id(), planned.node.resource_type());
        } else {
            println!(
                "  {}. {} ({}) after {}",
                i + 1,
                planned.node.id(),
                planned.node.resource_type(),
                deps.join(", ")
            );
        }
    }
    if !compiled.outputs.is_empty() {
        println!("Outputs:");
        for (name, binding) in &compiled.outputs {
            println!("  {} = {}", name, binding);
        }
    }
    Ok(())
}

async fn apply(
    config: &Config,
    endpoint: Option<&str>,
    stack: &StackArgs,
    concurrency: Option<usize>,
    keep_going: bool,
    json: bool,
) -> Result<()> {
    let Some(endpoint) = config.effective_endpoint(endpoint) else {
        bail!("No provider endpoint configured (use --endpoint or set it in the config file)");
    };
    let client = ProviderClient::new(&endpoint, config.effective_token())?;

    let def = StackDef::load(&stack.stack)?;
    let realizer = Arc::new(HttpRealizer::new(client.clone()));
    let compiled = def.compile(&overrides(&stack.params), realizer)?;
    let plan = compiled.graph.build()?;

    let mut options = config.engine_options();
    if let Some(concurrency) = concurrency {
        options.max_concurrency = concurrency.max(1);
    }
    if keep_going {
        options.fail_fast = false;
    }

    let mut engine =
        ResolutionEngine::new(plan, def.adapters(&client), options).with_outputs(compiled.outputs);
    let report = engine.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }

    if !report.is_success() {
        bail!("run {} failed", report.run_id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: {:#}", err);
            None
        }
    };

    let config = Config::load();

    let result = match &args.command {
        Command::Plan(stack) => plan(stack),
        Command::Apply {
            stack,
            concurrency,
            keep_going,
            json,
        } => {
            apply(
                &config,
                args.endpoint.as_deref(),
                stack,
                *concurrency,
                *keep_going,
                *json,
            )
            .await
        }
    };

    if let Err(err) = result {
        tracing::error!("{:#}", err);
        eprintln!("Error: {:#}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
