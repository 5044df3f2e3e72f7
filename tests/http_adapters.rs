//! Integration tests for the provider HTTP adapters using wiremock
//!
//! These tests run describe lookups and resource realization against a
//! mocked provider API, checking the wire format and how response codes
//! map onto transient and permanent failures.

use serde_json::json;
use stackwire::lookup::describe::{DescribeAdapter, DESCRIBE_NETWORK_INTERFACES};
use stackwire::lookup::{LookupAdapter, LookupKey, LookupRequest};
use stackwire::provider::{HttpRealizer, ProviderClient, ProviderError};
use stackwire::resolve::{Binding, Realize, ResourceNode, RetryPolicy, RunState, Scalar};
use stackwire::stack::StackDef;
use stackwire::{EngineOptions, ResolutionEngine};
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ProviderClient {
    ProviderClient::new(&server.uri(), Some("test-token".into())).expect("valid endpoint")
}

fn eni_request(id: &str) -> LookupRequest {
    let mut filters = BTreeMap::new();
    filters.insert("interface-type".to_string(), vec!["vpc_endpoint".to_string()]);
    LookupRequest {
        key: LookupKey {
            kind: DESCRIBE_NETWORK_INTERFACES.to_string(),
            identifiers: vec![id.to_string()],
            filters,
        },
        fields: Vec::new(),
    }
}

/// Test module for describe adapters
mod describe_tests {
    use super::*;

    /// Identifiers and filters are sent as indexed query parameters
    #[tokio::test]
    async fn test_describe_sends_indexed_query() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/describe-network-interfaces"))
            .and(bearer_token("test-token"))
            .and(query_param("NetworkInterfaceId.1", "eni-0123"))
            .and(query_param("Filter.1.Name", "interface-type"))
            .and(query_param("Filter.1.Value.1", "vpc_endpoint"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "NetworkInterfaces": [{"PrivateIpAddress": "10.0.1.25"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = DescribeAdapter::network_interfaces(client(&server));
        let document = adapter
            .execute(&eni_request("eni-0123"))
            .await
            .expect("describe should succeed");

        assert_eq!(
            document["NetworkInterfaces"][0]["PrivateIpAddress"],
            "10.0.1.25"
        );
    }

    /// 503 is transient, so the engine may retry it
    #[tokio::test]
    async fn test_503_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/describe-network-interfaces"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let adapter = DescribeAdapter::network_interfaces(client(&server));
        let err = adapter.execute(&eni_request("eni-0123")).await.unwrap_err();
        assert!(err.is_transient(), "{:?}", err);
    }

    /// 429 is transient as well
    #[tokio::test]
    async fn test_429_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/describe-network-interfaces"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let adapter = DescribeAdapter::network_interfaces(client(&server));
        let err = adapter.execute(&eni_request("eni-0123")).await.unwrap_err();
        assert!(err.is_transient(), "{:?}", err);
    }

    /// 404 for a missing identifier is permanent
    #[tokio::test]
    async fn test_404_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/describe-network-interfaces"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "InvalidNetworkInterfaceID.NotFound"}
            })))
            .mount(&server)
            .await;

        let adapter = DescribeAdapter::network_interfaces(client(&server));
        let err = adapter.execute(&eni_request("eni-gone")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)), "{:?}", err);
    }

    /// Empty identifiers never reach the provider
    #[tokio::test]
    async fn test_empty_identifier_rejected_locally() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = DescribeAdapter::network_interfaces(client(&server));
        let err = adapter.execute(&eni_request("  ")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }
}

/// Test module for resource realization
mod realizer_tests {
    use super::*;

    /// Resolved inputs are POSTed and scalar response members become attributes
    #[tokio::test]
    async fn test_realize_posts_inputs() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/resources/vpc-endpoint"))
            .and(body_partial_json(json!({
                "id": "vpce",
                "inputs": {"ServiceName": "execute-api", "PrivateDnsEnabled": false}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "VpcEndpointId": "vpce-0abc",
                "Tags": [{"Key": "ignored"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let realizer = Arc::new(HttpRealizer::new(client(&server)));
        let node = ResourceNode::new("vpce", "vpc-endpoint", realizer.clone());
        let mut inputs = BTreeMap::new();
        inputs.insert("ServiceName".to_string(), Scalar::from("execute-api"));
        inputs.insert("PrivateDnsEnabled".to_string(), Scalar::from(false));

        let attributes = realizer
            .realize(&node, &inputs)
            .await
            .expect("realize should succeed");

        assert_eq!(attributes.len(), 1);
        let Some(Binding::Value(id)) = attributes.get("VpcEndpointId") else {
            panic!("missing VpcEndpointId: {:?}", attributes);
        };
        assert_eq!(id, &Scalar::from("vpce-0abc"));
    }

    /// A non-object response cannot provide attributes
    #[tokio::test]
    async fn test_realize_rejects_non_object() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/resources/bucket"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["not", "an", "object"])))
            .mount(&server)
            .await;

        let realizer = Arc::new(HttpRealizer::new(client(&server)));
        let node = ResourceNode::new("b", "bucket", realizer.clone());
        let err = realizer.realize(&node, &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Permanent(_)));
    }
}

/// Test module for whole stacks applied against the mocked provider
mod stack_tests {
    use super::*;

    const STACK: &str = r#"
parameters:
  Service: execute-api
lookups:
  vpce:
    kind: describe-vpc-endpoints
    identifiers: [{ resource: vpce, attribute: VpcEndpointId }]
    fields: [VpcEndpoints.*.NetworkInterfaceIds.*]
  eni:
    kind: describe-network-interfaces
    identifiers: [{ lookup: vpce, path: VpcEndpoints.*.NetworkInterfaceIds.* }]
    filters: { interface-type: [vpc_endpoint] }
    fields: [NetworkInterfaces.*.PrivateIpAddress]
resources:
  - id: vpce
    type: vpc-endpoint
    inputs:
      ServiceName: { param: Service }
    outputs: [VpcEndpointId]
  - id: target
    type: target-group
    inputs:
      TargetIp: { lookup: eni, path: NetworkInterfaces.*.PrivateIpAddress }
      Port: 443
outputs:
  TargetIp: { lookup: eni, path: NetworkInterfaces.*.PrivateIpAddress }
"#;

    async fn mount_provider(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/resources/vpc-endpoint"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"VpcEndpointId": "vpce-0abc"})),
            )
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/describe-vpc-endpoints"))
            .and(query_param("VpcEndpointId.1", "vpce-0abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "VpcEndpoints": [{"NetworkInterfaceIds": ["eni-0123"]}]
            })))
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/resources/target-group"))
            .and(body_partial_json(json!({"inputs": {"TargetIp": "10.0.1.25", "Port": 443}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"TargetGroupArn": "arn:tg"})))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn apply(server: &MockServer) -> stackwire::RunReport {
        let client = client(server);
        let def = StackDef::parse(STACK).expect("valid stack");
        let compiled = def
            .compile(&BTreeMap::new(), Arc::new(HttpRealizer::new(client.clone())))
            .expect("stack compiles");
        let options = EngineOptions {
            retry: RetryPolicy::immediate(3),
            ..EngineOptions::default()
        };
        ResolutionEngine::new(
            compiled.graph.build().expect("acyclic"),
            def.adapters(&client),
            options,
        )
        .with_outputs(compiled.outputs)
        .run()
        .await
    }

    /// The ENI lookup fails twice with 503 and then succeeds within budget
    #[tokio::test]
    async fn test_chain_survives_transient_errors() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/describe-network-interfaces"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/describe-network-interfaces"))
            .and(query_param("NetworkInterfaceId.1", "eni-0123"))
            .and(query_param("Filter.1.Value.1", "vpc_endpoint"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "NetworkInterfaces": [{"PrivateIpAddress": "10.0.1.25"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_provider(&server).await;

        let report = apply(&server).await;

        assert!(report.is_success(), "{}", report.render());
        assert_eq!(report.realized, vec!["vpce", "target"]);
        assert_eq!(report.outputs["TargetIp"], Scalar::from("10.0.1.25"));
        assert_eq!(report.lookup_executions, 2);
    }

    /// A persistent 404 fails the consumer without realizing it
    #[tokio::test]
    async fn test_chain_stops_on_permanent_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/describe-network-interfaces"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/resources/vpc-endpoint"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"VpcEndpointId": "vpce-0abc"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/describe-vpc-endpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "VpcEndpoints": [{"NetworkInterfaceIds": ["eni-0123"]}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/resources/target-group"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let report = apply(&server).await;

        assert_eq!(report.state, RunState::Failed);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind.name(), "Permanent");
        assert!(report.outputs.is_empty());
    }
}
