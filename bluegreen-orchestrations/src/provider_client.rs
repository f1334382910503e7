//! REST binding of [`Provider`] for the cloud control plane

use std::time::Duration;

use async_trait::async_trait;
use bluegreen_models::{
    string_field, BackendEntry, BackendHealth, BackendKey, BackendSetRef, MutationReceipt,
    NetworkInterface, OperationError, OperationHandle, OperationStatus, TargetSpec,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::activities::resolve_targets::normalize_target_list;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::Provider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const OPERATION_HEADER: &str = "opc-work-request-id";
const RETRY_TOKEN_HEADER: &str = "opc-retry-token";

/// Control-plane client speaking JSON over HTTPS with bearer-token auth
pub struct HttpProvider {
    client: Client,
    base_url: String,
    token: String,
    compartment_id: String,
}

impl HttpProvider {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        compartment_id: impl Into<String>,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transient(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            compartment_id: compartment_id.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn backends_url(&self, set: &BackendSetRef) -> String {
        self.url(&format!(
            "/loadBalancers/{}/backendSets/{}/backends",
            set.load_balancer_id, set.name
        ))
    }

    fn backend_url(&self, set: &BackendSetRef, backend: &BackendKey) -> String {
        format!("{}/{}", self.backends_url(set), backend)
    }

    /// Send an authenticated request and decode the JSON body (`Null` when empty)
    async fn send(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> ProviderResult<(HeaderMap, Value)> {
        let response = request.bearer_auth(&self.token).send().await.map_err(|e| {
            ProviderError::Transient(format!("request for {} failed: {}", resource, e))
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| {
            ProviderError::Transient(format!("reading response for {} failed: {}", resource, e))
        })?;

        if !status.is_success() {
            return Err(classify_status(status, &body, resource));
        }
        if body.trim().is_empty() {
            return Ok((headers, Value::Null));
        }
        let value = serde_json::from_str(&body).map_err(|e| {
            ProviderError::Decode(format!("{} returned invalid JSON: {}", resource, e))
        })?;
        Ok((headers, value))
    }

    async fn mutate(
        &self,
        request: RequestBuilder,
        resource: &str,
        known_id: Option<&str>,
    ) -> ProviderResult<MutationReceipt> {
        let (headers, body) = self.send(request, resource).await?;
        let receipt = MutationReceipt {
            resource_id: string_field(&body, &["id"]).or_else(|| known_id.map(str::to_string)),
            operation: operation_handle(&headers, &body),
        };
        tracing::debug!(
            resource,
            resource_id = ?receipt.resource_id,
            operation = ?receipt.operation.as_ref().map(|op| op.as_str()),
            "Mutation accepted"
        );
        Ok(receipt)
    }
}

/// Map a non-success HTTP status to a provider error
pub fn classify_status(status: StatusCode, body: &str, resource: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| string_field(&v, &["message", "error"]))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => ProviderError::not_found(resource),
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::Transient(format!("throttled on {}: {}", resource, message))
        }
        s if s.is_server_error() => {
            ProviderError::Transient(format!("HTTP {} on {}: {}", s.as_u16(), resource, message))
        }
        s => ProviderError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

/// Operation handle from the `opc-work-request-id` header, else an
/// `operationId` body field
pub fn operation_handle(headers: &HeaderMap, body: &Value) -> Option<OperationHandle> {
    headers
        .get(OPERATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| string_field(body, &["operationId", "operation_id", "workRequestId"]))
        .map(OperationHandle)
}

pub fn parse_interface(raw: &Value) -> NetworkInterface {
    NetworkInterface {
        id: string_field(raw, &["id", "vnicId", "vnic_id"]),
        private_ip: string_field(raw, &["privateIp", "private_ip"]),
        public_ip: string_field(raw, &["publicIp", "public_ip"]),
    }
}

pub fn parse_backend(raw: &Value) -> Option<BackendEntry> {
    let address = string_field(raw, &["ipAddress", "ip_address", "address"]);
    let port = raw.get("port").and_then(Value::as_u64).and_then(|p| u16::try_from(p).ok());
    let key = match (address, port) {
        (Some(address), Some(port)) => BackendKey::new(address, port),
        // Fall back to the "address:port" backend name
        _ => {
            let name = string_field(raw, &["name"])?;
            let (address, port) = name.rsplit_once(':')?;
            BackendKey::new(address, port.parse().ok()?)
        }
    };
    let health = string_field(raw, &["health", "status"])
        .map(|s| BackendHealth::parse(&s))
        .unwrap_or(BackendHealth::Unknown);
    Some(BackendEntry { key, health })
}

fn list_items(raw: &Value, resource: &str) -> ProviderResult<Vec<Value>> {
    normalize_target_list(raw).ok_or_else(|| {
        ProviderError::Decode(format!("{} returned an unrecognized list shape", resource))
    })
}

#[async_trait]
impl Provider for HttpProvider {
    async fn list_targets(&self, name_filter: &str, page: Option<&str>) -> ProviderResult<Value> {
        let mut query = vec![
            ("compartmentId", self.compartment_id.as_str()),
            ("displayName", name_filter),
        ];
        if let Some(page) = page {
            query.push(("page", page));
        }
        let request = self.client.get(self.url("/containerInstances")).query(&query);
        let (headers, mut body) = self.send(request, "container instance list").await?;

        // Surface a header page token where the resolver looks for it
        if let Some(next) = headers.get("opc-next-page").and_then(|v| v.to_str().ok()) {
            body = match body {
                Value::Array(items) => json!({ "items": items, "opc-next-page": next }),
                Value::Object(mut map) => {
                    map.entry("opc-next-page").or_insert_with(|| Value::String(next.to_string()));
                    Value::Object(map)
                }
                other => other,
            };
        }
        Ok(body)
    }

    async fn get_target(&self, target_id: &str) -> ProviderResult<Value> {
        let request = self.client.get(self.url(&format!("/containerInstances/{}", target_id)));
        let (_, body) = self.send(request, &format!("target {}", target_id)).await?;
        Ok(body)
    }

    async fn create_target(
        &self,
        spec: &TargetSpec,
        retry_token: &str,
    ) -> ProviderResult<MutationReceipt> {
        let request = self
            .client
            .post(self.url("/containerInstances"))
            .header(RETRY_TOKEN_HEADER, retry_token)
            .json(spec);
        self.mutate(request, &format!("create {}", spec.display_name), None).await
    }

    async fn update_target(
        &self,
        target_id: &str,
        spec: &TargetSpec,
    ) -> ProviderResult<MutationReceipt> {
        let request = self
            .client
            .put(self.url(&format!("/containerInstances/{}", target_id)))
            .json(spec);
        self.mutate(request, &format!("target {}", target_id), Some(target_id)).await
    }

    async fn delete_target(&self, target_id: &str) -> ProviderResult<MutationReceipt> {
        let request = self.client.delete(self.url(&format!("/containerInstances/{}", target_id)));
        self.mutate(request, &format!("target {}", target_id), Some(target_id)).await
    }

    async fn get_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> ProviderResult<OperationStatus> {
        let request = self.client.get(self.url(&format!("/workRequests/{}", operation)));
        let (_, body) = self.send(request, &format!("operation {}", operation)).await?;
        string_field(&body, &["status", "state"])
            .map(|s| OperationStatus::parse(&s))
            .ok_or_else(|| ProviderError::Decode(format!("operation {} has no status", operation)))
    }

    async fn list_operation_errors(
        &self,
        operation: &OperationHandle,
    ) -> ProviderResult<Vec<OperationError>> {
        let resource = format!("operation {} errors", operation);
        let request = self.client.get(self.url(&format!("/workRequests/{}/errors", operation)));
        let (_, body) = self.send(request, &resource).await?;
        Ok(list_items(&body, &resource)?
            .iter()
            .map(|raw| OperationError {
                code: string_field(raw, &["code"]).unwrap_or_else(|| "UNKNOWN".to_string()),
                message: string_field(raw, &["message"]).unwrap_or_default(),
                timestamp: string_field(raw, &["timestamp"]),
            })
            .collect())
    }

    async fn list_network_interfaces_for_target(
        &self,
        target_id: &str,
    ) -> ProviderResult<Vec<NetworkInterface>> {
        let resource = format!("target {} interfaces", target_id);
        let request = self
            .client
            .get(self.url(&format!("/containerInstances/{}/networkInterfaces", target_id)));
        let (_, body) = self.send(request, &resource).await?;
        Ok(list_items(&body, &resource)?.iter().map(parse_interface).collect())
    }

    async fn get_network_interface(&self, interface_id: &str) -> ProviderResult<NetworkInterface> {
        let request = self.client.get(self.url(&format!("/vnics/{}", interface_id)));
        let (_, body) = self.send(request, &format!("interface {}", interface_id)).await?;
        Ok(parse_interface(&body))
    }

    async fn list_backends(&self, set: &BackendSetRef) -> ProviderResult<Vec<BackendEntry>> {
        let resource = format!("backend set {}", set);
        let request = self.client.get(self.backends_url(set));
        let (_, body) = self.send(request, &resource).await?;
        Ok(list_items(&body, &resource)?.iter().filter_map(parse_backend).collect())
    }

    async fn create_backend(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
        retry_token: &str,
    ) -> ProviderResult<MutationReceipt> {
        let request = self
            .client
            .post(self.backends_url(set))
            .header(RETRY_TOKEN_HEADER, retry_token)
            .json(&json!({
                "ipAddress": backend.address,
                "port": backend.port,
                "weight": 1,
                "backup": false,
                "drain": false,
                "offline": false,
            }));
        self.mutate(request, &format!("backend {}", backend), None).await
    }

    async fn delete_backend(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<MutationReceipt> {
        let request = self.client.delete(self.backend_url(set, backend));
        self.mutate(request, &format!("backend {}", backend), None).await
    }

    async fn get_backend(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<BackendEntry> {
        let resource = format!("backend {}", backend);
        let request = self.client.get(self.backend_url(set, backend));
        let (_, body) = self.send(request, &resource).await?;
        parse_backend(&body)
            .ok_or_else(|| ProviderError::Decode(format!("{} has no address", resource)))
    }

    async fn get_backend_health(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<BackendHealth> {
        let resource = format!("backend {} health", backend);
        let request = self.client.get(format!("{}/health", self.backend_url(set, backend)));
        let (_, body) = self.send(request, &resource).await?;
        Ok(string_field(&body, &["status", "health"])
            .map(|s| BackendHealth::parse(&s))
            .unwrap_or(BackendHealth::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::NOT_FOUND, "", "target t-1").is_not_found());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "", "x").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "upstream", "x").is_transient());

        let body = r#"{"code":"Conflict","message":"busy"}"#;
        let err = classify_status(StatusCode::CONFLICT, body, "x");
        assert_eq!(
            err,
            ProviderError::Api {
                status: 409,
                message: "busy".to_string()
            }
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_operation_handle_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(OPERATION_HEADER, HeaderValue::from_static("wr-header"));
        let body = json!({ "operationId": "wr-body" });

        assert_eq!(
            operation_handle(&headers, &body),
            Some(OperationHandle("wr-header".to_string()))
        );
        assert_eq!(
            operation_handle(&HeaderMap::new(), &body),
            Some(OperationHandle("wr-body".to_string()))
        );
        assert_eq!(operation_handle(&HeaderMap::new(), &Value::Null), None);
    }

    #[test]
    fn test_parse_backend_from_fields_or_name() {
        let entry = parse_backend(&json!({ "ipAddress": "10.0.0.5", "port": 8080 })).unwrap();
        assert_eq!(entry.key, BackendKey::new("10.0.0.5", 8080));
        assert_eq!(entry.health, BackendHealth::Unknown);

        let entry = parse_backend(&json!({ "name": "10.0.0.6:9090", "status": "ok" })).unwrap();
        assert_eq!(entry.key, BackendKey::new("10.0.0.6", 9090));
        assert_eq!(entry.health, BackendHealth::Ok);

        assert!(parse_backend(&json!({ "name": "nonsense" })).is_none());
    }

    #[test]
    fn test_parse_interface() {
        let nic = parse_interface(&json!({ "vnicId": "vnic-1", "privateIp": "10.0.0.7" }));
        assert_eq!(nic.id.as_deref(), Some("vnic-1"));
        assert_eq!(nic.private_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(nic.public_ip, None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = HttpProvider::new("https://api.test/v1/", "t", "c").unwrap();
        let set = BackendSetRef {
            load_balancer_id: "lb-1".to_string(),
            name: "app".to_string(),
        };
        assert_eq!(
            provider.backend_url(&set, &BackendKey::new("10.0.0.5", 8080)),
            "https://api.test/v1/loadBalancers/lb-1/backendSets/app/backends/10.0.0.5:8080"
        );
    }
}
