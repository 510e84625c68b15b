//! HTTP client for the compute API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{compute_endpoint, ImportConfig};
use crate::error::{ImportError, ImportResult};
use crate::types::{Template, TemplateId};

use super::{ComputeProvider, OperationHandle, OperationStatus, RequestSigner, TemplateRequest};

/// Template registration body.
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct RegisterTemplateBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    url: &'a str,
    checksum: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_user: Option<&'a str>,
    boot_mode: &'a str,
    password_enabled: bool,
    ssh_key_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintainer: Option<&'a str>,
}

impl<'a> From<&'a TemplateRequest> for RegisterTemplateBody<'a> {
    fn from(request: &'a TemplateRequest) -> Self {
        Self {
            name: &request.name,
            description: request.description.as_deref(),
            url: &request.url,
            checksum: &request.checksum,
            default_user: request.username.as_deref(),
            boot_mode: &request.boot_mode,
            password_enabled: request.password_enabled,
            ssh_key_enabled: request.ssh_key_enabled,
            build: request.build.as_deref(),
            version: request.version.as_deref(),
            maintainer: request.maintainer.as_deref(),
        }
    }
}

/// Raw operation response from the compute API.
#[derive(Debug, Deserialize)]
struct RawOperation {
    id: String,
    state: String,
    reference: Option<RawReference>,
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    id: String,
}

/// Raw template response from the compute API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawTemplate {
    id: String,
    name: String,
    checksum: Option<String>,
    created_at: Option<DateTime<Utc>>,
    state: Option<String>,
}

/// Classified operation state.
#[derive(Debug, PartialEq, Eq)]
enum OperationState {
    Pending,
    Success { reference: String },
    Failure { detail: String },
}

impl RawOperation {
    fn classify(&self) -> ImportResult<OperationState> {
        match self.state.as_str() {
            "pending" => Ok(OperationState::Pending),
            "success" => {
                let reference = self.reference.as_ref().ok_or_else(|| {
                    ImportError::compute(format!(
                        "operation {} succeeded without a template reference",
                        self.id
                    ))
                })?;
                Ok(OperationState::Success {
                    reference: reference.id.clone(),
                })
            }
            "failure" => Ok(OperationState::Failure {
                detail: self
                    .message
                    .clone()
                    .or_else(|| self.reason.clone())
                    .unwrap_or_else(|| "unknown failure".to_owned()),
            }),
            "timeout" => Ok(OperationState::Failure {
                detail: "operation timed out on the provider".to_owned(),
            }),
            other => Err(ImportError::compute(format!(
                "operation {} reported unknown state {other:?}",
                self.id
            ))),
        }
    }
}

/// Environment and home zone, used to reach the API of other zones.
#[derive(Debug, Clone)]
struct ZoneRouting {
    environment: String,
    zone: String,
}

/// HTTP client for the compute API.
///
/// The API is zonal. Clients built from configuration send requests for
/// another zone to that zone's endpoint; clients built with a custom URL
/// send everything there.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    client: Client,
    base_url: Url,
    signer: RequestSigner,
    routing: Option<ZoneRouting>,
}

fn parse_base_url(url: &str) -> ImportResult<Url> {
    Url::parse(&format!("{}/", url.trim_end_matches('/')))
        .map_err(|e| ImportError::config(format!("invalid compute endpoint: {e}")))
}

impl ComputeClient {
    /// Create a new compute client from configuration.
    pub fn new(config: &ImportConfig) -> ImportResult<Self> {
        let signer = RequestSigner::new(config.api_key.clone(), config.api_secret.clone());
        let mut client = Self::with_url(
            config.compute_endpoint(),
            signer,
            Duration::from_secs(config.registration.request_timeout_secs),
        )?;
        client.routing = Some(ZoneRouting {
            environment: config.api_environment.clone(),
            zone: config.zone.clone(),
        });
        Ok(client)
    }

    /// Create a new compute client with a custom base URL.
    pub fn with_url(
        url: impl AsRef<str>,
        signer: RequestSigner,
        timeout: Duration,
    ) -> ImportResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        let base_url = parse_base_url(url.as_ref())?;

        Ok(Self {
            client,
            base_url,
            signer,
            routing: None,
        })
    }

    fn url(&self, zone: &str, path: &str) -> ImportResult<Url> {
        let base = match &self.routing {
            Some(routing) if routing.zone != zone => {
                parse_base_url(&compute_endpoint(&routing.environment, zone))?
            }
            _ => self.base_url.clone(),
        };

        base.join(path.trim_start_matches('/'))
            .map_err(|e| ImportError::internal(format!("invalid request path {path:?}: {e}")))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        zone: &str,
        method: Method,
        path: &str,
        body: Vec<u8>,
    ) -> ImportResult<T> {
        let url = self.url(zone, path)?;
        let authorization = self
            .signer
            .authorize(method.as_str(), url.path(), &body)?;

        debug!(method = %method, url = %url, "compute API request");

        let response = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ImportError::compute(format!(
                "{method} {path} failed: {status}: {detail}"
            )));
        }

        Ok(response.json().await?)
    }

    async fn get_template(&self, zone: &str, id: &str) -> ImportResult<RawTemplate> {
        self.send(zone, Method::GET, &format!("template/{id}"), Vec::new())
            .await
    }
}

#[async_trait]
impl ComputeProvider for ComputeClient {
    async fn create_template(&self, request: &TemplateRequest) -> ImportResult<OperationHandle> {
        let body = serde_json::to_vec(&RegisterTemplateBody::from(request))
            .map_err(|e| ImportError::internal(format!("failed to serialise request: {e}")))?;

        let operation: RawOperation = self
            .send(&request.zone, Method::POST, "template", body)
            .await?;

        Ok(OperationHandle {
            id: operation.id,
            zone: request.zone.clone(),
        })
    }

    async fn poll_operation(&self, handle: &OperationHandle) -> ImportResult<OperationStatus> {
        let operation: RawOperation = self
            .send(
                &handle.zone,
                Method::GET,
                &format!("operation/{}", handle.id),
                Vec::new(),
            )
            .await?;

        match operation.classify()? {
            OperationState::Pending => Ok(OperationStatus::Pending),
            OperationState::Failure { detail } => Ok(OperationStatus::Failed { detail }),
            OperationState::Success { reference } => {
                let raw = self.get_template(&handle.zone, &reference).await?;
                Ok(OperationStatus::Succeeded(Template {
                    id: TemplateId::new(raw.id),
                    name: raw.name,
                    checksum: raw.checksum.unwrap_or_default(),
                    zone: handle.zone.clone(),
                    created_at: raw.created_at,
                    state: raw.state,
                }))
            }
        }
    }

    async fn delete_template(&self, zone: &str, id: &TemplateId) -> ImportResult<()> {
        let operation: RawOperation = self
            .send(zone, Method::DELETE, &format!("template/{id}"), Vec::new())
            .await?;

        match operation.classify()? {
            OperationState::Failure { detail } => Err(ImportError::compute(format!(
                "failed to delete template {id}: {detail}"
            ))),
            OperationState::Pending | OperationState::Success { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn client() -> ComputeClient {
        ComputeClient::with_url(
            "https://api-ch-gva-2.exoscale.com/v2/",
            RequestSigner::new("EXOkey", SecretString::from("secret".to_owned())),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    fn operation(json: &str) -> RawOperation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn request_urls_keep_api_prefix() {
        let url = client().url("ch-gva-2", "operation/abc").unwrap();
        assert_eq!(url.as_str(), "https://api-ch-gva-2.exoscale.com/v2/operation/abc");
        assert_eq!(url.path(), "/v2/operation/abc");
    }

    #[test]
    fn configured_client_routes_requests_by_zone() {
        let config = ImportConfig {
            api_key: "EXOkey".to_owned(),
            api_secret: SecretString::from("secret".to_owned()),
            zone: "ch-gva-2".to_owned(),
            ..ImportConfig::default()
        };
        let client = ComputeClient::new(&config).unwrap();

        let home = client.url("ch-gva-2", "template/tmpl-123").unwrap();
        assert_eq!(
            home.as_str(),
            "https://api-ch-gva-2.exoscale.com/v2/template/tmpl-123"
        );

        let other = client.url("de-fra-1", "template/tmpl-123").unwrap();
        assert_eq!(
            other.as_str(),
            "https://api-de-fra-1.exoscale.com/v2/template/tmpl-123"
        );
        assert_eq!(other.path(), "/v2/template/tmpl-123");
    }

    #[test]
    fn custom_url_client_ignores_zone() {
        let url = client().url("de-fra-1", "template/tmpl-123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api-ch-gva-2.exoscale.com/v2/template/tmpl-123"
        );
    }

    #[test]
    fn register_body_uses_api_field_names() {
        let request = TemplateRequest {
            name: "my-template".to_owned(),
            description: None,
            url: "https://sos-ch-gva-2.exo.io/tmp/disk.img".to_owned(),
            checksum: "abc".to_owned(),
            zone: "ch-gva-2".to_owned(),
            username: Some("debian".to_owned()),
            boot_mode: "uefi".to_owned(),
            password_enabled: false,
            ssh_key_enabled: true,
            build: None,
            version: None,
            maintainer: None,
        };

        let body = serde_json::to_value(RegisterTemplateBody::from(&request)).unwrap();

        assert_eq!(body["default-user"], "debian");
        assert_eq!(body["boot-mode"], "uefi");
        assert_eq!(body["password-enabled"], false);
        assert_eq!(body["ssh-key-enabled"], true);
        assert!(body.get("description").is_none());
    }

    #[test]
    fn classify_operation_states() {
        assert_eq!(
            operation(r#"{"id":"op-1","state":"pending"}"#).classify().unwrap(),
            OperationState::Pending
        );
        assert_eq!(
            operation(r#"{"id":"op-1","state":"success","reference":{"id":"tmpl-123"}}"#)
                .classify()
                .unwrap(),
            OperationState::Success {
                reference: "tmpl-123".to_owned()
            }
        );
        assert_eq!(
            operation(r#"{"id":"op-1","state":"failure","message":"invalid image format"}"#)
                .classify()
                .unwrap(),
            OperationState::Failure {
                detail: "invalid image format".to_owned()
            }
        );
        assert!(matches!(
            operation(r#"{"id":"op-1","state":"timeout"}"#).classify(),
            Ok(OperationState::Failure { .. })
        ));
    }

    #[test]
    fn classify_rejects_inconsistent_operations() {
        assert!(operation(r#"{"id":"op-1","state":"success"}"#)
            .classify()
            .is_err());
        assert!(operation(r#"{"id":"op-1","state":"exploded"}"#)
            .classify()
            .is_err());
    }

    #[test]
    fn raw_template_parses_timestamps() {
        let raw: RawTemplate = serde_json::from_str(
            r#"{"id":"tmpl-123","name":"my-template","checksum":"abc","created-at":"2024-05-01T10:00:00Z","state":"ready"}"#,
        )
        .unwrap();
        assert_eq!(raw.id, "tmpl-123");
        assert!(raw.created_at.is_some());
    }
}
