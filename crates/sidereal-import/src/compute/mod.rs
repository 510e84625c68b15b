//! Compute provider clients for template registration.
//!
//! Registration is asynchronous on the provider side: creating a template
//! returns an [`OperationHandle`] that has to be polled until it reports
//! success or failure.

mod client;
mod memory;
mod signer;

pub use client::ComputeClient;
pub use memory::{MemoryCompute, RegistrationBehaviour};
pub use signer::RequestSigner;

use async_trait::async_trait;

use crate::config::ImportConfig;
use crate::error::ImportResult;
use crate::types::{Template, TemplateId, UploadedObject};

/// Parameters for creating a template from an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRequest {
    /// Template name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// URL the provider downloads the image from.
    pub url: String,
    /// Hex-encoded MD5 of the image.
    pub checksum: String,
    /// Zone to register the template in.
    pub zone: String,
    /// Default user account.
    pub username: Option<String>,
    /// Boot mode.
    pub boot_mode: String,
    /// Whether password authentication is enabled.
    pub password_enabled: bool,
    /// Whether SSH key injection is enabled.
    pub ssh_key_enabled: bool,
    /// Build identifier.
    pub build: Option<String>,
    /// Version.
    pub version: Option<String>,
    /// Maintainer.
    pub maintainer: Option<String>,
}

impl TemplateRequest {
    /// Build a request for `uploaded` using the configured template metadata.
    #[must_use]
    pub fn new(config: &ImportConfig, uploaded: &UploadedObject) -> Self {
        let template = &config.template;
        Self {
            name: template.name.clone(),
            description: template.description.clone(),
            url: uploaded.url.clone(),
            checksum: uploaded.checksum.clone(),
            zone: config.zone.clone(),
            username: template.username.clone(),
            boot_mode: template.boot_mode.clone(),
            password_enabled: !template.disable_password,
            ssh_key_enabled: !template.disable_ssh_key,
            build: template.build.clone(),
            version: template.version.clone(),
            maintainer: template.maintainer.clone(),
        }
    }
}

/// Handle on an asynchronous provider operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    /// Provider-issued operation identifier.
    pub id: String,
    /// Zone the operation runs in.
    pub zone: String,
}

/// Status of an asynchronous provider operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Still running.
    Pending,
    /// Completed and produced a template.
    Succeeded(Template),
    /// Reached a terminal failure.
    Failed {
        /// Failure detail reported by the provider.
        detail: String,
    },
}

/// Compute capability used by the import steps.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Submit a template registration.
    async fn create_template(&self, request: &TemplateRequest) -> ImportResult<OperationHandle>;

    /// Check the status of an operation.
    async fn poll_operation(&self, handle: &OperationHandle) -> ImportResult<OperationStatus>;

    /// Delete a template.
    ///
    /// Never called during rollback; only on explicit request.
    async fn delete_template(&self, zone: &str, id: &TemplateId) -> ImportResult<()>;
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::TemplateConfig;
    use crate::types::ObjectRef;

    #[test]
    fn request_inverts_disable_flags() {
        let config = ImportConfig {
            api_secret: SecretString::from("secret".to_owned()),
            zone: "ch-gva-2".to_owned(),
            template: TemplateConfig {
                name: "my-template".to_owned(),
                username: Some("debian".to_owned()),
                disable_password: true,
                ..TemplateConfig::default()
            },
            ..ImportConfig::default()
        };
        let uploaded = UploadedObject {
            object: ObjectRef::new("tmp", "imports/disk.img"),
            size: 10,
            checksum: "abc".to_owned(),
            url: "https://sos-ch-gva-2.exo.io/tmp/imports/disk.img".to_owned(),
        };

        let request = TemplateRequest::new(&config, &uploaded);

        assert_eq!(request.name, "my-template");
        assert_eq!(request.zone, "ch-gva-2");
        assert_eq!(request.url, uploaded.url);
        assert_eq!(request.checksum, "abc");
        assert!(!request.password_enabled);
        assert!(request.ssh_key_enabled);
        assert_eq!(request.boot_mode, "legacy");
    }
}
