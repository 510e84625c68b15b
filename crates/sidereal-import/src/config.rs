//! Configuration for sidereal-import.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::{ImportError, ImportResult};

/// Top-level configuration for a template import.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Compute API key.
    #[serde(default)]
    pub api_key: String,

    /// Compute API secret.
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub api_secret: SecretString,

    /// API environment, used to build the compute endpoint.
    #[serde(default = "default_api_environment")]
    pub api_environment: String,

    /// Zone the template is registered in.
    #[serde(default)]
    pub zone: String,

    /// Keep the uploaded image in storage once the template is registered.
    #[serde(default)]
    pub skip_clean: bool,

    /// Object storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Template metadata.
    #[serde(default)]
    pub template: TemplateConfig,

    /// Registration polling behaviour.
    #[serde(default)]
    pub registration: RegistrationConfig,
}

impl ImportConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `import.toml` in the current directory (if present)
    /// 3. Environment variables with `SIDEREAL_IMPORT_` prefix
    pub fn load() -> ImportResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file("import.toml")))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ImportResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn from_figment(figment: Figment) -> ImportResult<Self> {
        let config: Self = figment
            .merge(Env::prefixed("SIDEREAL_IMPORT_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Check that every value required to reach the providers is present.
    pub fn validate(&self) -> ImportResult<()> {
        let mut missing = Vec::new();

        if self.api_key.is_empty() {
            missing.push("api_key");
        }
        if self.api_secret.expose_secret().is_empty() {
            missing.push("api_secret");
        }
        if self.zone.is_empty() {
            missing.push("zone");
        }
        if self.storage.bucket.is_empty() {
            missing.push("storage.bucket");
        }
        if self.template.name.is_empty() {
            missing.push("template.name");
        }

        if !missing.is_empty() {
            return Err(ImportError::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.registration.poll_interval_ms == 0 {
            return Err(ImportError::config(
                "registration.poll_interval_ms must be greater than zero",
            ));
        }
        if self.registration.timeout_secs == 0
            || self.registration.timeout_secs > MAX_REGISTRATION_TIMEOUT_SECS
        {
            return Err(ImportError::config(format!(
                "registration.timeout_secs must be between 1 and {MAX_REGISTRATION_TIMEOUT_SECS}"
            )));
        }
        if self.registration.request_timeout_secs == 0 {
            return Err(ImportError::config(
                "registration.request_timeout_secs must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Storage endpoint, derived from the zone unless set explicitly.
    #[must_use]
    pub fn storage_endpoint(&self) -> String {
        self.storage
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sos-{}.exo.io", self.zone))
    }

    /// Compute API endpoint for the configured environment and zone.
    #[must_use]
    pub fn compute_endpoint(&self) -> String {
        compute_endpoint(&self.api_environment, &self.zone)
    }
}

/// Compute API endpoint serving `zone` in `environment`.
#[must_use]
pub fn compute_endpoint(environment: &str, zone: &str) -> String {
    format!("https://{environment}-{zone}.exoscale.com/v2")
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: empty_secret(),
            api_environment: default_api_environment(),
            zone: String::new(),
            skip_clean: false,
            storage: StorageConfig::default(),
            template: TemplateConfig::default(),
            registration: RegistrationConfig::default(),
        }
    }
}

fn default_api_environment() -> String {
    "api".to_owned()
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Object storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// S3-compatible endpoint URL. Defaults to the zone's SOS endpoint.
    pub endpoint: Option<String>,

    /// Bucket receiving the temporary image.
    #[serde(default)]
    pub bucket: String,

    /// Prefix prepended to generated object keys.
    #[serde(default)]
    pub key_prefix: String,
}

/// Metadata for the registered template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    /// Template name.
    #[serde(default)]
    pub name: String,

    /// Free-form description.
    pub description: Option<String>,

    /// Default user account on instances created from the template.
    pub username: Option<String>,

    /// Boot mode ("legacy" or "uefi").
    #[serde(default = "default_boot_mode")]
    pub boot_mode: String,

    /// Disable password authentication for instances.
    #[serde(default)]
    pub disable_password: bool,

    /// Disable SSH key injection for instances.
    #[serde(default)]
    pub disable_ssh_key: bool,

    /// Build identifier recorded on the template.
    pub build: Option<String>,

    /// Version recorded on the template.
    pub version: Option<String>,

    /// Maintainer recorded on the template.
    pub maintainer: Option<String>,
}

fn default_boot_mode() -> String {
    "legacy".to_owned()
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            username: None,
            boot_mode: default_boot_mode(),
            disable_password: false,
            disable_ssh_key: false,
            build: None,
            version: None,
            maintainer: None,
        }
    }
}

/// Registration polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    /// Delay between operation status checks, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall registration deadline in seconds.
    #[serde(default = "default_registration_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout applied to each compute API request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl RegistrationConfig {
    /// Delay between operation status checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Overall registration deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Longest registration deadline accepted by [`ImportConfig::validate`].
pub const MAX_REGISTRATION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

const fn default_poll_interval_ms() -> u64 {
    5_000
}

const fn default_registration_timeout_secs() -> u64 {
    1_800 // 30 minutes
}

const fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_registration_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
