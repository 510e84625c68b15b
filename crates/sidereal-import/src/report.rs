//! User-facing progress reporting.
//!
//! Steps describe what they are doing through a [`Reporter`]. Secrets that
//! must never appear in output are handed to the reporter explicitly through
//! a [`Redactor`].

use std::borrow::Cow;

use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info};

use crate::config::ImportConfig;

/// Placeholder written in place of a redacted secret.
pub const REDACTED: &str = "<redacted>";

/// Sink for progress messages.
pub trait Reporter: Send + Sync {
    /// Report progress.
    fn say(&self, message: &str);

    /// Report a failure.
    fn error(&self, message: &str);
}

/// Replaces known secret values in text.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<SecretString>,
}

impl Redactor {
    /// Create a redactor with no secrets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret to redact. Empty values are ignored.
    #[must_use]
    pub fn with_secret(mut self, secret: SecretString) -> Self {
        if !secret.expose_secret().is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Redactor for the credentials in `config`.
    #[must_use]
    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new()
            .with_secret(SecretString::from(config.api_key.clone()))
            .with_secret(config.api_secret.clone())
    }

    /// Number of secrets being redacted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Returns true if nothing is redacted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Replace every secret occurring in `text`.
    #[must_use]
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut output = Cow::Borrowed(text);
        for secret in &self.secrets {
            let value = secret.expose_secret();
            if output.contains(value) {
                output = Cow::Owned(output.replace(value, REDACTED));
            }
        }
        output
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

/// Reporter emitting messages as tracing events.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    redactor: Redactor,
}

impl TracingReporter {
    /// Create a reporter that redacts with `redactor`.
    #[must_use]
    pub const fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }
}

impl Reporter for TracingReporter {
    fn say(&self, message: &str) {
        info!(target: "sidereal_import::ui", "{}", self.redactor.redact(message));
    }

    fn error(&self, message: &str) {
        error!(target: "sidereal_import::ui", "{}", self.redactor.redact(message));
    }
}
