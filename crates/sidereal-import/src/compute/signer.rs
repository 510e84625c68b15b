//! Request signing for the compute API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::{ImportError, ImportResult};

type HmacSha256 = Hmac<Sha256>;

/// How long a signature stays valid, in seconds.
const SIGNATURE_TTL_SECS: i64 = 600;

/// Signs compute API requests with `EXO2-HMAC-SHA256`.
#[derive(Clone)]
pub struct RequestSigner {
    api_key: String,
    api_secret: SecretString,
}

impl RequestSigner {
    /// Create a new signer.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: SecretString) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret,
        }
    }

    /// Authorization header value for a request sent now.
    pub fn authorize(&self, method: &str, path: &str, body: &[u8]) -> ImportResult<String> {
        let expires = chrono::Utc::now().timestamp() + SIGNATURE_TTL_SECS;
        self.authorization(method, path, body, expires)
    }

    /// Authorization header value for a request expiring at `expires`.
    ///
    /// The signed message is the request line, the body, the (empty) signed
    /// query arguments and headers, and the expiry, separated by newlines.
    pub fn authorization(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        expires: i64,
    ) -> ImportResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .map_err(|e| ImportError::internal(format!("invalid signing key: {e}")))?;

        mac.update(format!("{method} {path}\n").as_bytes());
        mac.update(body);
        mac.update(format!("\n\n\n{expires}").as_bytes());

        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!(
            "EXO2-HMAC-SHA256 credential={},expires={expires},signature={signature}",
            self.api_key
        ))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}
