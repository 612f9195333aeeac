use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::cookie::CookieSigner;
use crate::error::StorageResult;

/// Opaque, unguessable token identifying a returning visitor.
///
/// Created once per unique visitor and carried in a signed cookie. One
/// identifier maps to exactly one user-scope record; a visitor whose cookie
/// is missing or fails verification receives a fresh identifier, leaving any
/// prior record unreachable but not deleted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of resolving inbound request credentials.
#[derive(Debug)]
pub struct Resolution {
    pub session: SessionId,
    /// Signed token the response must set when a fresh identifier was minted.
    pub set_cookie: Option<String>,
}

/// Derives a stable per-visitor session identifier from the signed session
/// cookie, minting one on first contact and rejecting tampering.
#[derive(Debug)]
pub struct SessionResolver {
    signer: CookieSigner,
}

impl SessionResolver {
    /// Fails with a configuration error when no signing secret is set, so a
    /// misconfigured deployment is caught at startup rather than mid-request.
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        Ok(Self {
            signer: CookieSigner::new(config.require_secret()?),
        })
    }

    /// Verifies the inbound cookie and returns its identifier, or mints a
    /// fresh identifier plus the set-cookie token carrying it.
    pub fn resolve(&self, cookie: Option<&str>) -> Resolution {
        if let Some(token) = cookie {
            match self.signer.verify(token) {
                Some(payload) => {
                    if let Ok(raw) = String::from_utf8(payload) {
                        return Resolution {
                            session: SessionId::from_raw(raw),
                            set_cookie: None,
                        };
                    }
                }
                None => {
                    tracing::warn!("session cookie failed verification, minting a fresh identifier");
                }
            }
        }
        let session = SessionId::generate();
        let set_cookie = self.signer.sign(session.as_str().as_bytes());
        Resolution {
            session,
            set_cookie: Some(set_cookie),
        }
    }

    /// Signs an identifier into a cookie token. Used when re-issuing cookies
    /// outside the resolve path (tests, long-lived cookie refresh).
    pub fn issue(&self, session: &SessionId) -> String {
        self.signer.sign(session.as_str().as_bytes())
    }
}
