use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::StorageResult;
use crate::map::{Snapshot, StorageMap};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies cookie tokens.
///
/// Token layout: `base64url(payload).hex(hmac_sha256(secret, base64url(payload)))`.
/// The same signer covers both the session-identifier cookie and the
/// serialized browser-mapping cookie.
#[derive(Debug)]
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let tag = self.mac(encoded.as_bytes());
        format!("{encoded}.{tag}")
    }

    /// Returns the payload when the signature checks out, `None` otherwise.
    pub fn verify(&self, token: &str) -> Option<Vec<u8>> {
        let (encoded, tag) = token.rsplit_once('.')?;
        let tag_bytes = hex::decode(tag).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(encoded.as_bytes());
        mac.verify_slice(&tag_bytes).ok()?;
        URL_SAFE_NO_PAD.decode(encoded).ok()
    }

    fn mac(&self, data: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Serializes a browser mapping into its outgoing signed cookie.
pub fn encode_browser(signer: &CookieSigner, map: &StorageMap) -> StorageResult<String> {
    let payload = serde_json::to_vec(&map.snapshot())?;
    Ok(signer.sign(&payload))
}

/// Decodes the inbound browser cookie into a mapping. An absent cookie, a bad
/// signature, or an unparseable payload all yield an empty mapping.
pub fn decode_browser(signer: &CookieSigner, cookie: Option<&str>) -> StorageMap {
    let Some(token) = cookie else {
        return StorageMap::new();
    };
    let Some(payload) = signer.verify(token) else {
        tracing::warn!("browser cookie failed verification, starting from an empty mapping");
        return StorageMap::new();
    };
    match serde_json::from_slice::<Snapshot>(&payload) {
        Ok(snapshot) => StorageMap::from_snapshot(snapshot),
        Err(err) => {
            tracing::warn!(error = %err, "browser cookie payload was not a mapping");
            StorageMap::new()
        }
    }
}
