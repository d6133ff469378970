use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ChannelError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Verifies the inbound webhook signature against a shared secret.
///
/// Providers in this family (Twilio-style webhooks) sign
/// `url + sorted("key=value")` form parameters concatenated, base16-encoded
/// as the hex digest in the `X-Signature-256` header — the same shape the
/// GitHub-style `X-Hub-Signature-256` check uses, just over a different
/// canonical string.
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// `form_params` must already be sorted by key — callers build the
    /// canonical string once and reuse it for both verification and
    /// logging on failure.
    pub fn verify(&self, url: &str, sorted_form_params: &[(String, String)], signature_hex: &str) -> Result<()> {
        let canonical = canonical_string(url, sorted_form_params);

        let expected = hex::decode(signature_hex)
            .map_err(|_| ChannelError::SignatureInvalid("signature is not valid hex".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| ChannelError::SignatureInvalid("invalid HMAC key length".to_string()))?;
        mac.update(canonical.as_bytes());

        mac.verify_slice(&expected)
            .map_err(|_| ChannelError::SignatureInvalid("signature mismatch".to_string()))
    }

    /// Same HMAC check as [`Self::verify`], but over `url + raw_body`
    /// directly rather than sorted form parameters — used for JSON-bodied
    /// webhooks (email) that have no form parameters to sort.
    pub fn verify_raw(&self, url: &str, raw_body: &str, signature_hex: &str) -> Result<()> {
        let mut canonical = url.to_string();
        canonical.push_str(raw_body);

        let expected = hex::decode(signature_hex)
            .map_err(|_| ChannelError::SignatureInvalid("signature is not valid hex".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| ChannelError::SignatureInvalid("invalid HMAC key length".to_string()))?;
        mac.update(canonical.as_bytes());

        mac.verify_slice(&expected)
            .map_err(|_| ChannelError::SignatureInvalid("signature mismatch".to_string()))
    }
}

fn canonical_string(url: &str, sorted_form_params: &[(String, String)]) -> String {
    let mut out = url.to_string();
    for (key, value) in sorted_form_params {
        out.push_str(key);
        out.push_str(value);
    }
    out
}

/// Sort form params by key, the canonical order signature verification
/// expects regardless of the order the provider sent them in.
pub fn sorted_params(mut params: Vec<(String, String)>) -> Vec<(String, String)> {
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}
