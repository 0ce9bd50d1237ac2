//! `public/auth` request construction.
//!
//! Deribit supports two grants for API keys:
//!
//! 1. **client_credentials**: `client_id` and `client_secret` are sent as-is.
//! 2. **client_signature**: the secret signs
//!    `"{timestamp}\n{nonce}\n{data}"` with HMAC-SHA256; only the hex
//!    signature goes over the wire.

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use drb_core::time_util::now_ms;
use drb_core::types::{AuthMethod, Credentials};

use super::codec::Params;

type HmacSha256 = Hmac<Sha256>;

/// Method name of the authentication call.
pub const AUTH_METHOD: &str = "public/auth";

/// Compute an HMAC-SHA256 signature and return it as a lowercase hex string.
pub fn hmac_sha256_sign(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build `public/auth` params for the given grant.
pub fn auth_params(credentials: &Credentials, method: AuthMethod) -> Params {
    match method {
        AuthMethod::ClientCredentials => credentials_params(credentials),
        AuthMethod::ClientSignature => {
            let nonce = Uuid::new_v4().simple().to_string();
            signature_params(credentials, now_ms(), &nonce, "")
        }
    }
}

fn credentials_params(credentials: &Credentials) -> Params {
    let mut params = Params::new();
    params.insert("grant_type".into(), json!(AuthMethod::ClientCredentials.grant_type()));
    params.insert("client_id".into(), json!(credentials.client_id));
    params.insert("client_secret".into(), json!(credentials.client_secret));
    params
}

fn signature_params(credentials: &Credentials, timestamp: u64, nonce: &str, data: &str) -> Params {
    let string_to_sign = format!("{timestamp}\n{nonce}\n{data}");
    let signature = hmac_sha256_sign(&credentials.client_secret, &string_to_sign);

    let mut params = Params::new();
    params.insert("grant_type".into(), json!(AuthMethod::ClientSignature.grant_type()));
    params.insert("client_id".into(), json!(credentials.client_id));
    params.insert("timestamp".into(), json!(timestamp));
    params.insert("signature".into(), json!(signature));
    params.insert("nonce".into(), json!(nonce));
    params.insert("data".into(), json!(data));
    params
}
