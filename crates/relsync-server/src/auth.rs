use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Gate a route behind `Authorization: Bearer <api_token>`.
///
/// With no token configured every request is rejected.
pub async fn require_api_token(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = app.api_token.as_deref() else {
        warn!(path = %req.uri().path(), "api token not configured; rejecting");
        return AppError::unauthorized("api token not configured").into_response();
    };

    let presented = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => {
            next.run(req).await
        }
        Some(_) => AppError::unauthorized("invalid token").into_response(),
        None => AppError::unauthorized("missing bearer token").into_response(),
    }
}

/// Check `X-Hub-Signature-256: sha256=<hex>` against `body`.
pub fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> anyhow::Result<()> {
    let sig_header = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("missing X-Hub-Signature-256 header"))?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| anyhow::anyhow!("X-Hub-Signature-256 does not start with sha256="))?;

    let sig_bytes =
        hex::decode(sig_hex).map_err(|e| anyhow::anyhow!("invalid hex in signature: {e}"))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("HMAC key error: {e}"))?;
    mac.update(body);

    mac.verify_slice(&sig_bytes)
        .map_err(|_| anyhow::anyhow!("HMAC signature mismatch"))
}

/// `sha256=<hex>` signature for `body`, as GitHub sends it.
pub fn sign(secret: &str, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("HMAC key error: {e}"))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(sig: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("X-Hub-Signature-256", sig.parse().unwrap());
        h
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"action":"opened"}"#;
        let sig = sign("s3cret", body).unwrap();
        assert!(verify_signature("s3cret", &headers(&sig), body).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign("s3cret", b"original").unwrap();
        assert!(verify_signature("s3cret", &headers(&sig), b"tampered").is_err());
    }

    #[test]
    fn wrong_secret_or_format_fails() {
        let body = b"payload";
        assert!(verify_signature("other", &headers(&sign("s3cret", body).unwrap()), body).is_err());
        assert!(verify_signature("s3cret", &headers("md5=abcd"), body).is_err());
        assert!(verify_signature("s3cret", &headers("sha256=zz"), body).is_err());
        assert!(verify_signature("s3cret", &HeaderMap::new(), body).is_err());
    }
}
