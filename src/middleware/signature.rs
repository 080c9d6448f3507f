//! Webhook 签名校验
//!
//! 提供 `SignedRequest` extractor：读取原始请求体，在任何 JSON 解析之前
//! 用 HMAC-SHA256 校验 `X-Hub-Signature-256` 头。任何解析失败都按拒绝处理。

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header::HeaderMap,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// 签名头
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// 签名值前缀
const SIGNATURE_PREFIX: &str = "sha256=";

/// 已通过签名校验的原始请求
///
/// # Example
///
/// ```ignore
/// async fn webhook_handler(
///     State(state): State<Arc<AppState>>,
///     signed: SignedRequest,
/// ) -> impl IntoResponse {
///     // signed.body 是未经解析的原始字节
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[async_trait]
impl FromRequest<Arc<AppState>> for SignedRequest {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        let body = Bytes::from_request(req, state).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to read webhook body");
            ApiError::unauthorized()
        })?;

        check_signature(&headers, &body, state.config.secret.as_deref())?;
        Ok(SignedRequest { headers, body })
    }
}

/// 按配置校验请求签名
///
/// 未配置密钥时（需启动时显式允许）直接放行并告警
pub fn check_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: Option<&str>,
) -> Result<(), ApiError> {
    let Some(secret) = secret else {
        tracing::warn!("Accepting unsigned webhook: signature verification is DISABLED");
        return Ok(());
    };

    let claimed = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match claimed {
        Some(sig) if verify_signature(body, sig, secret) => Ok(()),
        Some(_) => {
            tracing::warn!("Invalid webhook signature");
            Err(ApiError::unauthorized())
        }
        None => {
            tracing::warn!("Missing X-Hub-Signature-256 header");
            Err(ApiError::unauthorized())
        }
    }
}

/// 校验签名
///
/// `claimed` 形如 `sha256=<hex>`；比较为常数时间
pub fn verify_signature(body: &[u8], claimed: &str, secret: &str) -> bool {
    let Some(hex_sig) = claimed.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// 计算签名头的值（`sha256=<hex>`）
#[cfg(test)]
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
