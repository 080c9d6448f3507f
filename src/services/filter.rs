//! 事件过滤
//!
//! 判断一次推送事件是否需要部署。规则按顺序执行：
//! 1. Content-Type 必须是 JSON，且请求体可解析为推送事件
//! 2. 事件类型头（如存在）必须是 push；ping 及其他事件直接返回 200
//! 3. 必须包含非空的 `ref`
//! 4. 删除分支的推送不部署
//! 5. `ref` 必须与目标 ref 完全一致，否则视为正常的无操作

use axum::http::{header, HeaderMap};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::deploy::DeploymentEvent;

/// 推送平台使用的事件类型头
const EVENT_HEADERS: [&str; 3] = ["x-github-event", "x-gitea-event", "x-gogs-event"];

/// 投递 ID 头
const DELIVERY_HEADERS: [&str; 3] = ["x-github-delivery", "x-gitea-delivery", "x-gogs-delivery"];

/// 过滤拒绝原因（客户端错误）
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// 请求体不是合法的 JSON 推送事件
    MalformedPayload(String),
    /// 缺少 ref 字段
    MissingRef,
}

impl FilterError {
    /// 响应中使用的错误码
    pub fn code(&self) -> &'static str {
        match self {
            FilterError::MalformedPayload(_) => "MalformedPayload",
            FilterError::MissingRef => "MissingRef",
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
            FilterError::MissingRef => write!(f, "Payload has no 'ref' field"),
        }
    }
}

impl std::error::Error for FilterError {}

/// 忽略原因
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Ping,
    UnsupportedEvent,
    BranchDeleted,
    RefMismatch,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::Ping => "ping",
            IgnoreReason::UnsupportedEvent => "unsupported_event",
            IgnoreReason::BranchDeleted => "branch_deleted",
            IgnoreReason::RefMismatch => "ref_mismatch",
        }
    }
}

/// 过滤结果
#[derive(Debug)]
pub enum FilterDecision {
    /// 需要部署
    Deploy(DeploymentEvent),
    /// 忽略（HTTP 200, triggered=false）
    Ignore {
        reason: IgnoreReason,
        reference: Option<String>,
    },
}

/// 推送事件中用到的字段
#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    reference: Option<serde_json::Value>,
    after: Option<String>,
    #[serde(default)]
    deleted: bool,
}

/// 评估一次请求
pub fn evaluate(
    raw_body: Bytes,
    headers: HeaderMap,
    target_ref: &str,
) -> Result<FilterDecision, FilterError> {
    if !is_json_content_type(&headers) {
        return Err(FilterError::MalformedPayload(
            "Content-Type must be application/json".to_string(),
        ));
    }

    let value: serde_json::Value = serde_json::from_slice(&raw_body)
        .map_err(|e| FilterError::MalformedPayload(e.to_string()))?;
    if !value.is_object() {
        return Err(FilterError::MalformedPayload(
            "payload must be a JSON object".to_string(),
        ));
    }
    let payload: PushPayload = serde_json::from_value(value)
        .map_err(|e| FilterError::MalformedPayload(e.to_string()))?;

    match event_type(&headers) {
        Some("push") | None => {}
        Some("ping") => {
            return Ok(FilterDecision::Ignore {
                reason: IgnoreReason::Ping,
                reference: None,
            })
        }
        Some(_) => {
            return Ok(FilterDecision::Ignore {
                reason: IgnoreReason::UnsupportedEvent,
                reference: None,
            })
        }
    }

    let reference = payload
        .reference
        .as_ref()
        .and_then(|v| v.as_str())
        .filter(|r| !r.is_empty())
        .ok_or(FilterError::MissingRef)?
        .to_string();

    if payload.deleted {
        return Ok(FilterDecision::Ignore {
            reason: IgnoreReason::BranchDeleted,
            reference: Some(reference),
        });
    }

    if reference != target_ref {
        return Ok(FilterDecision::Ignore {
            reason: IgnoreReason::RefMismatch,
            reference: Some(reference),
        });
    }

    let delivery_id = first_header(&headers, &DELIVERY_HEADERS).map(str::to_string);
    Ok(FilterDecision::Deploy(DeploymentEvent {
        reference,
        commit: payload.after,
        delivery_id,
        raw_body,
        headers,
    }))
}

/// `application/json`，允许附带参数（如 charset）
fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

fn event_type(headers: &HeaderMap) -> Option<&str> {
    first_header(headers, &EVENT_HEADERS).map(str::trim)
}

fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}
