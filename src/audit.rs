//! Structured audit events for security-relevant request lifecycle points.
//!
//! Events go through the `log` facade as single-line JSON payloads so the
//! orchestrator's log pipeline can index them without parsing free text.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
struct AuditEvent<'a> {
    event: &'a str,
    timestamp_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn emit(level: log::Level, event: AuditEvent<'_>) {
    match serde_json::to_string(&event) {
        Ok(line) => log::log!(target: "audit", level, "{}", line),
        Err(e) => log::warn!("audit event serialization failed: {}", e),
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Named event constructors used on the request path.
pub mod events {
    use super::*;

    pub fn request_received(request_id: &str, language: &str) {
        emit(
            log::Level::Info,
            AuditEvent {
                event: "request_received",
                timestamp_ms: now_ms(),
                request_id: Some(request_id),
                pid: None,
                detail: Some(format!("language={}", language)),
            },
        );
    }

    pub fn policy_rejection(language: &str, reason: &str) {
        emit(
            log::Level::Warn,
            AuditEvent {
                event: "policy_rejection",
                timestamp_ms: now_ms(),
                request_id: None,
                pid: None,
                detail: Some(format!("language={} reason={}", language, reason)),
            },
        );
    }

    pub fn limit_violation(pid: u32, which: &str, observed: u64) {
        emit(
            log::Level::Warn,
            AuditEvent {
                event: "limit_violation",
                timestamp_ms: now_ms(),
                request_id: None,
                pid: Some(pid),
                detail: Some(format!("limit={} observed={}", which, observed)),
            },
        );
    }

    pub fn infrastructure_failure(request_id: &str, detail: &str) {
        emit(
            log::Level::Error,
            AuditEvent {
                event: "infrastructure_failure",
                timestamp_ms: now_ms(),
                request_id: Some(request_id),
                pid: None,
                detail: Some(detail.to_string()),
            },
        );
    }

    pub fn request_finished(request_id: &str, outcome: &str) {
        emit(
            log::Level::Info,
            AuditEvent {
                event: "request_finished",
                timestamp_ms: now_ms(),
                request_id: Some(request_id),
                pid: None,
                detail: Some(format!("outcome={}", outcome)),
            },
        );
    }
}
