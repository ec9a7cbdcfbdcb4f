//! Decoded region responses and the error classification applied to failed calls.

use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use crate::errors::{Error, ExhaustedResource};

/// Bodies at least this large are not echoed back when they are not JSON.
pub const MAX_RAW_BODY: usize = 10_000;

/// Nested `bean.code` the region answers 401 with when the license is rejected.
pub const LICENSE_REJECTED_CODE: i64 = 10400;

/// Successful response from a region controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl RegionResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// Unwrap the `{status, data: {bean | list}}` envelope some endpoints use.
    ///
    /// Returns a non-empty `data.bean`, otherwise a non-empty `data.list`,
    /// otherwise an empty object. Bodies without `data` are returned unchanged.
    pub fn unpack(&self) -> Value {
        let Some(data) = self.body.get("data") else {
            return self.body.clone();
        };

        if let Some(bean) = data.get("bean").filter(|b| !is_empty_value(b)) {
            return bean.clone();
        }
        if let Some(list) = data.get("list").filter(|l| !is_empty_value(l)) {
            return list.clone();
        }
        Value::Object(Map::new())
    }

    /// Top-level `bean` of the body, as returned by the gateway allocation endpoints.
    pub fn bean(&self) -> Option<&Value> {
        self.body.get("bean").filter(|b| !b.is_null())
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Decode a 2xx/3xx body. Empty bodies become `null`; bodies that are not JSON
/// are wrapped as `{"raw": text}`.
pub fn decode_success(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }

    match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(_) if bytes.len() >= MAX_RAW_BODY => json!({ "raw": "too long to record!" }),
        Err(_) => json!({ "raw": String::from_utf8_lossy(bytes) }),
    }
}

/// Turn a 4xx/5xx response into the matching error.
pub fn classify_failure(status: StatusCode, method: &str, url: &str, bytes: &[u8]) -> Error {
    let code = status.as_u16();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Error::MalformedResponse {
            status: code,
            method: method.to_string(),
            url: url.to_string(),
            raw: "request region api body is nil".to_string(),
        };
    }

    let body: Value = match serde_json::from_slice(bytes) {
        Ok(body) => body,
        Err(_) => {
            return Error::MalformedResponse {
                status: code,
                method: method.to_string(),
                url: url.to_string(),
                raw: truncate_raw(bytes),
            }
        }
    };

    if let Some(remote_code) = body.get("code").and_then(Value::as_i64) {
        let message = body
            .get("msg")
            .and_then(Value::as_str)
            .or_else(|| body.get("msg_show").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        return Error::RemoteCoded { status: code, code: remote_code, message };
    }

    match status {
        StatusCode::CONFLICT => {
            return Error::RemoteBusy { method: method.to_string(), url: url.to_string() }
        }
        StatusCode::UNAUTHORIZED => {
            let license_rejected = body
                .get("bean")
                .and_then(|bean| bean.get("code"))
                .and_then(Value::as_i64)
                == Some(LICENSE_REJECTED_CODE);
            if license_rejected {
                return Error::InvalidLicense;
            }
        }
        StatusCode::PRECONDITION_FAILED => {
            if let Some(kind) = body.get("msg").and_then(Value::as_str).and_then(ExhaustedResource::from_marker) {
                return Error::ResourceExhausted { kind };
            }
        }
        _ => {}
    }

    Error::RemoteRejected { status: code, method: method.to_string(), url: url.to_string(), body }
}

fn truncate_raw(bytes: &[u8]) -> String {
    if bytes.len() >= MAX_RAW_BODY {
        "too long to record!".to_string()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
