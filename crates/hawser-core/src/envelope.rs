//! Request/response wire envelope and opportunistic frame parsing.
//!
//! The application layer speaks a small JSON envelope over the transport:
//! requests carry `{method, params, id?}`, success replies carry
//! `{result, id}`, failures carry `{error, id}`. The correlation `id` is
//! whatever the caller supplied (string or number), or null.
//!
//! Inbound frames are never rejected at this layer: anything that parses as
//! JSON is delivered structured, anything else is delivered raw.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming request from a peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Method name (e.g. `address.check`).
    pub method: String,
    /// Parameters object; defaults to null when absent.
    #[serde(default)]
    pub params: Value,
    /// Caller-supplied correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Request {
    /// Decode `method` + `params` into a closed set of typed request
    /// variants.
    ///
    /// `R` is expected to be an enum tagged on the method name:
    ///
    /// ```ignore
    /// #[derive(Deserialize)]
    /// #[serde(tag = "method", content = "params", rename_all = "snake_case")]
    /// enum AppRequest {
    ///     AddressCheck { address: String },
    ///     NetworkList,
    /// }
    /// ```
    ///
    /// Unknown methods and malformed params surface as a decode error the
    /// caller answers with an error envelope.
    pub fn decode<R: DeserializeOwned>(&self) -> Result<R, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "method": self.method,
            "params": self.params,
        }))
    }
}

/// Outgoing reply to a peer.
///
/// Exactly one of `result` / `error` is present; `id` echoes the request's
/// correlation id, or null when the request carried none.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Result payload (success replies only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message (failure replies only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Echoed correlation id, null when absent.
    #[serde(default)]
    pub id: Value,
}

impl Response {
    /// Build a success reply.
    pub fn result(result: Value, id: Option<Value>) -> Self {
        Self {
            result: Some(result),
            error: None,
            id: id.unwrap_or(Value::Null),
        }
    }

    /// Build a failure reply.
    pub fn error(message: impl Into<String>, id: Option<Value>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
            id: id.unwrap_or(Value::Null),
        }
    }

    /// Whether this reply carries a result.
    pub fn is_ok(&self) -> bool {
        self.result.is_some()
    }
}

/// An inbound frame, opportunistically interpreted as JSON.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// The frame parsed as JSON.
    Structured(Value),
    /// The frame did not parse; delivered verbatim.
    Raw(String),
}

impl Inbound {
    /// Parse a text frame. Never fails: parse errors downgrade to raw
    /// delivery.
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).map_or_else(|_| Self::Raw(text.to_owned()), Self::Structured)
    }

    /// Whether the frame parsed as JSON.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// The structured payload, if any.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}
