//! Work Items and Outcomes
//!
//! A [`WorkItem`] is one unit of per-item work supplied by the caller. The
//! item handler turns it into a structured JSON result, which
//! [`Outcome::from_result`] classifies into one of the four
//! [`OutcomeStatus`] values. Handler failures become
//! [`OutcomeStatus::HandlerError`] through [`Outcome::handler_error`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::{Envelope, MessageType};

/// Fallback error text when a handler reports an error without a message
pub const UNKNOWN_ERROR_TEXT: &str = "Unknown error occurred";

// ============================================================================
// Requests
// ============================================================================

/// What the caller is asking for on behalf of an item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// A fresh query
    #[default]
    Query,
    /// The client ran a tool and is returning its output
    ToolUseResponse,
    /// The client tried to run a tool and failed
    ToolUseFailed,
}

/// Tool output returned by the client for a previous TOOL_USE_REQUEST
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolUseResponse {
    pub tool_name: String,
    pub tool_use_id: String,
    #[serde(default)]
    pub response: Value,
}

/// One unit of per-item work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub item_id: i64,
    pub review_id: i64,
    #[serde(default, rename = "request_type")]
    pub kind: RequestKind,
    #[serde(default)]
    pub tool_use_response: Option<ToolUseResponse>,
    /// Team the job runs for; filled from the job or the connection
    #[serde(default)]
    pub user_team_id: Option<i64>,
}

impl WorkItem {
    /// Create a fresh query item
    #[must_use]
    pub fn query(item_id: i64, review_id: i64) -> Self {
        Self {
            item_id,
            review_id,
            kind: RequestKind::Query,
            tool_use_response: None,
            user_team_id: None,
        }
    }

    /// Create an item carrying a tool response
    #[must_use]
    pub fn tool_response(item_id: i64, review_id: i64, response: ToolUseResponse) -> Self {
        Self {
            item_id,
            review_id,
            kind: RequestKind::ToolUseResponse,
            tool_use_response: Some(response),
            user_team_id: None,
        }
    }

    #[must_use]
    pub fn with_user_team_id(mut self, user_team_id: i64) -> Self {
        self.user_team_id = Some(user_team_id);
        self
    }

    /// Whether a start envelope should precede this item's outcome
    #[must_use]
    pub fn is_fresh_query(&self) -> bool {
        self.kind == RequestKind::Query
    }
}

/// A multi-item job as submitted by a trigger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemsJobRequest {
    pub connection_id: String,
    pub review_id: i64,
    #[serde(default)]
    pub user_team_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<WorkItem>,
}

impl ItemsJobRequest {
    /// Consume the request, giving every item without a team id `user_team_id`
    #[must_use]
    pub fn into_items(self, user_team_id: Option<i64>) -> Vec<WorkItem> {
        self.items
            .into_iter()
            .map(|mut item| {
                item.user_team_id = item.user_team_id.or(user_team_id);
                item
            })
            .collect()
    }
}

/// Post-processing payload
///
/// Only `review_id` and `user_team_id` are interpreted here; every other
/// field is carried through to the handler untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostProcessRequest {
    #[serde(default)]
    pub review_id: Option<i64>,
    #[serde(default)]
    pub user_team_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Terminal classification of one item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    ToolUseRequest,
    Complete,
    ItemError,
    HandlerError,
}

impl OutcomeStatus {
    /// Envelope tag used when streaming an outcome with this status
    #[must_use]
    pub fn message_type(self) -> MessageType {
        match self {
            Self::ToolUseRequest => MessageType::TOOL_USE_REQUEST,
            Self::Complete => MessageType::ITEM_COMPLETE,
            Self::ItemError => MessageType::ITEM_ERROR,
            Self::HandlerError => MessageType::ITEM_FAIL,
        }
    }

    /// Classify a handler result
    ///
    /// An explicit `status: "ERROR"` wins over the `type` field; unknown types
    /// count as complete.
    #[must_use]
    pub fn classify(result: &Value) -> Self {
        if result.get("status").and_then(Value::as_str) == Some("ERROR") {
            return Self::ItemError;
        }
        match result.get("type").and_then(Value::as_str) {
            Some("TOOL_USE_REQUEST") => Self::ToolUseRequest,
            Some("REVIEW_ERROR" | "ITEM_ERROR") => Self::ItemError,
            _ => Self::Complete,
        }
    }
}

/// Per-item usage data surfaced to the client
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTelemetry {
    #[serde(default)]
    pub tokens: Map<String, Value>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub display_name: String,
}

/// Result of executing exactly one [`WorkItem`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub item_id: i64,
    pub name: String,
    pub category: String,
    pub status: OutcomeStatus,
    pub result: Value,
    #[serde(flatten)]
    pub telemetry: OutcomeTelemetry,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn str_field(result: &Value, key: &str) -> Option<String> {
    result.get(key).and_then(Value::as_str).map(str::to_owned)
}

impl Outcome {
    /// Build an outcome from a handler's structured result
    #[must_use]
    pub fn from_result(item_id: i64, result: Value) -> Self {
        let status = OutcomeStatus::classify(&result);
        let error_message = (status == OutcomeStatus::ItemError)
            .then(|| str_field(&result, "message").unwrap_or_else(|| UNKNOWN_ERROR_TEXT.into()));
        let telemetry = OutcomeTelemetry {
            tokens: result
                .get("tokens")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            model: str_field(&result, "model").unwrap_or_default(),
            display_name: str_field(&result, "display_name").unwrap_or_default(),
        };

        Self {
            item_id,
            name: str_field(&result, "name").unwrap_or_else(|| "unknown".into()),
            category: str_field(&result, "category").unwrap_or_else(|| "unknown".into()),
            status,
            result,
            telemetry,
            error_message,
        }
    }

    /// Build the outcome for a handler that failed outright
    pub fn handler_error(item_id: i64, message: impl Into<String>) -> Self {
        Self {
            item_id,
            name: "unknown".into(),
            category: "unknown".into(),
            status: OutcomeStatus::HandlerError,
            result: Value::Object(Map::new()),
            telemetry: OutcomeTelemetry::default(),
            error_message: Some(message.into()),
        }
    }

    /// Envelope streamed to the client for this outcome
    pub fn to_envelope(&self) -> serde_json::Result<Envelope> {
        let data = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".into(), other);
                map
            }
        };
        Ok(Envelope::new(self.status.message_type())
            .with_item_id(self.item_id)
            .with_data(data))
    }
}
