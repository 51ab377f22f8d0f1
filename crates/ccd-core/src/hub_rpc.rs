use crate::{NodeUpdateInfo, TopologyDelta};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Matches tungstenite's default `max_message_size`.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 << 20;
pub const JSONRPC_VERSION: &str = "2.0";
pub const SUBSCRIBE_METHOD: &str = "rpc.on";

pub const ERR_CODECHAIN_NOT_RUNNING: i64 = 0;
pub const ERR_AGENT_NOT_FOUND: i64 = -1;
pub const ERR_INTERNAL: i64 = -32603;
pub const ERR_ALREADY_RUNNING: i64 = -10001;
pub const ERR_ENV_PARSE: i64 = -10002;
pub const ERR_CODECHAIN_UPDATING: i64 = -10003;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Num(u64),
    Str(String),
}

impl RequestId {
    pub fn as_num(&self) -> Option<u64> {
        match self {
            RequestId::Num(value) => Some(*value),
            RequestId::Str(value) => value.trim().parse().ok(),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Num(value) => write!(f, "{value}"),
            RequestId::Str(value) => f.write_str(value),
        }
    }
}

impl Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            RequestId::Num(value) => serializer.serialize_u64(*value),
            RequestId::Str(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RequestIdVisitor;

        impl<'de> Visitor<'de> for RequestIdVisitor {
            type Value = RequestId;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a request id as string or integer")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(RequestId::Num(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!("request id cannot be negative: {value}")));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(RequestId::Str(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(RequestId::Str(value))
            }
        }

        deserializer.deserialize_any(RequestIdVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: RequestId,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: RequestId::Num(id),
        }
    }

    pub fn subscribe(id: u64, topics: &[PushTopic]) -> Self {
        let topics = topics
            .iter()
            .map(|topic| Value::String(topic.as_str().to_string()))
            .collect();
        Self::new(id, SUBSCRIBE_METHOD, Value::Array(topics))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: RequestId,
    pub outcome: Result<Value, RpcErrorObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcNotification {
    pub topic: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Response(RpcResponse),
    Notification(RpcNotification),
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default, deserialize_with = "deserialize_present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    notification: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

/// Keeps `"result": null` distinguishable from a missing `result`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushTopic {
    DashboardUpdated,
    NodeUpdated,
}

impl PushTopic {
    pub const ALL: [PushTopic; 2] = [PushTopic::DashboardUpdated, PushTopic::NodeUpdated];

    pub fn as_str(&self) -> &'static str {
        match self {
            PushTopic::DashboardUpdated => "dashboard_updated",
            PushTopic::NodeUpdated => "node_updated",
        }
    }
}

impl fmt::Display for PushTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushTopic {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "dashboard_updated" => Ok(PushTopic::DashboardUpdated),
            "node_updated" => Ok(PushTopic::NodeUpdated),
            other => Err(format!("Unknown push topic: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    DashboardUpdated(TopologyDelta),
    NodeUpdated(NodeUpdateInfo),
}

impl PushEvent {
    pub fn topic(&self) -> PushTopic {
        match self {
            PushEvent::DashboardUpdated(_) => PushTopic::DashboardUpdated,
            PushEvent::NodeUpdated(_) => PushTopic::NodeUpdated,
        }
    }

    /// Returns `Ok(None)` for topics this client does not consume.
    pub fn from_notification(notification: &RpcNotification) -> Result<Option<Self>, FrameError> {
        let Ok(topic) = notification.topic.parse::<PushTopic>() else {
            return Ok(None);
        };
        let params = unwrap_single_param(&notification.params);
        let event = match topic {
            PushTopic::DashboardUpdated => PushEvent::DashboardUpdated(
                serde_json::from_value(params).map_err(|err| FrameError::Decode(err.to_string()))?,
            ),
            PushTopic::NodeUpdated => PushEvent::NodeUpdated(
                serde_json::from_value(params).map_err(|err| FrameError::Decode(err.to_string()))?,
            ),
        };
        Ok(Some(event))
    }
}

fn unwrap_single_param(params: &Value) -> Value {
    match params {
        Value::Array(items) if items.len() == 1 => items[0].clone(),
        other => other.clone(),
    }
}

/// Error codes the session layer reports to the user and swallows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommonError {
    CodeChainIsNotRunning,
    AgentNotFound,
    InternalError,
}

impl CommonError {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            ERR_CODECHAIN_NOT_RUNNING => Some(CommonError::CodeChainIsNotRunning),
            ERR_AGENT_NOT_FOUND => Some(CommonError::AgentNotFound),
            ERR_INTERNAL => Some(CommonError::InternalError),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            CommonError::CodeChainIsNotRunning => ERR_CODECHAIN_NOT_RUNNING,
            CommonError::AgentNotFound => ERR_AGENT_NOT_FOUND,
            CommonError::InternalError => ERR_INTERNAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("frame is neither a response nor a notification")]
    Unrecognized,
}

pub fn encode_request(request: &RpcRequest, max_frame_bytes: usize) -> Result<String, FrameError> {
    let encoded =
        serde_json::to_string(request).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

pub fn decode_frame(text: &str, max_frame_bytes: usize) -> Result<InboundFrame, FrameError> {
    let raw = text.trim_end_matches(&['\r', '\n'][..]);
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    let parsed: RawInbound =
        serde_json::from_str(raw).map_err(|err| FrameError::Decode(err.to_string()))?;

    if let Some(id) = parsed.id {
        if let Some(error) = parsed.error {
            return Ok(InboundFrame::Response(RpcResponse {
                id,
                outcome: Err(error),
            }));
        }
        if let Some(result) = parsed.result {
            return Ok(InboundFrame::Response(RpcResponse {
                id,
                outcome: Ok(result),
            }));
        }
    }

    if let Some(topic) = parsed.method.or(parsed.notification) {
        return Ok(InboundFrame::Notification(RpcNotification {
            topic,
            params: parsed.params.unwrap_or(Value::Null),
        }));
    }

    Err(FrameError::Unrecognized)
}

/// Best-effort `id` of a frame that `decode_frame` rejected, so the caller
/// waiting on it can be failed instead of left pending.
pub fn recover_request_id(text: &str) -> Option<RequestId> {
    let value: Value = serde_json::from_str(text).ok()?;
    let id = value.get("id")?;
    if id.is_null() {
        return None;
    }
    RequestId::deserialize(id).ok()
}
