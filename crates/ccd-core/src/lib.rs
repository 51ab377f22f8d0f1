pub mod hub_rpc;
pub mod ordering;

use chrono::{DateTime, Utc};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub type NodeName = String;
pub type SocketAddr = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Run,
    Starting,
    Stop,
    Error,
    Updating,
    /// Seen on the network without a managing agent.
    #[serde(rename = "UFO")]
    Ufo,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Stop
    }
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Run => "Run",
            NodeStatus::Starting => "Starting",
            NodeStatus::Stop => "Stop",
            NodeStatus::Error => "Error",
            NodeStatus::Updating => "Updating",
            NodeStatus::Ufo => "UFO",
        }
    }

    /// Rank used for status sorting, lowest first.
    pub fn rank(&self) -> u8 {
        match self {
            NodeStatus::Error => 1,
            NodeStatus::Stop => 2,
            NodeStatus::Starting => 3,
            NodeStatus::Updating => 4,
            NodeStatus::Run => 5,
            NodeStatus::Ufo => 6,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "run" | "running" => Ok(NodeStatus::Run),
            "starting" => Ok(NodeStatus::Starting),
            "stop" | "stopped" => Ok(NodeStatus::Stop),
            "error" => Ok(NodeStatus::Error),
            "updating" => Ok(NodeStatus::Updating),
            "ufo" => Ok(NodeStatus::Ufo),
            other => Err(format!("Unknown node status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeVersion {
    pub version: String,
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockId {
    pub block_number: i64,
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub name: NodeName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<NodeVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_block_id: Option<BlockId>,
}

/// Partial node record carried by `dashboard_updated`. Only `name` is mandatory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummaryPatch {
    pub name: NodeName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<NodeVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_block_id: Option<BlockId>,
}

impl From<NodeSummaryPatch> for NodeSummary {
    fn from(patch: NodeSummaryPatch) -> Self {
        Self {
            name: patch.name,
            address: patch.address,
            status: patch.status.unwrap_or_default(),
            version: patch.version,
            best_block_id: patch.best_block_id,
        }
    }
}

/// A network link as transmitted by the hub. Equality is order sensitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub node_a: NodeName,
    pub node_b: NodeName,
}

impl Connection {
    pub fn new(node_a: impl Into<NodeName>, node_b: impl Into<NodeName>) -> Self {
        Self {
            node_a: node_a.into(),
            node_b: node_b.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Topology {
    #[serde(default)]
    pub nodes: Vec<NodeSummary>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TopologyDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeSummaryPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections_added: Option<Vec<Connection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections_removed: Option<Vec<Connection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StartOption {
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub args: String,
}

/// One whitelist/blacklist entry. The hub sends either `[ip, tag]` or a bare `"ip"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub addr: String,
    pub tag: Option<String>,
}

impl Serialize for AccessEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.tag {
            Some(tag) => {
                let mut tuple = serializer.serialize_tuple(2)?;
                tuple.serialize_element(&self.addr)?;
                tuple.serialize_element(tag)?;
                tuple.end()
            }
            None => serializer.serialize_str(&self.addr),
        }
    }
}

impl<'de> Deserialize<'de> for AccessEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AccessEntryVisitor;

        impl<'de> Visitor<'de> for AccessEntryVisitor {
            type Value = AccessEntry;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("an address string or an [address, tag] pair")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(AccessEntry {
                    addr: value.to_string(),
                    tag: None,
                })
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let addr: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let tag: Option<String> = seq.next_element()?;
                Ok(AccessEntry { addr, tag })
            }
        }

        deserializer.deserialize_any(AccessEntryVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccessList {
    #[serde(default)]
    pub list: Vec<AccessEntry>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareUsage {
    pub total: i64,
    pub available: i64,
    pub percentage_used: f64,
}

impl HardwareUsage {
    pub fn used(&self) -> i64 {
        self.total - self.available
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareInfo {
    #[serde(default)]
    pub cpu_usage: Vec<f64>,
    #[serde(default)]
    pub disk_usage: HardwareUsage,
    #[serde(default)]
    pub memory_usage: HardwareUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub name: NodeName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_option: Option<StartOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<NodeVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_block_id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_parcels: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<SocketAddr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<AccessList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<AccessList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
}

impl NodeDetail {
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            name: self.name.clone(),
            address: self.address.clone(),
            status: self.status,
            version: self.version.clone(),
            best_block_id: self.best_block_id.clone(),
        }
    }
}

/// Partial node detail carried by `node_updated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdateInfo {
    pub name: NodeName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_option: Option<StartOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<SocketAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<NodeVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_block_id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_parcels: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<SocketAddr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<AccessList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<AccessList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UpdateCodeChainRequest {
    #[serde(rename_all = "camelCase")]
    Git { commit_hash: String },
    #[serde(rename_all = "camelCase")]
    Binary {
        #[serde(rename = "binaryURL")]
        binary_url: String,
        binary_checksum: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| format!("Unknown log level: {normalized}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[serde(rename = "ASC")]
    Asc,
    #[default]
    #[serde(rename = "DESC")]
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default)]
    pub node_names: Vec<NodeName>,
    #[serde(default)]
    pub levels: Vec<LogLevel>,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogTimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_time: Option<DateTime<Utc>>,
}

/// Single parameter object of `log_get`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogGetRequest {
    pub filter: LogFilter,
    pub search: String,
    pub time: LogTimeRange,
    pub page: u32,
    pub item_per_page: u32,
    pub order_by: OrderBy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub node_name: NodeName,
    pub level: String,
    pub target: String,
    pub timestamp: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LogTargets {
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LogPage {
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum GraphPeriod {
    #[default]
    Minutes5,
    Hour,
    Day,
}

impl FromStr for GraphPeriod {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "minutes5" | "5m" => Ok(GraphPeriod::Minutes5),
            "hour" | "1h" => Ok(GraphPeriod::Hour),
            "day" | "1d" => Ok(GraphPeriod::Day),
            other => Err(format!("Unknown graph period: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub period: GraphPeriod,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOutAllRow {
    pub node_name: NodeName,
    pub time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOutExtensionRow {
    pub extension: String,
    pub time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphRows<T> {
    #[serde(default = "Vec::new")]
    pub rows: Vec<T>,
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(de::Error::custom("expected string or number for id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_snapshot_parses_ufo_and_partial_nodes() {
        let topology: Topology = serde_json::from_str(
            r#"{
                "nodes": [
                    {
                        "name": "alice",
                        "status": "Run",
                        "address": "119.202.81.99:8000",
                        "version": {"version": "1.0.2", "hash": "abc"},
                        "bestBlockId": {"blockNumber": 100, "hash": "0x01"}
                    },
                    {"name": "stranger", "status": "UFO", "address": "10.0.0.9:3485"}
                ],
                "connections": [{"nodeA": "alice", "nodeB": "stranger"}]
            }"#,
        )
        .expect("parse topology");

        assert_eq!(topology.nodes.len(), 2);
        assert_eq!(topology.nodes[0].best_block_id.as_ref().map(|b| b.block_number), Some(100));
        assert_eq!(topology.nodes[1].status, NodeStatus::Ufo);
        assert!(topology.nodes[1].version.is_none());
        assert_eq!(topology.connections, vec![Connection::new("alice", "stranger")]);
    }

    #[test]
    fn node_status_keeps_wire_names() {
        assert_eq!(serde_json::to_string(&NodeStatus::Ufo).unwrap(), "\"UFO\"");
        assert_eq!(serde_json::to_string(&NodeStatus::Run).unwrap(), "\"Run\"");
        assert_eq!("ufo".parse::<NodeStatus>(), Ok(NodeStatus::Ufo));
        assert!("sleeping".parse::<NodeStatus>().is_err());
    }

    #[test]
    fn access_list_accepts_pairs_and_bare_addresses() {
        let update: NodeUpdateInfo = serde_json::from_str(
            r#"{
                "name": "alice",
                "whitelist": {"list": [["10.0.0.1", "office"]], "enabled": true},
                "blacklist": {"list": ["10.0.0.66"], "enabled": false}
            }"#,
        )
        .expect("parse update");

        let whitelist = update.whitelist.expect("whitelist");
        assert_eq!(whitelist.list[0].addr, "10.0.0.1");
        assert_eq!(whitelist.list[0].tag.as_deref(), Some("office"));
        let blacklist = update.blacklist.expect("blacklist");
        assert_eq!(blacklist.list[0].addr, "10.0.0.66");
        assert!(blacklist.list[0].tag.is_none());

        let encoded = serde_json::to_value(&whitelist).expect("encode");
        assert_eq!(encoded["list"][0], serde_json::json!(["10.0.0.1", "office"]));
    }

    #[test]
    fn update_request_uses_hub_field_names() {
        let binary = UpdateCodeChainRequest::Binary {
            binary_url: "https://example.com/codechain".to_string(),
            binary_checksum: "deadbeef".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&binary).unwrap(),
            serde_json::json!({
                "type": "binary",
                "binaryURL": "https://example.com/codechain",
                "binaryChecksum": "deadbeef"
            })
        );

        let git = UpdateCodeChainRequest::Git {
            commit_hash: "f00d".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&git).unwrap(),
            serde_json::json!({"type": "git", "commitHash": "f00d"})
        );
    }

    #[test]
    fn log_record_accepts_numeric_id() {
        let page: LogPage = serde_json::from_str(
            r#"{"logs": [{
                "id": 42,
                "nodeName": "alice",
                "level": "info",
                "target": "miner",
                "timestamp": "2018-10-01T10:00:00+09:00",
                "message": "sealed block"
            }]}"#,
        )
        .expect("parse logs");
        assert_eq!(page.logs[0].id, "42");
        assert_eq!(page.logs[0].node_name, "alice");
    }

    #[test]
    fn log_request_serializes_camel_case_and_order() {
        let request = LogGetRequest {
            filter: LogFilter {
                node_names: vec!["alice".to_string()],
                levels: vec![LogLevel::Error, LogLevel::Warn],
                targets: vec![],
            },
            search: "block".to_string(),
            time: LogTimeRange::default(),
            page: 2,
            item_per_page: 15,
            order_by: OrderBy::Desc,
        };
        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(value["filter"]["nodeNames"], serde_json::json!(["alice"]));
        assert_eq!(value["filter"]["levels"], serde_json::json!(["error", "warn"]));
        assert_eq!(value["itemPerPage"], 15);
        assert_eq!(value["orderBy"], "DESC");
        assert_eq!(value["time"], serde_json::json!({}));
    }

    #[test]
    fn graph_period_serializes_lower_camel() {
        assert_eq!(serde_json::to_string(&GraphPeriod::Minutes5).unwrap(), "\"minutes5\"");
        assert_eq!(serde_json::to_string(&GraphPeriod::Hour).unwrap(), "\"hour\"");
        assert_eq!("day".parse::<GraphPeriod>(), Ok(GraphPeriod::Day));
    }

    #[test]
    fn new_node_patch_defaults_to_stopped() {
        let summary = NodeSummary::from(NodeSummaryPatch {
            name: "bob".to_string(),
            ..Default::default()
        });
        assert_eq!(summary.status, NodeStatus::Stop);
    }
}
