//! Plain-text views. Every function returns the text; printing is the caller's job.

use ccd_core::ordering::{sort_nodes, SortKey};
use ccd_core::{
    AccessList, HardwareUsage, LogRecord, NetworkOutExtensionRow, NodeDetail, NodeName,
    NodeSummary, Topology,
};
use ccd_reconciler::TopologyView;
use ccd_session::{ConnectionState, Notice};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;

const PLACEHOLDER: &str = "-";

pub fn header(title: &str, state: ConnectionState) -> String {
    format!("{title} [{state}]")
}

pub fn notice(notice: &Notice) -> String {
    format!("! {notice}")
}

pub fn topology_view(view: TopologyView<'_>, key: SortKey, descending: bool) -> String {
    match view {
        TopologyView::Loading => "Loading...".to_string(),
        TopologyView::Ready(topology) => network_table(topology, key, descending),
    }
}

pub fn network_table(topology: &Topology, key: SortKey, descending: bool) -> String {
    if topology.nodes.is_empty() {
        return "No nodes.".to_string();
    }
    let mut nodes = topology.nodes.clone();
    sort_nodes(&mut nodes, key, descending);

    let rows: Vec<[String; 5]> = nodes.iter().map(node_row).collect();
    let headings = ["NAME", "ADDRESS", "STATUS", "VERSION", "BLOCK"];
    let mut widths = headings.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &headings.map(str::to_string), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    if !topology.connections.is_empty() {
        out.push('\n');
        for connection in &topology.connections {
            let _ = writeln!(out, "{} <-> {}", connection.node_a, connection.node_b);
        }
    }
    out.trim_end().to_string()
}

fn node_row(node: &NodeSummary) -> [String; 5] {
    [
        node.name.clone(),
        node.address.clone().unwrap_or_else(|| PLACEHOLDER.to_string()),
        node.status.to_string(),
        node.version
            .as_ref()
            .map(|version| version.version.clone())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        node.best_block_id
            .as_ref()
            .map(|block| block.block_number.to_string())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
    ]
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let line = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

pub fn node_detail(detail: &NodeDetail, log_link: Option<&str>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", detail.name, detail.status);
    field(&mut out, "address", detail.address.as_deref());
    field(&mut out, "agent", detail.agent_version.as_deref());
    if let Some(version) = &detail.version {
        let _ = writeln!(out, "  version: {} ({})", version.version, version.hash);
    }
    if let Some(block) = &detail.best_block_id {
        let _ = writeln!(out, "  best block: #{} {}", block.block_number, block.hash);
    }
    if let Some(option) = &detail.start_option {
        let _ = writeln!(out, "  start env: {}", option.env);
        let _ = writeln!(out, "  start args: {}", option.args);
    }
    if let Some(parcels) = &detail.pending_parcels {
        let _ = writeln!(out, "  pending parcels: {}", parcels.len());
    }
    if let Some(peers) = &detail.peers {
        let _ = writeln!(out, "  peers ({}): {}", peers.len(), peers.join(", "));
    }
    if let Some(list) = &detail.whitelist {
        access_list(&mut out, "whitelist", list);
    }
    if let Some(list) = &detail.blacklist {
        access_list(&mut out, "blacklist", list);
    }
    if let Some(hardware) = &detail.hardware {
        let cpu = hardware
            .cpu_usage
            .iter()
            .map(|usage| format!("{:.0}%", usage * 100.0))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "  cpu: {cpu}");
        usage_line(&mut out, "disk", &hardware.disk_usage);
        usage_line(&mut out, "memory", &hardware.memory_usage);
    }
    if let Some(events) = &detail.events {
        let _ = writeln!(out, "  events:");
        for event in events {
            let _ = writeln!(out, "    {event}");
        }
    }
    field(&mut out, "log file", log_link);
    out.trim_end().to_string()
}

fn field(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = writeln!(out, "  {label}: {value}");
    }
}

fn access_list(out: &mut String, label: &str, list: &AccessList) {
    let state = if list.enabled { "enabled" } else { "disabled" };
    let _ = writeln!(out, "  {label} ({state}):");
    for entry in &list.list {
        match &entry.tag {
            Some(tag) => {
                let _ = writeln!(out, "    {} {}", entry.addr, tag);
            }
            None => {
                let _ = writeln!(out, "    {}", entry.addr);
            }
        }
    }
}

fn usage_line(out: &mut String, label: &str, usage: &HardwareUsage) {
    let _ = writeln!(
        out,
        "  {label}: {} / {} ({:.1}%)",
        usage.used(),
        usage.total,
        usage.percentage_used * 100.0
    );
}

pub fn log_line(record: &LogRecord) -> String {
    format!(
        "{} {:<5} {} {} {}",
        record.timestamp, record.level, record.node_name, record.target, record.message
    )
}

pub fn log_lines(records: &[LogRecord]) -> String {
    if records.is_empty() {
        return "No logs.".to_string();
    }
    records.iter().map(log_line).collect::<Vec<_>>().join("\n")
}

pub fn targets(targets: &[String]) -> String {
    if targets.is_empty() {
        return "No targets.".to_string();
    }
    targets.join("\n")
}

pub fn graph_series(series: &BTreeMap<NodeName, Vec<(DateTime<Utc>, f64)>>) -> String {
    if series.is_empty() {
        return "No data.".to_string();
    }
    let mut out = String::new();
    for (node, points) in series {
        let _ = writeln!(out, "{node}");
        for (time, value) in points {
            let _ = writeln!(out, "  {} {value}", time.to_rfc3339());
        }
    }
    out.trim_end().to_string()
}

pub fn extension_rows(node: &str, rows: &[NetworkOutExtensionRow]) -> String {
    if rows.is_empty() {
        return "No data.".to_string();
    }
    let mut by_extension: BTreeMap<&str, Vec<&NetworkOutExtensionRow>> = BTreeMap::new();
    for row in rows {
        by_extension.entry(row.extension.as_str()).or_default().push(row);
    }
    let mut out = String::new();
    let _ = writeln!(out, "{node}");
    for (extension, mut rows) in by_extension {
        rows.sort_by_key(|row| row.time);
        let _ = writeln!(out, "  {extension}");
        for row in rows {
            let _ = writeln!(out, "    {} {}", row.time.to_rfc3339(), row.value);
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccd_core::{
        AccessEntry, BlockId, Connection, HardwareInfo, NodeStatus, NodeVersion, StartOption,
    };
    use chrono::TimeZone;

    fn node(name: &str, address: &str, status: NodeStatus, block: i64) -> NodeSummary {
        NodeSummary {
            name: name.to_string(),
            address: Some(address.to_string()),
            status,
            version: Some(NodeVersion {
                version: "1.0.0".to_string(),
                hash: "abc".to_string(),
            }),
            best_block_id: Some(BlockId {
                block_number: block,
                hash: "0x01".to_string(),
            }),
        }
    }

    fn topology() -> Topology {
        Topology {
            nodes: vec![
                node("bob", "10.0.0.2:3485", NodeStatus::Stop, 7),
                node("alice", "10.0.0.1:3485", NodeStatus::Run, 12),
            ],
            connections: vec![Connection::new("alice", "bob")],
        }
    }

    #[test]
    fn network_table_follows_sort_key() {
        let text = network_table(&topology(), SortKey::BlockNumber, true);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].starts_with("alice"));
        assert!(lines[2].starts_with("bob"));
        assert!(text.ends_with("alice <-> bob"));

        let text = network_table(&topology(), SortKey::Name, true);
        assert!(text.lines().nth(1).expect("row").starts_with("bob"));
    }

    #[test]
    fn loading_and_empty_topologies_read_differently() {
        assert_eq!(
            topology_view(TopologyView::Loading, SortKey::Name, false),
            "Loading..."
        );
        let empty = Topology::default();
        assert_eq!(
            topology_view(TopologyView::Ready(&empty), SortKey::Name, false),
            "No nodes."
        );
    }

    #[test]
    fn missing_fields_render_as_placeholder() {
        let topology = Topology {
            nodes: vec![NodeSummary {
                name: "ufo".to_string(),
                address: None,
                status: NodeStatus::Ufo,
                version: None,
                best_block_id: None,
            }],
            connections: vec![],
        };
        let text = network_table(&topology, SortKey::Name, false);
        let row = text.lines().nth(1).expect("row");
        assert_eq!(row.split_whitespace().collect::<Vec<_>>(), ["ufo", "-", "UFO", "-", "-"]);
    }

    #[test]
    fn node_detail_lists_sections_and_log_link() {
        let detail = NodeDetail {
            name: "alice".to_string(),
            start_option: Some(StartOption {
                env: "RUST_LOG=info".to_string(),
                args: "--port 3485".to_string(),
            }),
            address: Some("10.0.0.1:3485".to_string()),
            agent_version: Some("0.1.0".to_string()),
            status: NodeStatus::Run,
            version: None,
            best_block_id: None,
            pending_parcels: Some(vec![]),
            peers: Some(vec!["10.0.0.2:3485".to_string()]),
            whitelist: Some(AccessList {
                list: vec![AccessEntry {
                    addr: "10.0.0.0/24".to_string(),
                    tag: Some("lan".to_string()),
                }],
                enabled: true,
            }),
            blacklist: None,
            hardware: Some(HardwareInfo {
                cpu_usage: vec![0.25, 0.5],
                disk_usage: HardwareUsage {
                    total: 100,
                    available: 40,
                    percentage_used: 0.6,
                },
                memory_usage: HardwareUsage::default(),
            }),
            events: Some(vec!["started".to_string()]),
        };

        let text = node_detail(&detail, Some("http://logs/alice"));
        assert!(text.starts_with("alice (Run)"));
        assert!(text.contains("  start args: --port 3485"));
        assert!(text.contains("  peers (1): 10.0.0.2:3485"));
        assert!(text.contains("  whitelist (enabled):\n    10.0.0.0/24 lan"));
        assert!(text.contains("  cpu: 25% 50%"));
        assert!(text.contains("  disk: 60 / 100 (60.0%)"));
        assert!(text.ends_with("  log file: http://logs/alice"));
    }

    #[test]
    fn graph_series_lists_each_node() {
        let at = Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0).single().expect("time");
        let mut series = BTreeMap::new();
        series.insert("alice".to_string(), vec![(at, 1.5)]);
        assert_eq!(
            graph_series(&series),
            "alice\n  2018-10-01T00:00:00+00:00 1.5"
        );
        assert_eq!(graph_series(&BTreeMap::new()), "No data.");
    }

    #[test]
    fn extension_rows_group_by_extension() {
        let at = |hour| Utc.with_ymd_and_hms(2018, 10, 1, hour, 0, 0).single().expect("time");
        let rows = vec![
            NetworkOutExtensionRow {
                extension: "block-sync".to_string(),
                time: at(2),
                value: 3.0,
            },
            NetworkOutExtensionRow {
                extension: "block-sync".to_string(),
                time: at(1),
                value: 2.0,
            },
            NetworkOutExtensionRow {
                extension: "discovery".to_string(),
                time: at(1),
                value: 1.0,
            },
        ];
        let text = extension_rows("alice", &rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "alice");
        assert_eq!(lines[1], "  block-sync");
        assert!(lines[2].contains("01:00:00"));
        assert_eq!(lines[4], "  discovery");
    }

    #[test]
    fn notices_are_prefixed() {
        assert_eq!(notice(&Notice::HubNotResponding), "! Agent hub is not responding.");
        assert_eq!(header("CCD", ConnectionState::Open), "CCD [open]");
    }
}
