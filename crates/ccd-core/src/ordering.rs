//! Comparators backing the node table's sort options.

use crate::NodeSummary;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Address,
    BlockNumber,
    Version,
    Status,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Address => "address",
            SortKey::BlockNumber => "block",
            SortKey::Version => "version",
            SortKey::Status => "status",
        }
    }

    pub fn comparator(&self) -> fn(&NodeSummary, &NodeSummary) -> Ordering {
        match self {
            SortKey::Name => by_name,
            SortKey::Address => by_address,
            SortKey::BlockNumber => by_block_number,
            SortKey::Version => by_version,
            SortKey::Status => by_status,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "name" => Ok(SortKey::Name),
            "address" | "socketaddress" | "socket_address" => Ok(SortKey::Address),
            "block" | "blocknumber" | "block_number" => Ok(SortKey::BlockNumber),
            "version" => Ok(SortKey::Version),
            "status" => Ok(SortKey::Status),
            other => Err(format!("Unknown sort key: {other}")),
        }
    }
}

/// Stable sort; `descending` swaps the comparator operands.
pub fn sort_nodes(nodes: &mut [NodeSummary], key: SortKey, descending: bool) {
    let compare = key.comparator();
    if descending {
        nodes.sort_by(|a, b| compare(b, a));
    } else {
        nodes.sort_by(|a, b| compare(a, b));
    }
}

pub fn by_name(a: &NodeSummary, b: &NodeSummary) -> Ordering {
    a.name.cmp(&b.name)
}

pub fn by_address(a: &NodeSummary, b: &NodeSummary) -> Ordering {
    let parse = |node: &NodeSummary| match node.address.as_deref() {
        Some(address) => address
            .split(|ch| ch == '.' || ch == ':')
            .filter(|segment| !segment.is_empty())
            .map(leading_number)
            .collect(),
        None => vec![0; 5],
    };
    compare_segments(&parse(a), &parse(b))
}

pub fn by_block_number(a: &NodeSummary, b: &NodeSummary) -> Ordering {
    let block = |node: &NodeSummary| {
        node.best_block_id
            .as_ref()
            .map(|block| block.block_number)
            .unwrap_or(0)
    };
    block(a).cmp(&block(b))
}

pub fn by_version(a: &NodeSummary, b: &NodeSummary) -> Ordering {
    let parse = |node: &NodeSummary| match node.version.as_ref() {
        Some(version) => version.version.split('.').map(leading_number).collect(),
        None => vec![0; 3],
    };
    compare_segments(&parse(a), &parse(b))
}

/// `Error < Stop < Starting < Updating < Run < UFO`
pub fn by_status(a: &NodeSummary, b: &NodeSummary) -> Ordering {
    a.status.rank().cmp(&b.status.rank())
}

/// Compares numerically per segment; a missing segment counts as zero.
fn compare_segments(a: &[i64], b: &[i64]) -> Ordering {
    let len = a.len().max(b.len());
    for idx in 0..len {
        let left = a.get(idx).copied().unwrap_or(0);
        let right = b.get(idx).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn leading_number(segment: &str) -> i64 {
    let digits: String = segment
        .trim()
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockId, NodeStatus, NodeVersion};

    fn node(name: &str, status: NodeStatus, address: &str, version: &str, block: i64) -> NodeSummary {
        NodeSummary {
            name: name.to_string(),
            address: Some(address.to_string()),
            status,
            version: Some(NodeVersion {
                version: version.to_string(),
                hash: String::new(),
            }),
            best_block_id: Some(BlockId {
                block_number: block,
                hash: String::new(),
            }),
        }
    }

    fn fleet() -> Vec<NodeSummary> {
        vec![
            node("eve", NodeStatus::Error, "172.88.192.91:1010", "1.2.7", 270),
            node("david", NodeStatus::Updating, "110.202.81.27:9090", "2.1.1", 320),
            node("charlie", NodeStatus::Stop, "119.202.81.99:8002", "1.1.4", 200),
            node("bob", NodeStatus::Starting, "141.223.175.99:8001", "1.0.1", 300),
            node("alice", NodeStatus::Run, "119.202.81.99:8000", "1.0.2", 100),
        ]
    }

    fn names(nodes: &[NodeSummary]) -> Vec<&str> {
        nodes.iter().map(|node| node.name.as_str()).collect()
    }

    #[test]
    fn orders_by_name() {
        let mut nodes = fleet();
        sort_nodes(&mut nodes, SortKey::Name, false);
        assert_eq!(names(&nodes), vec!["alice", "bob", "charlie", "david", "eve"]);
    }

    #[test]
    fn orders_by_socket_address_numerically() {
        let mut nodes = fleet();
        sort_nodes(&mut nodes, SortKey::Address, false);
        assert_eq!(names(&nodes), vec!["david", "alice", "charlie", "bob", "eve"]);
    }

    #[test]
    fn orders_by_block_number() {
        let mut nodes = fleet();
        sort_nodes(&mut nodes, SortKey::BlockNumber, false);
        assert_eq!(names(&nodes), vec!["alice", "charlie", "eve", "bob", "david"]);
    }

    #[test]
    fn orders_by_version_per_segment() {
        let mut nodes = fleet();
        sort_nodes(&mut nodes, SortKey::Version, false);
        let versions: Vec<&str> = nodes
            .iter()
            .filter_map(|node| node.version.as_ref().map(|v| v.version.as_str()))
            .collect();
        assert_eq!(versions, vec!["1.0.1", "1.0.2", "1.1.4", "1.2.7", "2.1.1"]);
    }

    #[test]
    fn version_segments_compare_as_numbers_not_text() {
        let a = node("a", NodeStatus::Run, "1.1.1.1:1", "1.10.0", 0);
        let b = node("b", NodeStatus::Run, "1.1.1.1:1", "1.9.3", 0);
        assert_eq!(by_version(&a, &b), Ordering::Greater);
        let short = node("c", NodeStatus::Run, "1.1.1.1:1", "1.2", 0);
        let long = node("d", NodeStatus::Run, "1.1.1.1:1", "1.2.0", 0);
        assert_eq!(by_version(&short, &long), Ordering::Equal);
    }

    #[test]
    fn orders_by_status_rank() {
        let mut nodes = fleet();
        nodes.push(NodeSummary {
            name: "stranger".to_string(),
            address: None,
            status: NodeStatus::Ufo,
            version: None,
            best_block_id: None,
        });
        sort_nodes(&mut nodes, SortKey::Status, false);
        let statuses: Vec<NodeStatus> = nodes.iter().map(|node| node.status).collect();
        assert_eq!(
            statuses,
            vec![
                NodeStatus::Error,
                NodeStatus::Stop,
                NodeStatus::Starting,
                NodeStatus::Updating,
                NodeStatus::Run,
                NodeStatus::Ufo,
            ]
        );
    }

    #[test]
    fn descending_reverses_order_and_missing_fields_sort_first() {
        let mut nodes = fleet();
        nodes.push(NodeSummary {
            name: "ghost".to_string(),
            address: None,
            status: NodeStatus::Ufo,
            version: None,
            best_block_id: None,
        });
        sort_nodes(&mut nodes, SortKey::BlockNumber, true);
        assert_eq!(nodes.first().map(|n| n.name.as_str()), Some("david"));
        assert_eq!(nodes.last().map(|n| n.name.as_str()), Some("ghost"));
    }

    #[test]
    fn sort_key_parses_aliases() {
        assert_eq!("socketAddress".parse::<SortKey>(), Ok(SortKey::Address));
        assert_eq!("blockNumber".parse::<SortKey>(), Ok(SortKey::BlockNumber));
        assert!("height".parse::<SortKey>().is_err());
    }
}
