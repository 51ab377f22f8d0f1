use crate::merge::merge_summary;
use ccd_core::{Connection, NodeName, NodeSummary, Topology, TopologyDelta};
use tracing::debug;

/// "Unset" and "no nodes" are different answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopologyView<'a> {
    Loading,
    Ready(&'a Topology),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied { added: usize, updated: usize },
    DroppedUnset,
}

#[derive(Debug, Default)]
pub struct TopologyStore {
    topology: Option<Topology>,
    fetching: bool,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_fetch(&self) -> bool {
        !self.fetching
    }

    /// Marks a snapshot fetch as outstanding. Returns false if one already is.
    pub fn begin_fetch(&mut self) -> bool {
        if !self.should_fetch() {
            return false;
        }
        self.fetching = true;
        true
    }

    pub fn fetch_failed(&mut self) {
        self.fetching = false;
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    pub fn set_snapshot(&mut self, topology: Topology) {
        debug!(
            event = "topology_snapshot",
            nodes = topology.nodes.len(),
            connections = topology.connections.len()
        );
        self.topology = Some(topology);
        self.fetching = false;
    }

    pub fn apply_delta(&mut self, delta: TopologyDelta) -> DeltaOutcome {
        let Some(topology) = self.topology.as_mut() else {
            debug!(event = "topology_delta_dropped", reason = "unset");
            return DeltaOutcome::DroppedUnset;
        };

        let mut added = 0;
        let mut updated = 0;
        for patch in delta.nodes.unwrap_or_default() {
            match topology.nodes.iter_mut().find(|node| node.name == patch.name) {
                Some(existing) => {
                    let name = existing.name.clone();
                    let report = merge_summary(existing, patch);
                    if !report.is_empty() {
                        debug!(event = "topology_node_merged", node = %name, fields = ?report.changed());
                        updated += 1;
                    }
                }
                None => {
                    topology.nodes.push(NodeSummary::from(patch));
                    added += 1;
                }
            }
        }

        for connection in delta.connections_added.unwrap_or_default() {
            if !topology.connections.contains(&connection) {
                topology.connections.push(connection);
            }
        }
        let removed = delta.connections_removed.unwrap_or_default();
        if !removed.is_empty() {
            topology
                .connections
                .retain(|connection: &Connection| !removed.contains(connection));
        }

        DeltaOutcome::Applied { added, updated }
    }

    pub fn view(&self) -> TopologyView<'_> {
        match &self.topology {
            Some(topology) => TopologyView::Ready(topology),
            None => TopologyView::Loading,
        }
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn node(&self, name: &str) -> Option<&NodeSummary> {
        self.topology
            .as_ref()
            .and_then(|topology| topology.nodes.iter().find(|node| node.name == name))
    }

    pub fn node_names(&self) -> Vec<NodeName> {
        self.topology
            .as_ref()
            .map(|topology| topology.nodes.iter().map(|node| node.name.clone()).collect())
            .unwrap_or_default()
    }
}
