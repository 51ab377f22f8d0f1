pub mod graph;
pub mod log_query;
pub mod merge;
pub mod node_detail;
pub mod topology;

pub use graph::GraphState;
pub use log_query::{
    ApplyOutcome, FilterChange, LogQueryState, RequestToken, TimeWindow, AUTO_REFRESH_PERIOD,
};
pub use merge::{FieldPolicy, MergeReport};
pub use node_detail::{DetailOutcome, NodeDetailStore};
pub use topology::{DeltaOutcome, TopologyStore, TopologyView};

use ccd_core::hub_rpc::PushEvent;
use ccd_core::{NodeDetail, Topology};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Topology(DeltaOutcome),
    Detail(DetailOutcome),
}

/// Owns every reconciled view. Presentation code reads through the shared
/// accessors; only the owner of the store mutates it.
#[derive(Debug)]
pub struct DashboardStore {
    topology: TopologyStore,
    details: NodeDetailStore,
    logs: LogQueryState,
    graph: GraphState,
}

impl DashboardStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            topology: TopologyStore::new(),
            details: NodeDetailStore::new(),
            logs: LogQueryState::new(now),
            graph: GraphState::new(now),
        }
    }

    /// Pushes are applied in arrival order, one at a time.
    pub fn apply_push(&mut self, push: PushEvent) -> PushOutcome {
        match push {
            PushEvent::DashboardUpdated(delta) => {
                PushOutcome::Topology(self.topology.apply_delta(delta))
            }
            PushEvent::NodeUpdated(update) => PushOutcome::Detail(self.details.apply_update(update)),
        }
    }

    /// Installs a snapshot and selects every known node in the log filter.
    pub fn set_topology(&mut self, topology: Topology) {
        let node_names = topology.nodes.iter().map(|node| node.name.clone()).collect();
        self.topology.set_snapshot(topology);
        self.logs.change_filters(FilterChange {
            node_names: Some(node_names),
            ..Default::default()
        });
    }

    pub fn set_node_detail(&mut self, detail: NodeDetail) {
        self.details.set_detail(detail);
    }

    pub fn topology(&self) -> &TopologyStore {
        &self.topology
    }

    pub fn details(&self) -> &NodeDetailStore {
        &self.details
    }

    pub fn logs(&self) -> &LogQueryState {
        &self.logs
    }

    pub fn graph(&self) -> &GraphState {
        &self.graph
    }

    pub fn topology_mut(&mut self) -> &mut TopologyStore {
        &mut self.topology
    }

    pub fn logs_mut(&mut self) -> &mut LogQueryState {
        &mut self.logs
    }

    pub fn graph_mut(&mut self) -> &mut GraphState {
        &mut self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccd_core::{NodeStatus, NodeSummary, NodeSummaryPatch, NodeUpdateInfo, TopologyDelta};

    fn store() -> DashboardStore {
        DashboardStore::new(Utc::now())
    }

    #[test]
    fn pushes_route_to_their_views() {
        let mut store = store();
        store.set_topology(Topology {
            nodes: vec![NodeSummary {
                name: "n1".to_string(),
                address: None,
                status: NodeStatus::Run,
                version: None,
                best_block_id: None,
            }],
            connections: vec![],
        });

        let outcome = store.apply_push(PushEvent::DashboardUpdated(TopologyDelta {
            nodes: Some(vec![NodeSummaryPatch {
                name: "n2".to_string(),
                status: Some(NodeStatus::Run),
                ..Default::default()
            }]),
            ..Default::default()
        }));
        assert_eq!(
            outcome,
            PushOutcome::Topology(DeltaOutcome::Applied { added: 1, updated: 0 })
        );

        let outcome = store.apply_push(PushEvent::NodeUpdated(NodeUpdateInfo {
            name: "n1".to_string(),
            status: Some(NodeStatus::Stop),
            ..Default::default()
        }));
        assert_eq!(outcome, PushOutcome::Detail(DetailOutcome::DroppedAbsent));
        assert!(store.details().is_empty());
    }

    #[test]
    fn snapshot_selects_all_nodes_for_logs() {
        let mut store = store();
        store.set_topology(Topology {
            nodes: vec![
                NodeSummary {
                    name: "alice".to_string(),
                    address: None,
                    status: NodeStatus::Run,
                    version: None,
                    best_block_id: None,
                },
                NodeSummary {
                    name: "bob".to_string(),
                    address: None,
                    status: NodeStatus::Stop,
                    version: None,
                    best_block_id: None,
                },
            ],
            connections: vec![],
        });
        assert_eq!(store.logs().filter().node_names, vec!["alice", "bob"]);
        assert!(matches!(store.topology().view(), TopologyView::Ready(_)));
    }
}
