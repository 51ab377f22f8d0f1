use crate::merge::{merge_detail, MergeReport};
use ccd_core::{NodeDetail, NodeName, NodeUpdateInfo};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailOutcome {
    Merged(MergeReport),
    DroppedAbsent,
}

/// Detail records exist only for nodes fetched explicitly; pushes never create one.
#[derive(Debug, Default)]
pub struct NodeDetailStore {
    details: HashMap<NodeName, NodeDetail>,
}

impl NodeDetailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_detail(&mut self, detail: NodeDetail) {
        self.details.insert(detail.name.clone(), detail);
    }

    pub fn apply_update(&mut self, update: NodeUpdateInfo) -> DetailOutcome {
        let Some(detail) = self.details.get_mut(&update.name) else {
            debug!(event = "node_update_dropped", node = %update.name, reason = "absent");
            return DetailOutcome::DroppedAbsent;
        };
        let name = update.name.clone();
        let report = merge_detail(detail, update);
        if !report.is_empty() {
            debug!(event = "node_detail_merged", node = %name, fields = ?report.changed());
        }
        DetailOutcome::Merged(report)
    }

    pub fn get(&self, name: &str) -> Option<&NodeDetail> {
        self.details.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.details.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.details.len()
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }
}
