//! Field-by-field merge of partial node records.
//!
//! Every field is either the record's identity (never touched by a merge) or
//! overwritten wholesale when the incoming record carries it. List-valued and
//! nested fields are replaced, never concatenated or merged recursively.

use ccd_core::{NodeDetail, NodeSummary, NodeSummaryPatch, NodeUpdateInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    Identity,
    Overwrite,
}

pub const SUMMARY_POLICY: &[(&str, FieldPolicy)] = &[
    ("name", FieldPolicy::Identity),
    ("address", FieldPolicy::Overwrite),
    ("status", FieldPolicy::Overwrite),
    ("version", FieldPolicy::Overwrite),
    ("bestBlockId", FieldPolicy::Overwrite),
];

pub const DETAIL_POLICY: &[(&str, FieldPolicy)] = &[
    ("name", FieldPolicy::Identity),
    ("startOption", FieldPolicy::Overwrite),
    ("address", FieldPolicy::Overwrite),
    ("agentVersion", FieldPolicy::Overwrite),
    ("status", FieldPolicy::Overwrite),
    ("version", FieldPolicy::Overwrite),
    ("bestBlockId", FieldPolicy::Overwrite),
    ("pendingParcels", FieldPolicy::Overwrite),
    ("peers", FieldPolicy::Overwrite),
    ("whitelist", FieldPolicy::Overwrite),
    ("blacklist", FieldPolicy::Overwrite),
    ("hardware", FieldPolicy::Overwrite),
    ("events", FieldPolicy::Overwrite),
];

pub fn policy_of(table: &[(&str, FieldPolicy)], field: &str) -> Option<FieldPolicy> {
    table
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, policy)| *policy)
}

/// Fields whose value actually changed during a merge, in policy-table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    changed: Vec<&'static str>,
}

impl MergeReport {
    pub fn changed(&self) -> &[&'static str] {
        &self.changed
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    fn overwrite<T: PartialEq>(&mut self, field: &'static str, target: &mut T, incoming: T) {
        if *target != incoming {
            *target = incoming;
            self.changed.push(field);
        }
    }

    fn overwrite_some<T: PartialEq>(
        &mut self,
        field: &'static str,
        target: &mut Option<T>,
        incoming: Option<T>,
    ) {
        if let Some(value) = incoming {
            self.overwrite(field, target, Some(value));
        }
    }
}

pub fn merge_summary(target: &mut NodeSummary, patch: NodeSummaryPatch) -> MergeReport {
    let mut report = MergeReport::default();
    report.overwrite_some("address", &mut target.address, patch.address);
    if let Some(status) = patch.status {
        report.overwrite("status", &mut target.status, status);
    }
    report.overwrite_some("version", &mut target.version, patch.version);
    report.overwrite_some("bestBlockId", &mut target.best_block_id, patch.best_block_id);
    report
}

pub fn merge_detail(target: &mut NodeDetail, update: NodeUpdateInfo) -> MergeReport {
    let mut report = MergeReport::default();
    report.overwrite_some("startOption", &mut target.start_option, update.start_option);
    report.overwrite_some("address", &mut target.address, update.address);
    report.overwrite_some("agentVersion", &mut target.agent_version, update.agent_version);
    if let Some(status) = update.status {
        report.overwrite("status", &mut target.status, status);
    }
    report.overwrite_some("version", &mut target.version, update.version);
    report.overwrite_some("bestBlockId", &mut target.best_block_id, update.best_block_id);
    report.overwrite_some("pendingParcels", &mut target.pending_parcels, update.pending_parcels);
    report.overwrite_some("peers", &mut target.peers, update.peers);
    report.overwrite_some("whitelist", &mut target.whitelist, update.whitelist);
    report.overwrite_some("blacklist", &mut target.blacklist, update.blacklist);
    report.overwrite_some("hardware", &mut target.hardware, update.hardware);
    report.overwrite_some("events", &mut target.events, update.events);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccd_core::{
        AccessEntry, AccessList, BlockId, HardwareInfo, HardwareUsage, NodeStatus, NodeVersion,
        StartOption,
    };

    fn detail(name: &str) -> NodeDetail {
        NodeDetail {
            name: name.to_string(),
            start_option: None,
            address: Some("10.0.0.1:3485".to_string()),
            agent_version: None,
            status: NodeStatus::Run,
            version: None,
            best_block_id: None,
            pending_parcels: None,
            peers: Some(vec!["A".to_string(), "B".to_string()]),
            whitelist: None,
            blacklist: None,
            hardware: None,
            events: Some(vec!["started".to_string()]),
        }
    }

    fn overwritten(table: &[(&'static str, FieldPolicy)]) -> Vec<&'static str> {
        table
            .iter()
            .filter(|(_, policy)| *policy == FieldPolicy::Overwrite)
            .map(|(name, _)| *name)
            .collect()
    }

    #[test]
    fn list_fields_are_replaced_not_concatenated() {
        let mut target = detail("alice");
        let report = merge_detail(
            &mut target,
            NodeUpdateInfo {
                name: "alice".to_string(),
                peers: Some(vec!["C".to_string()]),
                ..Default::default()
            },
        );
        assert_eq!(target.peers, Some(vec!["C".to_string()]));
        assert_eq!(report.changed(), &["peers"]);
    }

    #[test]
    fn absent_fields_leave_target_untouched() {
        let mut target = detail("alice");
        let before = target.clone();
        let report = merge_detail(
            &mut target,
            NodeUpdateInfo {
                name: "alice".to_string(),
                ..Default::default()
            },
        );
        assert!(report.is_empty());
        assert_eq!(target, before);
    }

    #[test]
    fn equal_values_are_not_reported() {
        let mut target = detail("alice");
        let report = merge_detail(
            &mut target,
            NodeUpdateInfo {
                name: "alice".to_string(),
                status: Some(NodeStatus::Run),
                address: Some("10.0.0.1:3485".to_string()),
                ..Default::default()
            },
        );
        assert!(report.is_empty());
    }

    #[test]
    fn identity_is_never_merged() {
        let mut target = detail("alice");
        merge_detail(
            &mut target,
            NodeUpdateInfo {
                name: "mallory".to_string(),
                status: Some(NodeStatus::Stop),
                ..Default::default()
            },
        );
        assert_eq!(target.name, "alice");
        assert_eq!(target.status, NodeStatus::Stop);
        assert_eq!(policy_of(DETAIL_POLICY, "name"), Some(FieldPolicy::Identity));
    }

    #[test]
    fn detail_merge_covers_every_overwrite_field() {
        let mut target = detail("alice");
        let usage = HardwareUsage {
            total: 100,
            available: 40,
            percentage_used: 60.0,
        };
        let report = merge_detail(
            &mut target,
            NodeUpdateInfo {
                name: "alice".to_string(),
                start_option: Some(StartOption {
                    env: "RUST_LOG=debug".to_string(),
                    args: String::new(),
                }),
                address: Some("10.0.0.9:3485".to_string()),
                agent_version: Some("0.1.0".to_string()),
                status: Some(NodeStatus::Updating),
                version: Some(NodeVersion {
                    version: "1.1.0".to_string(),
                    hash: "abc".to_string(),
                }),
                best_block_id: Some(BlockId {
                    block_number: 7,
                    hash: "0x07".to_string(),
                }),
                pending_parcels: Some(vec![serde_json::json!({"hash": "0x1"})]),
                peers: Some(vec![]),
                whitelist: Some(AccessList {
                    list: vec![AccessEntry {
                        addr: "10.0.0.2".to_string(),
                        tag: Some("office".to_string()),
                    }],
                    enabled: true,
                }),
                blacklist: Some(AccessList::default()),
                hardware: Some(HardwareInfo {
                    cpu_usage: vec![0.5, 0.25],
                    disk_usage: usage,
                    memory_usage: usage,
                }),
                events: Some(vec!["updated".to_string()]),
            },
        );
        assert_eq!(report.changed(), overwritten(DETAIL_POLICY).as_slice());
    }

    #[test]
    fn summary_merge_covers_every_overwrite_field() {
        let mut target = NodeSummary {
            name: "n1".to_string(),
            address: None,
            status: NodeStatus::Run,
            version: None,
            best_block_id: None,
        };
        let report = merge_summary(
            &mut target,
            NodeSummaryPatch {
                name: "n1".to_string(),
                address: Some("10.0.0.1:3485".to_string()),
                status: Some(NodeStatus::Stop),
                version: Some(NodeVersion {
                    version: "1.0.0".to_string(),
                    hash: String::new(),
                }),
                best_block_id: Some(BlockId {
                    block_number: 1,
                    hash: String::new(),
                }),
            },
        );
        assert_eq!(report.changed(), overwritten(SUMMARY_POLICY).as_slice());
        assert_eq!(target.status, NodeStatus::Stop);
    }
}
