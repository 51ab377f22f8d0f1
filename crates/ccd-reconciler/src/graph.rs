use ccd_core::{GraphPeriod, GraphQuery, NetworkOutAllRow, NodeName};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;

pub const DEFAULT_GRAPH_LOOKBACK_DAYS: i64 = 7;

/// Network-out-all chart: time window plus the last fetched rows.
#[derive(Debug, Clone)]
pub struct GraphState {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    period: GraphPeriod,
    rows: Vec<NetworkOutAllRow>,
}

impl GraphState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            from: now - ChronoDuration::days(DEFAULT_GRAPH_LOOKBACK_DAYS),
            to: now,
            period: GraphPeriod::Minutes5,
            rows: Vec::new(),
        }
    }

    pub fn query(&self) -> GraphQuery {
        GraphQuery {
            from: self.from,
            to: self.to,
            period: self.period,
        }
    }

    /// A window with `from` after `to` is swapped rather than rejected.
    pub fn change_window(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) {
        if from <= to {
            self.from = from;
            self.to = to;
        } else {
            self.from = to;
            self.to = from;
        }
    }

    pub fn set_period(&mut self, period: GraphPeriod) {
        self.period = period;
    }

    pub fn set_rows(&mut self, rows: Vec<NetworkOutAllRow>) {
        self.rows = rows;
    }

    pub fn rows(&self) -> &[NetworkOutAllRow] {
        &self.rows
    }

    /// Rows grouped per node, each series in time order.
    pub fn series(&self) -> BTreeMap<NodeName, Vec<(DateTime<Utc>, f64)>> {
        let mut series: BTreeMap<NodeName, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
        for row in &self.rows {
            series
                .entry(row.node_name.clone())
                .or_default()
                .push((row.time, row.value));
        }
        for points in series.values_mut() {
            points.sort_by_key(|(time, _)| *time);
        }
        series
    }
}
