use crate::config::ConsoleConfig;
use crate::render;
use anyhow::{Context, Result};
use ccd_core::hub_rpc::{PushEvent, PushTopic};
use ccd_core::ordering::SortKey;
use ccd_core::{GraphPeriod, LogLevel, LogPage, OrderBy, StartOption, UpdateCodeChainRequest};
use ccd_reconciler::{
    ApplyOutcome, DashboardStore, DeltaOutcome, DetailOutcome, FilterChange, PushOutcome,
    RequestToken, AUTO_REFRESH_PERIOD,
};
use ccd_session::{CallOutcome, ConnectionState, HubApi, NodeStartError, Notice, SessionError};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Everything the long-running loops react to.
pub enum AppEvent {
    Push(PushEvent),
    Logs {
        token: RequestToken,
        result: Result<CallOutcome<LogPage>, SessionError>,
    },
    Connection(ConnectionState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphKind {
    All,
    Average,
    Node(String),
}

#[derive(Debug, Clone, Default)]
pub struct LogsOptions {
    pub nodes: Vec<String>,
    pub levels: Vec<LogLevel>,
    pub targets: Vec<String>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub ascending: bool,
    pub limit: Option<u32>,
    pub pages: u32,
    pub follow: bool,
}

impl LogsOptions {
    fn filter_change(&self) -> FilterChange {
        FilterChange {
            node_names: (!self.nodes.is_empty()).then(|| self.nodes.clone()),
            levels: (!self.levels.is_empty()).then(|| self.levels.clone()),
            targets: (!self.targets.is_empty()).then(|| self.targets.clone()),
            search: self.search.clone(),
            from_time: self.from,
            to_time: self.to,
            use_from_time: self.from.map(|_| true),
            use_to_time: self.to.map(|_| true),
            item_per_page: self.limit,
            order_by: self.ascending.then_some(OrderBy::Asc),
        }
    }
}

/// Store plus what the follow loop has already printed. No I/O.
pub struct ConsoleState {
    store: DashboardStore,
    printed_logs: HashSet<String>,
}

impl ConsoleState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            store: DashboardStore::new(now),
            printed_logs: HashSet::new(),
        }
    }

    pub fn store(&self) -> &DashboardStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DashboardStore {
        &mut self.store
    }

    /// Returns the lines to print for `event`.
    pub fn apply_event(&mut self, event: AppEvent) -> Vec<String> {
        match event {
            AppEvent::Push(push) => self.apply_push(push),
            AppEvent::Logs { token, result } => match result {
                Ok(CallOutcome::Ok(page)) => {
                    match self.store.logs_mut().apply_response(token, page.logs) {
                        ApplyOutcome::Applied => self.unprinted_log_lines(),
                        ApplyOutcome::Stale => Vec::new(),
                    }
                }
                Ok(CallOutcome::Suppressed(_)) => {
                    self.store.logs_mut().fetch_failed(token);
                    Vec::new()
                }
                Err(err) => {
                    self.store.logs_mut().fetch_failed(token);
                    warn!(event = "log_fetch_failed", token = %token, error = %err);
                    vec![format!("log fetch failed: {err}")]
                }
            },
            AppEvent::Connection(state) => vec![format!("connection {state}")],
        }
    }

    fn apply_push(&mut self, push: PushEvent) -> Vec<String> {
        let node = match &push {
            PushEvent::NodeUpdated(update) => Some(update.name.clone()),
            PushEvent::DashboardUpdated(_) => None,
        };
        match self.store.apply_push(push) {
            PushOutcome::Topology(DeltaOutcome::Applied { added, updated })
                if added + updated > 0 =>
            {
                vec![format!("network: {added} added, {updated} updated")]
            }
            PushOutcome::Detail(DetailOutcome::Merged(report)) if !report.is_empty() => {
                vec![format!(
                    "{}: {} changed",
                    node.unwrap_or_default(),
                    report.changed().join(", ")
                )]
            }
            _ => Vec::new(),
        }
    }

    /// The follow buffer is newest first; unseen records come out oldest first.
    fn unprinted_log_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for record in self.store.logs().logs().iter().rev() {
            if self.printed_logs.insert(record.id.clone()) {
                lines.push(render::log_line(record));
            }
        }
        lines
    }
}

pub struct App {
    api: HubApi,
    config: ConsoleConfig,
    state: ConsoleState,
    notices: mpsc::UnboundedReceiver<Notice>,
}

impl App {
    pub fn new(api: HubApi, config: ConsoleConfig, notices: mpsc::UnboundedReceiver<Notice>) -> Self {
        Self {
            api,
            config,
            state: ConsoleState::new(Utc::now()),
            notices,
        }
    }

    pub fn flush_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            eprintln!("{}", render::notice(&notice));
        }
    }

    pub async fn shutdown(mut self) {
        self.api.session().close().await;
        self.flush_notices();
    }

    pub async fn network(&mut self, key: SortKey, descending: bool) -> Result<()> {
        self.refresh_network().await?;
        self.print_header();
        println!(
            "{}",
            render::topology_view(self.state.store().topology().view(), key, descending)
        );
        Ok(())
    }

    pub async fn node_info(&mut self, node: &str) -> Result<()> {
        let outcome = self
            .api
            .node_info(node)
            .await
            .with_context(|| format!("failed to fetch info for {node}"))?;
        if let CallOutcome::Ok(detail) = outcome {
            self.state.store_mut().set_node_detail(detail);
            self.print_detail(node);
        }
        Ok(())
    }

    pub async fn node_start(&mut self, node: &str, option: StartOption) -> Result<()> {
        match self.api.node_start(node, &option).await {
            Ok(CallOutcome::Ok(detail)) => {
                info!(event = "node_started", node, status = %detail.status);
                self.state.store_mut().set_node_detail(detail);
                self.print_detail(node);
                Ok(())
            }
            Ok(CallOutcome::Suppressed(_)) => Ok(()),
            Err(NodeStartError::Session(err)) => {
                Err(err).with_context(|| format!("failed to start {node}"))
            }
            Err(err) => {
                debug!(event = "node_start_rejected", node, error = %err);
                Ok(())
            }
        }
    }

    pub async fn node_stop(&mut self, node: &str) -> Result<()> {
        let outcome = self
            .api
            .node_stop(node)
            .await
            .with_context(|| format!("failed to stop {node}"))?;
        if let CallOutcome::Ok(detail) = outcome {
            self.state.store_mut().set_node_detail(detail);
            self.print_detail(node);
        }
        Ok(())
    }

    pub async fn node_update(&mut self, node: &str, request: UpdateCodeChainRequest) -> Result<()> {
        let outcome = self
            .api
            .node_update(node, &request)
            .await
            .with_context(|| format!("failed to update {node}"))?;
        if let CallOutcome::Ok(()) = outcome {
            println!("Update requested for {node}.");
        }
        Ok(())
    }

    pub async fn logs(&mut self, options: LogsOptions) -> Result<()> {
        if options.nodes.is_empty() {
            self.refresh_network().await?;
        }
        if options.targets.is_empty() {
            self.refresh_targets().await?;
        }
        self.state
            .store_mut()
            .logs_mut()
            .change_filters(options.filter_change());

        if options.follow {
            return self.follow_logs().await;
        }

        self.fetch_log_page(false).await?;
        for _ in 1..options.pages.max(1) {
            if self.state.store().logs().no_more_data() {
                break;
            }
            self.fetch_log_page(true).await?;
        }
        if self.state.store().logs().is_loaded() {
            println!("{}", render::log_lines(self.state.store().logs().logs()));
        }
        Ok(())
    }

    pub async fn targets(&mut self) -> Result<()> {
        self.refresh_targets().await?;
        if let Some(targets) = self.state.store().logs().targets() {
            println!("{}", render::targets(targets));
        }
        Ok(())
    }

    pub async fn graph(
        &mut self,
        kind: GraphKind,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        period: Option<GraphPeriod>,
    ) -> Result<()> {
        let graph = self.state.store_mut().graph_mut();
        if from.is_some() || to.is_some() {
            let current = graph.query();
            graph.change_window(from.unwrap_or(current.from), to.unwrap_or(current.to));
        }
        if let Some(period) = period {
            graph.set_period(period);
        }
        let query = graph.query();
        let average = kind == GraphKind::Average;

        match kind {
            GraphKind::All | GraphKind::Average => {
                let result = if average {
                    self.api.network_out_all_avg(&query).await
                } else {
                    self.api.network_out_all(&query).await
                };
                let outcome = result.context("failed to fetch network graph")?;
                if let CallOutcome::Ok(rows) = outcome {
                    self.state.store_mut().graph_mut().set_rows(rows.rows);
                    println!("{}", render::graph_series(&self.state.store().graph().series()));
                }
            }
            GraphKind::Node(node) => {
                let outcome = self
                    .api
                    .network_out_node_extension(&node, &query)
                    .await
                    .with_context(|| format!("failed to fetch graph for {node}"))?;
                if let CallOutcome::Ok(rows) = outcome {
                    println!("{}", render::extension_rows(&node, &rows.rows));
                }
            }
        }
        Ok(())
    }

    /// Raw call. Hub errors are printed as the JSON error object.
    pub async fn rpc(&mut self, method: &str, params: Option<&str>) -> Result<()> {
        let params: Value = match params {
            Some(text) => serde_json::from_str(text)
                .with_context(|| format!("invalid params JSON: {text}"))?,
            None => json!([]),
        };
        match self.api.raw(method, params).await {
            Ok(CallOutcome::Ok(value)) => {
                println!("{}", serde_json::to_string_pretty(&value)?);
                Ok(())
            }
            Ok(CallOutcome::Suppressed(_)) => Ok(()),
            Err(SessionError::Rpc {
                code,
                message,
                data,
            }) => {
                let error = json!({ "code": code, "message": message, "data": data });
                println!("{}", serde_json::to_string_pretty(&error)?);
                Ok(())
            }
            Err(err) => Err(err).with_context(|| format!("{method} failed")),
        }
    }

    /// Prints the network, then every change pushed by the hub until ctrl-c
    /// or until the session gives up.
    pub async fn watch(&mut self, nodes: &[String], key: SortKey, descending: bool) -> Result<()> {
        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        for topic in PushTopic::ALL {
            self.api.session().on_push(topic, push_tx.clone());
        }
        self.network(key, descending).await?;
        for node in nodes {
            self.node_info(node).await?;
        }
        self.flush_notices();

        let mut state_rx = self.api.session().watch_state();
        let _ = state_rx.borrow_and_update();
        loop {
            tokio::select! {
                Some(push) = push_rx.recv() => {
                    self.print_lines(AppEvent::Push(push));
                }
                Some(notice) = self.notices.recv() => {
                    eprintln!("{}", render::notice(&notice));
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *state_rx.borrow_and_update();
                    self.print_lines(AppEvent::Connection(state));
                    if state == ConnectionState::Closed {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        println!(
            "{}",
            render::topology_view(self.state.store().topology().view(), key, descending)
        );
        Ok(())
    }

    async fn follow_logs(&mut self) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut ticker = tokio::time::interval(AUTO_REFRESH_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        if self
            .state
            .store_mut()
            .logs_mut()
            .set_auto_refresh(true, Utc::now())
        {
            self.spawn_log_fetch(&event_tx);
        }

        let mut state_rx = self.api.session().watch_state();
        let _ = state_rx.borrow_and_update();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.state.store_mut().logs_mut().auto_refresh_tick(Utc::now()) {
                        self.spawn_log_fetch(&event_tx);
                    }
                }
                Some(event) = event_rx.recv() => {
                    self.print_lines(event);
                }
                Some(notice) = self.notices.recv() => {
                    eprintln!("{}", render::notice(&notice));
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *state_rx.borrow_and_update();
                    self.print_lines(AppEvent::Connection(state));
                    if state == ConnectionState::Closed {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        self.state
            .store_mut()
            .logs_mut()
            .set_auto_refresh(false, Utc::now());
        Ok(())
    }

    fn spawn_log_fetch(&mut self, event_tx: &mpsc::Sender<AppEvent>) {
        let (token, request) = self.state.store_mut().logs_mut().begin_fetch(false);
        let api = self.api.clone();
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let result = api.log_get(&request).await;
            let _ = event_tx.send(AppEvent::Logs { token, result }).await;
        });
    }

    async fn fetch_log_page(&mut self, more: bool) -> Result<()> {
        let logs = self.state.store_mut().logs_mut();
        let (token, request) = if more {
            logs.load_more()
        } else {
            logs.begin_fetch(false)
        };
        match self.api.log_get(&request).await {
            Ok(CallOutcome::Ok(page)) => {
                self.state
                    .store_mut()
                    .logs_mut()
                    .apply_response(token, page.logs);
                Ok(())
            }
            Ok(CallOutcome::Suppressed(_)) => {
                self.state.store_mut().logs_mut().fetch_failed(token);
                Ok(())
            }
            Err(err) => {
                self.state.store_mut().logs_mut().fetch_failed(token);
                Err(err).context("failed to fetch logs")
            }
        }
    }

    async fn refresh_network(&mut self) -> Result<()> {
        if !self.state.store_mut().topology_mut().begin_fetch() {
            return Ok(());
        }
        match self.api.get_network().await {
            Ok(CallOutcome::Ok(topology)) => {
                self.state.store_mut().set_topology(topology);
                Ok(())
            }
            Ok(CallOutcome::Suppressed(_)) => {
                self.state.store_mut().topology_mut().fetch_failed();
                Ok(())
            }
            Err(err) => {
                self.state.store_mut().topology_mut().fetch_failed();
                Err(err).context("failed to fetch the network")
            }
        }
    }

    async fn refresh_targets(&mut self) -> Result<()> {
        if !self.state.store_mut().logs_mut().begin_targets_fetch() {
            return Ok(());
        }
        match self.api.log_targets().await {
            Ok(CallOutcome::Ok(targets)) => {
                self.state.store_mut().logs_mut().set_targets(targets.targets);
                Ok(())
            }
            Ok(CallOutcome::Suppressed(_)) => {
                self.state.store_mut().logs_mut().targets_fetch_failed();
                Ok(())
            }
            Err(err) => {
                self.state.store_mut().logs_mut().targets_fetch_failed();
                Err(err).context("failed to fetch log targets")
            }
        }
    }

    fn print_header(&self) {
        println!(
            "{}",
            render::header(&self.config.title, self.api.session().state())
        );
    }

    fn print_detail(&self, node: &str) {
        if let Some(detail) = self.state.store().details().get(node) {
            let link = self.config.log_file_link(node);
            println!("{}", render::node_detail(detail, link.as_deref()));
        }
    }

    fn print_lines(&mut self, event: AppEvent) {
        for line in self.state.apply_event(event) {
            println!("{line}");
        }
    }
}
