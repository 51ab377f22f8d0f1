//! Log viewer query state with last-issued-request-wins response handling.

use ccd_core::{
    LogFilter, LogGetRequest, LogLevel, LogRecord, LogTimeRange, NodeName, OrderBy,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ITEM_PER_PAGE: u32 = 15;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;
pub const AUTO_REFRESH_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Stale,
}

/// Bounds are kept even while disabled so re-enabling restores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub use_from: bool,
    pub use_to: bool,
}

impl TimeWindow {
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            from: now - ChronoDuration::days(days),
            to: now,
            use_from: false,
            use_to: false,
        }
    }

    fn as_range(&self) -> LogTimeRange {
        LogTimeRange {
            from_time: self.use_from.then_some(self.from),
            to_time: self.use_to.then_some(self.to),
        }
    }
}

/// Partial edit of the query. `None` leaves the current value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChange {
    pub node_names: Option<Vec<NodeName>>,
    pub levels: Option<Vec<LogLevel>>,
    pub targets: Option<Vec<String>>,
    pub search: Option<String>,
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    pub use_from_time: Option<bool>,
    pub use_to_time: Option<bool>,
    pub item_per_page: Option<u32>,
    pub order_by: Option<OrderBy>,
}

impl FilterChange {
    fn touches_time(&self) -> bool {
        self.from_time.is_some()
            || self.to_time.is_some()
            || self.use_from_time.is_some()
            || self.use_to_time.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingFetch {
    token: RequestToken,
    append: bool,
    item_per_page: u32,
    page: u32,
    /// Page to fall back to if a load-more never lands.
    page_before: u32,
}

#[derive(Debug)]
pub struct LogQueryState {
    filter: LogFilter,
    search: String,
    time: TimeWindow,
    page: u32,
    item_per_page: u32,
    order_by: OrderBy,
    logs: Option<Vec<LogRecord>>,
    no_more_data: bool,
    last_token: u64,
    outstanding: Option<PendingFetch>,
    targets: Option<Vec<String>>,
    fetching_targets: bool,
    auto_refresh: bool,
}

impl LogQueryState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            filter: LogFilter {
                node_names: Vec::new(),
                levels: LogLevel::ALL.to_vec(),
                targets: Vec::new(),
            },
            search: String::new(),
            time: TimeWindow::last_days(now, DEFAULT_LOOKBACK_DAYS),
            page: 1,
            item_per_page: DEFAULT_ITEM_PER_PAGE,
            order_by: OrderBy::Desc,
            logs: None,
            no_more_data: false,
            last_token: 0,
            outstanding: None,
            targets: None,
            fetching_targets: false,
            auto_refresh: false,
        }
    }

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn time(&self) -> TimeWindow {
        self.time
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn item_per_page(&self) -> u32 {
        self.item_per_page
    }

    pub fn order_by(&self) -> OrderBy {
        self.order_by
    }

    /// Empty until the first response lands.
    pub fn logs(&self) -> &[LogRecord] {
        self.logs.as_deref().unwrap_or(&[])
    }

    pub fn is_loaded(&self) -> bool {
        self.logs.is_some()
    }

    pub fn no_more_data(&self) -> bool {
        self.no_more_data
    }

    pub fn is_fetching(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    /// The request the current state would issue.
    pub fn request(&self) -> LogGetRequest {
        LogGetRequest {
            filter: self.filter.clone(),
            search: self.search.clone(),
            time: self.time.as_range(),
            page: self.page,
            item_per_page: self.item_per_page,
            order_by: self.order_by,
        }
    }

    /// Resets paging. A manual edit of the time range turns auto-refresh off.
    pub fn change_filters(&mut self, change: FilterChange) {
        if change.touches_time() && self.auto_refresh {
            debug!(event = "log_auto_refresh_cancelled", reason = "manual_time_edit");
            self.auto_refresh = false;
        }
        self.apply_change(change);
    }

    fn apply_change(&mut self, change: FilterChange) {
        if let Some(node_names) = change.node_names {
            self.filter.node_names = node_names;
        }
        if let Some(levels) = change.levels {
            self.filter.levels = levels;
        }
        if let Some(targets) = change.targets {
            self.filter.targets = targets;
        }
        if let Some(search) = change.search {
            self.search = search;
        }
        if let Some(from) = change.from_time {
            self.time.from = from;
        }
        if let Some(to) = change.to_time {
            self.time.to = to;
        }
        if let Some(use_from) = change.use_from_time {
            self.time.use_from = use_from;
        }
        if let Some(use_to) = change.use_to_time {
            self.time.use_to = use_to;
        }
        if let Some(item_per_page) = change.item_per_page {
            self.item_per_page = item_per_page.max(1);
        }
        if let Some(order_by) = change.order_by {
            self.order_by = order_by;
        }
        self.page = 1;
        self.no_more_data = false;
    }

    /// Supersedes any outstanding fetch; its response will come back stale.
    pub fn begin_fetch(&mut self, append: bool) -> (RequestToken, LogGetRequest) {
        self.abandon_outstanding();
        self.issue(append, self.page)
    }

    /// The page only stays advanced once the appended records arrive.
    pub fn load_more(&mut self) -> (RequestToken, LogGetRequest) {
        self.abandon_outstanding();
        let page_before = self.page;
        self.page += 1;
        self.issue(true, page_before)
    }

    fn issue(&mut self, append: bool, page_before: u32) -> (RequestToken, LogGetRequest) {
        self.last_token += 1;
        let token = RequestToken(self.last_token);
        self.outstanding = Some(PendingFetch {
            token,
            append,
            item_per_page: self.item_per_page,
            page: self.page,
            page_before,
        });
        (token, self.request())
    }

    fn abandon_outstanding(&mut self) {
        if let Some(previous) = self.outstanding.take() {
            debug!(event = "log_fetch_superseded", previous = %previous.token);
            self.roll_back_page(previous);
        }
    }

    /// No-op once a filter change has already reset paging.
    fn roll_back_page(&mut self, pending: PendingFetch) {
        if pending.append && self.page == pending.page {
            self.page = pending.page_before;
        }
    }

    pub fn apply_response(&mut self, token: RequestToken, logs: Vec<LogRecord>) -> ApplyOutcome {
        let Some(pending) = self.outstanding.filter(|pending| pending.token == token) else {
            debug!(event = "log_response_stale", token = %token, count = logs.len());
            return ApplyOutcome::Stale;
        };
        self.outstanding = None;

        let short_page = logs.len() < pending.item_per_page as usize;
        match (&mut self.logs, pending.append) {
            (Some(buffer), true) => buffer.extend(logs),
            (slot, _) => *slot = Some(logs),
        }
        if short_page {
            self.no_more_data = true;
        }
        ApplyOutcome::Applied
    }

    /// Clears the outstanding marker if `token` is still current.
    pub fn fetch_failed(&mut self, token: RequestToken) {
        if let Some(pending) = self.outstanding.filter(|pending| pending.token == token) {
            self.outstanding = None;
            self.roll_back_page(pending);
        }
    }

    pub fn targets(&self) -> Option<&[String]> {
        self.targets.as_deref()
    }

    pub fn should_fetch_targets(&self) -> bool {
        !self.fetching_targets
    }

    pub fn begin_targets_fetch(&mut self) -> bool {
        if !self.should_fetch_targets() {
            return false;
        }
        self.fetching_targets = true;
        true
    }

    pub fn targets_fetch_failed(&mut self) {
        self.fetching_targets = false;
    }

    /// Stores the known targets and selects all of them.
    pub fn set_targets(&mut self, targets: Vec<String>) {
        self.fetching_targets = false;
        self.apply_change(FilterChange {
            targets: Some(targets.clone()),
            ..Default::default()
        });
        self.targets = Some(targets);
    }

    /// Turning it on advances the window right away, like every later tick.
    /// Returns true when the caller should fetch.
    pub fn set_auto_refresh(&mut self, on: bool, now: DateTime<Utc>) -> bool {
        self.auto_refresh = on;
        debug!(event = "log_auto_refresh", on);
        if on {
            self.advance_to(now);
        }
        on
    }

    /// Returns true when the caller should fetch.
    pub fn auto_refresh_tick(&mut self, now: DateTime<Utc>) -> bool {
        if !self.auto_refresh {
            return false;
        }
        self.advance_to(now);
        true
    }

    fn advance_to(&mut self, now: DateTime<Utc>) {
        self.apply_change(FilterChange {
            to_time: Some(now),
            use_to_time: Some(true),
            order_by: Some(OrderBy::Desc),
            ..Default::default()
        });
    }
}
