pub mod api;
pub mod config;
pub mod notify;
pub mod session;

pub use api::{ApiResult, HubApi, NodeStartError};
pub use config::{ConfigError, SessionConfig};
pub use notify::{ChannelNotifier, Notice, Notifier, TracingNotifier};
pub use session::{CallOutcome, ConnectionState, SessionError, SessionManager};
