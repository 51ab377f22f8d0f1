//! User-facing notices raised by the session layer.

use ccd_core::hub_rpc::CommonError;
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    HubUnreachable,
    HubNotResponding,
    ReconnectExhausted { attempts: u32 },
    AgentNotFound,
    CodeChainIsNotRunning,
    InternalError,
    AlreadyRunning { node: String },
    EnvParseError { node: String },
    CodeChainUpdating { node: String },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::HubUnreachable => "hub_unreachable",
            Notice::HubNotResponding => "hub_not_responding",
            Notice::ReconnectExhausted { .. } => "reconnect_exhausted",
            Notice::AgentNotFound => "agent_not_found",
            Notice::CodeChainIsNotRunning => "codechain_not_running",
            Notice::InternalError => "internal_error",
            Notice::AlreadyRunning { .. } => "already_running",
            Notice::EnvParseError { .. } => "env_parse_error",
            Notice::CodeChainUpdating { .. } => "codechain_updating",
        }
    }
}

impl From<CommonError> for Notice {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::AgentNotFound => Notice::AgentNotFound,
            CommonError::CodeChainIsNotRunning => Notice::CodeChainIsNotRunning,
            CommonError::InternalError => Notice::InternalError,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::HubUnreachable => f.write_str("Agent hub is closed."),
            Notice::HubNotResponding => f.write_str("Agent hub is not responding."),
            Notice::ReconnectExhausted { attempts } => {
                write!(f, "Gave up reconnecting to the agent hub after {attempts} attempts.")
            }
            Notice::AgentNotFound => f.write_str("Agent not found"),
            Notice::CodeChainIsNotRunning => f.write_str("CodeChain is not running."),
            Notice::InternalError => f.write_str("Internal error"),
            Notice::AlreadyRunning { node } => write!(f, "{node} is already running."),
            Notice::EnvParseError { node } => write!(f, "Invalid env string for {node}."),
            Notice::CodeChainUpdating { node } => write!(f, "{node} is updating."),
        }
    }
}

/// Sink for notices. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Logs notices and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        warn!(event = "notice", kind = notice.kind(), message = %notice);
    }
}

/// Forwards notices to a receiver owned by the presentation layer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.tx.send(notice.clone()).is_err() {
            TracingNotifier.notify(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_errors_map_to_their_notices() {
        assert_eq!(Notice::from(CommonError::AgentNotFound), Notice::AgentNotFound);
        assert_eq!(
            Notice::from(CommonError::CodeChainIsNotRunning).to_string(),
            "CodeChain is not running."
        );
    }

    #[test]
    fn channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        notifier.notify(Notice::HubUnreachable);
        notifier.notify(Notice::HubNotResponding);
        assert_eq!(rx.try_recv().ok(), Some(Notice::HubUnreachable));
        assert_eq!(rx.try_recv().ok(), Some(Notice::HubNotResponding));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        notifier.notify(Notice::InternalError);
    }
}
