//! Typed wrappers for the agent hub methods.

use crate::notify::Notice;
use crate::session::{CallOutcome, SessionError, SessionManager};
use ccd_core::hub_rpc::{ERR_ALREADY_RUNNING, ERR_CODECHAIN_UPDATING, ERR_ENV_PARSE};
use ccd_core::{
    GraphQuery, GraphRows, LogGetRequest, LogPage, LogTargets, NetworkOutAllRow,
    NetworkOutExtensionRow, NodeDetail, StartOption, Topology, UpdateCodeChainRequest,
};
use serde_json::{json, Value};
use thiserror::Error;

pub type ApiResult<T> = Result<CallOutcome<T>, SessionError>;

#[derive(Debug, Error)]
pub enum NodeStartError {
    #[error("{node} is already running")]
    AlreadyRunning { node: String },
    #[error("invalid env string for {node}: {message}")]
    EnvParse { node: String, message: String },
    #[error("{node} is updating")]
    Updating { node: String },
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Clone)]
pub struct HubApi {
    session: SessionManager,
}

impl HubApi {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub async fn get_network(&self) -> ApiResult<Topology> {
        self.session.call("dashboard_getNetwork", json!([])).await
    }

    pub async fn node_info(&self, node: &str) -> ApiResult<NodeDetail> {
        self.session.call("node_getInfo", json!([node])).await
    }

    pub async fn node_start(
        &self,
        node: &str,
        option: &StartOption,
    ) -> Result<CallOutcome<NodeDetail>, NodeStartError> {
        let result = self
            .session
            .call("node_start", json!([node, option]))
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(SessionError::Rpc { code, .. }) if code == ERR_ALREADY_RUNNING => {
                self.session.notify(Notice::AlreadyRunning {
                    node: node.to_string(),
                });
                Err(NodeStartError::AlreadyRunning {
                    node: node.to_string(),
                })
            }
            Err(SessionError::Rpc { code, message, .. }) if code == ERR_ENV_PARSE => {
                self.session.notify(Notice::EnvParseError {
                    node: node.to_string(),
                });
                Err(NodeStartError::EnvParse {
                    node: node.to_string(),
                    message,
                })
            }
            Err(SessionError::Rpc { code, .. }) if code == ERR_CODECHAIN_UPDATING => {
                self.session.notify(Notice::CodeChainUpdating {
                    node: node.to_string(),
                });
                Err(NodeStartError::Updating {
                    node: node.to_string(),
                })
            }
            Err(err) => Err(NodeStartError::Session(err)),
        }
    }

    pub async fn node_stop(&self, node: &str) -> ApiResult<NodeDetail> {
        self.session.call("node_stop", json!([node])).await
    }

    /// The hub replies with no payload; whatever it sends is discarded.
    pub async fn node_update(&self, node: &str, request: &UpdateCodeChainRequest) -> ApiResult<()> {
        let outcome: CallOutcome<Value> = self
            .session
            .call("node_update", json!([node, request]))
            .await?;
        Ok(outcome.map(|_| ()))
    }

    pub async fn log_targets(&self) -> ApiResult<LogTargets> {
        self.session.call("log_getTargets", json!([])).await
    }

    pub async fn log_get(&self, request: &LogGetRequest) -> ApiResult<LogPage> {
        self.session.call("log_get", json!([request])).await
    }

    pub async fn network_out_all(&self, query: &GraphQuery) -> ApiResult<GraphRows<NetworkOutAllRow>> {
        self.session
            .call("graph_network_out_all_node", json!([query]))
            .await
    }

    pub async fn network_out_all_avg(
        &self,
        query: &GraphQuery,
    ) -> ApiResult<GraphRows<NetworkOutAllRow>> {
        self.session
            .call("graph_network_out_all_node_avg", json!([query]))
            .await
    }

    pub async fn network_out_node_extension(
        &self,
        node: &str,
        query: &GraphQuery,
    ) -> ApiResult<GraphRows<NetworkOutExtensionRow>> {
        self.session
            .call("graph_network_out_node_extension", json!([node, query]))
            .await
    }

    /// Untyped passthrough for the RPC console.
    pub async fn raw(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.session.call(method, params).await
    }
}
