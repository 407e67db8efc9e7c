//! Liveness tool — exposes the session health snapshot to the agent.

use async_trait::async_trait;
use oilstab_core::error::ToolError;
use oilstab_core::tool::{Tool, ToolResult};
use oilstab_session::SessionManager;
use std::sync::Arc;

pub struct LivenessProbeTool {
    manager: Arc<SessionManager>,
}

impl LivenessProbeTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for LivenessProbeTool {
    fn name(&self) -> &str {
        "simulation_liveness"
    }

    fn description(&self) -> &str {
        "Report whether the simulator can accept work: readiness, session state, \
         number of queued requests and the current engine generation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let liveness = self.manager.liveness();
        let output = match &liveness.reason {
            Some(reason) => format!("not ready: {reason}"),
            None if liveness.ready => format!(
                "ready ({}, {} queued)",
                liveness.state, liveness.queue_depth
            ),
            None => "not ready".to_string(),
        };
        let data = serde_json::to_value(&liveness).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;
        Ok(ToolResult {
            call_id: String::new(),
            success: liveness.ready,
            output,
            data: Some(data),
        })
    }
}
