//! Queue message carried by the asynchronous execution path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::JsonMap;

/// Request to run an already-persisted execution.
///
/// Keyed by `execution_id` for partition affinity. Republished verbatim to
/// the dead-letter channel once the fault ceiling is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMessage {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    #[serde(default)]
    pub inputs: JsonMap,
}

impl WorkflowMessage {
    pub fn new(workflow_id: Uuid, execution_id: Uuid, inputs: JsonMap) -> Self {
        Self {
            workflow_id,
            execution_id,
            inputs,
        }
    }

    /// Partition key: the execution id as a string.
    pub fn key(&self) -> String {
        self.execution_id.to_string()
    }
}
