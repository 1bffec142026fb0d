//! Workflow document types
//!
//! These types model workflows as written by users: either a standalone YAML
//! configuration file or a `Workflow` resource in a Kubernetes cluster. Both
//! share the same spec shape and convert into the engine's in-memory
//! representation before running.

use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ApiError, Result};
use crate::metadata::{ObjectMeta, TypeMeta};

/// The spec section of a workflow: the values the engine actually runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Optional human description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// A partially ordered set of operations to be executed
    pub operations: Vec<OperationSpec>,
}

/// A single operation in a workflow document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationSpec {
    /// Short name for the operation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Long-form description of the operation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Identifier for the operation, referenced by other operations for
    /// dependencies
    pub id: String,

    /// Module to be instantiated for the operation; must match the id of a
    /// registered module
    pub module: String,

    /// Named inputs for the module. Each is either a static scalar or
    /// structured value, or a `fromDependency` object naming the operation
    /// and output to take the value from at runtime.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub inputs: HashMap<String, OperationInput>,

    /// Ids of operations that must complete before this one runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Indicates the resource should not exist. Useful for resources removed
    /// from a previous desired state.
    #[serde(default)]
    pub does_not_exist: bool,

    /// Forces reconciliation even when the state appears correct. Reserved
    /// for use by modules, not workflow authors.
    #[serde(default)]
    pub tainted: bool,
}

/// A single input value for an operation.
///
/// Inputs are static unless they carry a `fromDependency` clause; when the
/// clause is absent the remaining value is taken as the static value.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationInput {
    /// The value comes from the output of another operation at runtime
    FromDependency(FromDependency),
    /// A static value known when the document is loaded
    Static(serde_json::Value),
}

/// Reference to the output of another operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FromDependency {
    /// Identifier of the operation to take the output value from
    pub id: String,

    /// Output key on that operation. May reference non-scalar values.
    pub output: String,
}

impl Serialize for OperationInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            OperationInput::FromDependency(dep) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("fromDependency", dep)?;
                map.end()
            }
            OperationInput::Static(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for OperationInput {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::Object(map) = &raw {
            if let Some(clause) = map.get("fromDependency") {
                let dep: FromDependency =
                    serde_json::from_value(clause.clone()).map_err(serde::de::Error::custom)?;
                return Ok(OperationInput::FromDependency(dep));
            }
        }
        Ok(OperationInput::Static(raw))
    }
}

/// A workflow as defined in a standalone YAML configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowFile {
    pub name: String,

    #[serde(flatten)]
    pub spec: WorkflowSpec,
}

impl WorkflowFile {
    /// Parse a workflow configuration file document.
    pub fn from_yaml(doc: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(doc)?)
    }
}

/// The Workflow cluster resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    pub metadata: ObjectMeta,

    pub spec: WorkflowSpec,

    /// Runtime status, written back after each run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
}

impl Workflow {
    /// Validate the resource carries the fields the runner needs.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(ApiError::MissingField("metadata.name".to_string()));
        }
        if self.spec.operations.is_empty() {
            return Err(ApiError::MissingField("spec.operations".to_string()));
        }
        Ok(())
    }
}

/// Runtime status and result information about a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// When the workflow was last run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ran: Option<chrono::DateTime<chrono::Utc>>,

    /// Whether the last run was successful ("true"/"false")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub successful: String,

    /// The phase the last run ended in
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,

    /// Result information from the last run, including the error message
    /// when applicable
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result: String,

    /// Operations completed in the last run, as "done/total"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operations_completed: String,

    /// Identifier of the last operation the run touched
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_operation: String,
}

impl WorkflowStatus {
    /// Render a run result into a resource status.
    pub fn from_run(
        result: &groundwork_engine::RunResult,
        started: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            last_ran: Some(started),
            successful: result.is_success().to_string(),
            phase: result.phase.to_string(),
            result: result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
            operations_completed: format!(
                "{}/{}",
                result.completed_operations, result.total_operations
            ),
            last_operation: result
                .error
                .as_ref()
                .and_then(|_| result.operation.clone())
                .unwrap_or_default(),
        }
    }
}
