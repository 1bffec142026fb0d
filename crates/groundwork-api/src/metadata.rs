//! Kubernetes-style metadata for the workflow resource

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Type metadata (apiVersion, kind)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

impl TypeMeta {
    /// Type metadata for the Workflow resource
    pub fn workflow() -> Self {
        Self {
            api_version: crate::API_VERSION.to_string(),
            kind: crate::WORKFLOW_KIND.to_string(),
        }
    }
}

/// Object metadata (name, namespace, labels)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name (required)
    #[serde(default)]
    pub name: String,

    /// Namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Resource version for optimistic concurrency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Labels for organizing resources
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl ObjectMeta {
    /// Create new metadata with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create new metadata with name and namespace
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_meta_workflow() {
        let tm = TypeMeta::workflow();
        assert_eq!(tm.api_version, "groundwork.dev/v1alpha1");
        assert_eq!(tm.kind, "Workflow");
    }

    #[test]
    fn test_object_meta_serialization() {
        let meta = ObjectMeta::with_namespace("wf-1", "infra");
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"name\":\"wf-1\""));
        assert!(json.contains("\"namespace\":\"infra\""));
        // Empty collections are omitted.
        assert!(!json.contains("labels"));
    }
}
