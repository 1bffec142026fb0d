//! Groundwork Workflow Documents
//!
//! This crate provides the serde-facing types for workflow definitions: the
//! standalone YAML configuration file and the `Workflow` cluster resource,
//! plus the conversion into the engine's in-memory representation.
//!
//! Only the `v1alpha1` document shape is handled here. Backward-compatible
//! revisions can extend these types; an incompatible revision would be added
//! alongside with its own conversion.

pub mod convert;
pub mod error;
pub mod metadata;
pub mod workflow;

pub use convert::*;
pub use error::*;
pub use metadata::*;
pub use workflow::*;

/// API version for the Workflow resource
pub const API_VERSION: &str = "groundwork.dev/v1alpha1";

/// API group for the Workflow resource
pub const API_GROUP: &str = "groundwork.dev";

/// API version string
pub const VERSION: &str = "v1alpha1";

/// Kind of the Workflow resource
pub const WORKFLOW_KIND: &str = "Workflow";

/// Plural resource name used by the API server
pub const WORKFLOW_PLURAL: &str = "workflows";
