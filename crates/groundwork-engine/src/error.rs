//! Error types for the workflow engine
//!
//! Errors are grouped by the phase that produces them: configuration and
//! graph errors surface before any module executes, execution errors carry
//! the failing operation in the run result.

use thiserror::Error;

use crate::value::ValueType;

/// Error type for workflow engine failures
#[derive(Debug, Error)]
pub enum EngineError {
    /// No module is registered under the requested id
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Two operations in the same workflow share an id
    #[error("duplicate operation id: {0}")]
    DuplicateOperation(String),

    /// A required input was not provided
    #[error("missing required input {input:?} for operation {operation:?}")]
    MissingInput { input: String, operation: String },

    /// A static input value does not match the module's declared type
    #[error(
        "input {input:?} for operation {operation:?} is static but is not assignable to expected type {expected}"
    )]
    InputTypeMismatch {
        input: String,
        operation: String,
        expected: ValueType,
    },

    /// An input references an operation that is not part of the workflow
    #[error("dependency operation {dependency:?} for input {input:?} in operation {operation:?} not found")]
    DependencyNotFound {
        dependency: String,
        input: String,
        operation: String,
    },

    /// An input references an output the dependency module never declared
    #[error(
        "output {output:?} from dependency operation {dependency:?} for input {input:?} in operation {operation:?} not found"
    )]
    DependencyOutputNotFound {
        output: String,
        dependency: String,
        input: String,
        operation: String,
    },

    /// A dependency-sourced input's declared type differs from the dependency output's type
    #[error(
        "input {input:?} for operation {operation:?} does not match expected type {expected} from dependency {dependency:?}"
    )]
    DependencyTypeMismatch {
        input: String,
        operation: String,
        expected: ValueType,
        dependency: String,
    },

    /// A declared input default is not assignable to the declared input type
    #[error("default for input {input:?} of module {module:?} is not assignable to type {expected}")]
    DefaultTypeMismatch {
        input: String,
        module: String,
        expected: ValueType,
    },

    /// The dependency graph contains a cycle
    #[error("operation cycle detected involving {0:?}")]
    OperationCycle(String),

    /// An explicit dependency id does not name any operation
    #[error("operation {operation:?} depends on unknown operation {dependency:?}")]
    DanglingDependency {
        operation: String,
        dependency: String,
    },

    /// A module asked for an input that is not in its context
    #[error("input does not exist: {0}")]
    InputDoesNotExist(String),

    /// An input's type could not be determined
    #[error("unable to determine input type")]
    UnknownInputType,

    /// A module wrote the same output key twice in one execution
    #[error("output key already exists: {0}")]
    DuplicateOutput(String),

    /// A module wrote an output it never declared. This indicates a module bug.
    #[error("output {key:?} is not declared by module {module:?}")]
    UndeclaredOutput { key: String, module: String },

    /// A dependency published outputs but not the requested key
    #[error("output key does not exist: {0}")]
    OutputDoesNotExist(String),

    /// A dependency's context was never recorded. Topological ordering makes
    /// this unreachable in a well-formed run.
    #[error("dependency operation context not found: {0}")]
    MissingDependencyContext(String),

    /// An instantiated module disappeared from the execution's cache.
    #[error("unable to find module for operation {0:?}")]
    MissingModule(String),

    /// A module rejected its operation during the validate phase
    #[error("validation failed for operation {operation}: {source}")]
    Validation {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// The run was cancelled before or during execution
    #[error("workflow cancelled")]
    Cancelled,

    /// A module-level failure during check or set
    #[error(transparent)]
    Module(#[from] anyhow::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
