//! Module contract
//!
//! Modules are reusable implementations of the check-then-set pattern for a
//! class of resource. The engine instantiates one fresh module per operation
//! per run and drives it through validate, check and (when needed) set.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::ModuleContext;
use crate::error::Result;
use crate::operation::Operation;
use crate::value::{Value, ValueType};

/// Factory signature registered for each module id.
///
/// Factories only construct the instance; any setup or verification happens
/// later through the module methods.
pub type ModuleFactory = fn() -> Box<dyn Module>;

/// Flags applied to a module context, used by the testing helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextFlag {
    /// Force reconciliation even when the state appears correct.
    Tainted,
    /// Invert the desired state: the operation ensures absence.
    DoesNotExist,
}

/// Declared metadata for a single module input.
#[derive(Debug, Clone)]
pub struct InputSpec {
    /// Short description of the value, surfaced in the module catalog.
    pub description: &'static str,

    /// The type an assigned value must satisfy.
    pub value_type: ValueType,

    /// Whether the input must be provided by the operation.
    pub required: bool,

    /// Default substituted when an optional input is not provided. Must be
    /// assignable to `value_type`.
    pub default: Option<Value>,
}

/// Declared metadata for a single module output.
///
/// Declared outputs form the contract downstream operations validate against
/// before anything executes.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub description: &'static str,
    pub value_type: ValueType,
}

/// Static metadata describing a module.
#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    /// Identifier used in workflow documents and logs.
    pub id: &'static str,

    /// Human-readable module name.
    pub name: &'static str,

    /// What the module manages and how it should be used.
    pub description: &'static str,

    /// Inputs the module consumes, keyed by input name.
    pub inputs: HashMap<&'static str, InputSpec>,

    /// Outputs the module publishes, keyed by output name.
    pub outputs: HashMap<&'static str, OutputSpec>,

    /// Example YAML snippets, keyed by a short title.
    pub examples: HashMap<&'static str, &'static str>,
}

/// The interface every module implements.
///
/// `check` must be a safe, non-destructive probe for the expected state. If
/// the state does not hold it returns `false` and the engine calls `set` to
/// reconcile. Both receive the per-operation [`ModuleContext`] for inputs,
/// outputs and flags.
#[async_trait]
pub trait Module: Send + Sync {
    /// Static metadata about the module. Pure.
    fn info(&self) -> ModuleInfo;

    /// Validate the operation's settings before execution.
    ///
    /// Called once per operation per run after graph construction. Only
    /// static inputs may be inspected; dependency-sourced inputs are unknown
    /// at this point and must be skipped. Errors here are fatal for the
    /// workflow.
    fn validate(&self, op: &Operation) -> Result<()>;

    /// Probe whether the desired state already holds.
    ///
    /// Must publish any outputs the module declares when returning `true`;
    /// may publish them on `false` when already known. A module must report
    /// `false` while the context is tainted, and must interpret the
    /// does-not-exist flag as "the resource should be absent".
    async fn check(&mut self, ctx: &ModuleContext) -> Result<bool>;

    /// Bring the resource into the desired state.
    ///
    /// Called when `check` reported the state does not hold. Must publish all
    /// declared outputs on success.
    async fn set(&mut self, ctx: &ModuleContext) -> Result<()>;
}
