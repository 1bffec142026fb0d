//! Per-operation module context
//!
//! A module context is the bag each module call receives: the merged input
//! map (statics, defaults, dependency-produced values), the output sink, the
//! operation flags, and the run's cancellation signal. Outputs persist after
//! the module returns so downstream operations can consume them.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::module::ModuleInfo;
use crate::operation::Operation;
use crate::value::{Input, Value};

/// Context passed to modules during check and set.
pub struct ModuleContext {
    module_id: String,
    inputs: HashMap<String, Input>,
    outputs: Mutex<HashMap<String, Value>>,
    /// Output keys the module declared. `None` disables the declaration
    /// check, which the testing helpers rely on.
    declared_outputs: Option<HashSet<String>>,
    tainted: bool,
    does_not_exist: bool,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ModuleContext {
    /// Build the context for an operation.
    ///
    /// Static inputs are copied from the operation, then every input the
    /// module declares that is still unset and is either optional or has a
    /// default is filled in (an optional input without a default becomes an
    /// empty input). Dependency-sourced inputs stay unresolved here; the
    /// executor injects them right before execution.
    pub(crate) fn new(
        op: &Operation,
        info: &ModuleInfo,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        let mut inputs: HashMap<String, Input> = op
            .inputs
            .iter()
            .filter(|(_, input)| input.is_static())
            .map(|(k, input)| (k.clone(), input.clone()))
            .collect();

        for (name, spec) in &info.inputs {
            if inputs.contains_key(*name) {
                continue;
            }
            if let Some(default) = &spec.default {
                inputs.insert(name.to_string(), Input::from_value(default.clone()));
            } else if !spec.required {
                inputs.insert(name.to_string(), Input::null());
            }
        }

        Self {
            module_id: op.module.clone(),
            inputs,
            outputs: Mutex::new(HashMap::new()),
            declared_outputs: Some(info.outputs.keys().map(|k| k.to_string()).collect()),
            tainted: op.tainted,
            does_not_exist: op.does_not_exist,
            cancel,
            deadline,
        }
    }

    pub(crate) fn from_parts(
        inputs: HashMap<String, Input>,
        tainted: bool,
        does_not_exist: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            module_id: String::new(),
            inputs,
            outputs: Mutex::new(HashMap::new()),
            declared_outputs: None,
            tainted,
            does_not_exist,
            cancel,
            deadline: None,
        }
    }

    /// Look up an input by name.
    pub fn input(&self, key: &str) -> Result<Input> {
        self.inputs
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::InputDoesNotExist(key.to_string()))
    }

    /// Publish an output value.
    ///
    /// Each key may be written at most once per execution; rewriting is an
    /// error and the first write is preserved. Writing a key the module never
    /// declared is a module bug and is rejected.
    pub fn output(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if let Some(declared) = &self.declared_outputs {
            if !declared.contains(&key) {
                return Err(EngineError::UndeclaredOutput {
                    key,
                    module: self.module_id.clone(),
                });
            }
        }
        let mut outputs = self.outputs.lock().expect("output map poisoned");
        if outputs.contains_key(&key) {
            return Err(EngineError::DuplicateOutput(key));
        }
        outputs.insert(key, value.into());
        Ok(())
    }

    /// True when the operation ensures the resource is absent.
    pub fn does_not_exist(&self) -> bool {
        self.does_not_exist
    }

    /// True when the operation must be reconciled even if the state appears
    /// correct. A check on a tainted resource must report false.
    pub fn tainted(&self) -> bool {
        self.tainted
    }

    /// True once the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the run is cancelled. Modules block on this in
    /// `tokio::select!` around long-running work.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// The run's cancellation token, for handing to spawned work.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deadline for the run, when one was configured.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Inject a dependency-produced value as a static input.
    pub(crate) fn set_input(&mut self, key: impl Into<String>, value: Value) {
        self.inputs.insert(key.into(), Input::from_value(value));
    }

    /// Read a published output, for wiring into a dependent operation.
    pub(crate) fn get_output(&self, key: &str) -> Result<Value> {
        let outputs = self.outputs.lock().expect("output map poisoned");
        outputs
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::OutputDoesNotExist(key.to_string()))
    }

    /// Snapshot of all published outputs.
    pub fn outputs(&self) -> HashMap<String, Value> {
        self.outputs.lock().expect("output map poisoned").clone()
    }
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module_id", &self.module_id)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("tainted", &self.tainted)
            .field("does_not_exist", &self.does_not_exist)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::InputSpec;
    use crate::value::ValueType;

    fn stub_info() -> ModuleInfo {
        ModuleInfo {
            id: "ctx_test",
            inputs: HashMap::from([
                (
                    "host",
                    InputSpec {
                        description: "server host",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from("localhost")),
                    },
                ),
                (
                    "label",
                    InputSpec {
                        description: "optional label",
                        value_type: ValueType::String,
                        required: false,
                        default: None,
                    },
                ),
                (
                    "name",
                    InputSpec {
                        description: "resource name",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
            ]),
            outputs: HashMap::from([(
                "result",
                crate::module::OutputSpec {
                    description: "probe result",
                    value_type: ValueType::String,
                },
            )]),
            ..ModuleInfo::default()
        }
    }

    fn stub_op() -> Operation {
        Operation {
            module: "ctx_test".to_string(),
            id: "op-1".to_string(),
            inputs: HashMap::from([("name".to_string(), Input::from_value("db-main"))]),
            ..Operation::default()
        }
    }

    #[test]
    fn test_context_merges_defaults() {
        let ctx = ModuleContext::new(&stub_op(), &stub_info(), CancellationToken::new(), None);

        assert_eq!(ctx.input("name").unwrap().as_str(), "db-main");
        // Unset input with a default resolves to the default.
        assert_eq!(ctx.input("host").unwrap().as_str(), "localhost");
        // Optional input without a default is present but empty.
        let label = ctx.input("label").unwrap();
        assert_eq!(label.as_str(), "");
        assert!(label.auto().is_err());
    }

    #[test]
    fn test_context_missing_input() {
        let ctx = ModuleContext::new(&stub_op(), &stub_info(), CancellationToken::new(), None);
        let err = ctx.input("nope").unwrap_err();
        assert!(matches!(err, EngineError::InputDoesNotExist(k) if k == "nope"));
    }

    #[test]
    fn test_output_write_once() {
        let ctx = ModuleContext::new(&stub_op(), &stub_info(), CancellationToken::new(), None);

        ctx.output("result", "first").unwrap();
        let err = ctx.output("result", "second").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateOutput(k) if k == "result"));

        // The first write is preserved.
        match ctx.get_output("result").unwrap() {
            Value::String(s) => assert_eq!(s, "first"),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_output_must_be_declared() {
        let ctx = ModuleContext::new(&stub_op(), &stub_info(), CancellationToken::new(), None);
        let err = ctx.output("surprise", true).unwrap_err();
        assert!(matches!(err, EngineError::UndeclaredOutput { key, .. } if key == "surprise"));
    }

    #[test]
    fn test_missing_output() {
        let ctx = ModuleContext::new(&stub_op(), &stub_info(), CancellationToken::new(), None);
        let err = ctx.get_output("result").unwrap_err();
        assert!(matches!(err, EngineError::OutputDoesNotExist(_)));
    }

    #[test]
    fn test_flags_and_cancellation() {
        let mut op = stub_op();
        op.tainted = true;
        op.does_not_exist = true;
        let cancel = CancellationToken::new();
        let ctx = ModuleContext::new(&op, &stub_info(), cancel.clone(), None);

        assert!(ctx.tainted());
        assert!(ctx.does_not_exist());
        assert!(!ctx.is_cancelled());
        cancel.cancel();
        assert!(ctx.is_cancelled());
    }
}
