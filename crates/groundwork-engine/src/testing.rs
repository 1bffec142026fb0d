//! Helpers for testing modules
//!
//! Module implementations are tested against a module context built directly
//! from a map of static inputs, without going through a workflow run.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::ModuleContext;
use crate::error::Result;
use crate::module::{ContextFlag, InputSpec, Module, ModuleInfo, OutputSpec};
use crate::operation::Operation;
use crate::registry;
use crate::value::{Input, Value, ValueType};

/// Build a module context from static inputs and flags, as if the values had
/// been resolved at runtime.
///
/// Non-static inputs are dropped since there is no dependency to resolve them
/// from. The returned context does not enforce output declarations.
pub fn context_from_inputs(
    inputs: HashMap<String, Input>,
    flags: &[ContextFlag],
) -> ModuleContext {
    let statics = inputs
        .into_iter()
        .filter(|(_, input)| input.is_static())
        .collect();
    ModuleContext::from_parts(
        statics,
        flags.contains(&ContextFlag::Tainted),
        flags.contains(&ContextFlag::DoesNotExist),
        tokio_util::sync::CancellationToken::new(),
    )
}

/// Build a module context directly from an operation, merging declared
/// defaults from the registered module's metadata. For testing and special
/// cases where a context is needed outside the normal execution flow;
/// dependency-sourced inputs stay unresolved.
///
/// # Panics
///
/// Panics when the operation's module is not registered.
pub fn op_context(op: &Operation) -> ModuleContext {
    let module = registry::new_module(op).expect("module not registered");
    ModuleContext::new(
        op,
        &module.info(),
        tokio_util::sync::CancellationToken::new(),
        None,
    )
}

/// Register [`StubModule`] under the id `stub_module`.
///
/// Safe to call repeatedly; only the first call registers.
pub fn register_stub_module() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| registry::register_module("stub_module", || Box::new(StubModule::default())));
}

const CHECK_RESULT: &str = "check_result";
const CHECK_ERROR: &str = "check_error";
const SET_RESULT: &str = "set_result";
const SET_ERROR: &str = "set_error";
const VALUE: &str = "value";
const RESULT: &str = "result";

/// A configurable module for exercising the engine.
///
/// `check_result` and `set_result` drive the outcome of each call;
/// `check_error` / `set_error` make the corresponding call fail. A string
/// given through `value` is republished as the `result` output, which lets
/// tests wire one stub operation into another.
#[derive(Debug, Default)]
pub struct StubModule;

impl StubModule {
    fn publish_value(&self, ctx: &ModuleContext) -> Result<()> {
        if let Ok(input) = ctx.input(VALUE) {
            if let Ok(Value::String(s)) = input.auto() {
                ctx.output(RESULT, s)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Module for StubModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "stub_module",
            name: "Stub Module",
            description: "A configurable module used to exercise workflow execution in tests.",
            inputs: HashMap::from([
                (
                    CHECK_RESULT,
                    InputSpec {
                        description: "Result the check call reports.",
                        value_type: ValueType::Bool,
                        required: true,
                        default: None,
                    },
                ),
                (
                    CHECK_ERROR,
                    InputSpec {
                        description: "Whether the check call fails.",
                        value_type: ValueType::Bool,
                        required: false,
                        default: Some(Value::Bool(false)),
                    },
                ),
                (
                    SET_RESULT,
                    InputSpec {
                        description: "Value published as the set_result output.",
                        value_type: ValueType::Bool,
                        required: true,
                        default: None,
                    },
                ),
                (
                    SET_ERROR,
                    InputSpec {
                        description: "Whether the set call fails.",
                        value_type: ValueType::Bool,
                        required: false,
                        default: Some(Value::Bool(false)),
                    },
                ),
                (
                    VALUE,
                    InputSpec {
                        description: "String republished as the result output.",
                        value_type: ValueType::String,
                        required: false,
                        default: None,
                    },
                ),
            ]),
            outputs: HashMap::from([
                (
                    SET_RESULT,
                    OutputSpec {
                        description: "Echo of the set_result input.",
                        value_type: ValueType::Bool,
                    },
                ),
                (
                    RESULT,
                    OutputSpec {
                        description: "Echo of the value input.",
                        value_type: ValueType::String,
                    },
                ),
            ]),
            examples: HashMap::from([(
                "Always reconcile",
                "id: stub-1\nmodule: stub_module\ninputs:\n  check_result: false\n  set_result: true",
            )]),
        }
    }

    fn validate(&self, _op: &Operation) -> Result<()> {
        Ok(())
    }

    async fn check(&mut self, ctx: &ModuleContext) -> Result<bool> {
        let check_result = ctx.input(CHECK_RESULT)?.as_bool();
        let check_error = ctx.input(CHECK_ERROR).map(|i| i.as_bool()).unwrap_or(false);
        if check_error {
            return Err(anyhow::anyhow!("stub error on check").into());
        }

        let passed = check_result && !ctx.tainted();
        if passed {
            let set_result = match ctx.input(SET_RESULT) {
                Ok(input) if input.auto().is_ok() => input.as_bool(),
                _ => true,
            };
            ctx.output(SET_RESULT, set_result)?;
            self.publish_value(ctx)?;
        }
        Ok(passed)
    }

    async fn set(&mut self, ctx: &ModuleContext) -> Result<()> {
        let set_result = ctx.input(SET_RESULT)?.as_bool();
        let set_error = ctx.input(SET_ERROR).map(|i| i.as_bool()).unwrap_or(false);
        if set_error {
            return Err(anyhow::anyhow!("stub error on set").into());
        }

        ctx.output(SET_RESULT, set_result)?;
        self.publish_value(ctx)?;
        Ok(())
    }
}
