//! Workflow execution
//!
//! A workflow is a partially-ordered set of operations forming a directed
//! acyclic graph. Running a workflow drives every operation through the
//! check-then-set cycle in an order that respects the dependencies between
//! them. The engine is stateless: each run re-discovers the live state of
//! the world.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::context::ModuleContext;
use crate::error::EngineError;
use crate::graph::topo_sort;
use crate::module::{Module, ModuleInfo};
use crate::operation::Operation;
use crate::registry;
use crate::typecheck::check_inputs_outputs;

/// A series of operations reconciling a piece of infrastructure.
///
/// Operations may depend on the outputs of other operations; the workflow is
/// executed in an order that respects these dependencies.
#[derive(Default)]
pub struct Workflow {
    /// Short name or identifier for the workflow.
    pub name: String,

    /// Optional longer description.
    pub description: String,

    /// The operations to execute. Ids must be unique within the workflow.
    pub operations: Vec<Operation>,

    /// The original source of the workflow definition, if any. Loaders use
    /// this to publish run results back to wherever the workflow came from.
    pub source: Option<Arc<dyn Any + Send + Sync>>,
}

impl Workflow {
    /// Execute the workflow once.
    ///
    /// Phases run in order: setup (implicit dependency capture, module
    /// instantiation, topological sort), validate (type compatibility, then
    /// each module's own validation), execute (check-then-set per operation
    /// in topological order). Failure in any phase stops the run; the result
    /// reports the phase and, when known, the failing operation.
    pub async fn run(&mut self, options: RunOptions) -> RunResult {
        info!(workflow = %self.name, "starting workflow execution");
        let mut execution = WorkflowExecution::new();
        let result = execution.execute(self, options).await;
        match &result.error {
            None => info!(workflow = %self.name, "workflow execution complete"),
            Some(err) => info!(
                workflow = %self.name,
                phase = %result.phase,
                error = %err,
                "workflow execution did not complete"
            ),
        }
        result
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}

/// Options controlling a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cancellation signal propagated into every module context. Cancelling
    /// aborts the currently running module at its next cooperative point;
    /// further operations are not started.
    pub cancel: CancellationToken,

    /// Optional deadline exposed to modules through their context.
    pub deadline: Option<Instant>,
}

/// Execution phase a run ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Validate,
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => write!(f, "Setup"),
            Phase::Validate => write!(f, "Validate"),
            Phase::Execute => write!(f, "Execute"),
        }
    }
}

/// The result of running a workflow.
#[derive(Debug)]
pub struct RunResult {
    /// The phase the run ended in.
    pub phase: Phase,

    /// The last operation the run touched; `None` before execution begins
    /// when the failure is not attributable to a single operation.
    pub operation: Option<String>,

    /// Terminal error, `None` on success.
    pub error: Option<EngineError>,

    /// Number of operations in the workflow.
    pub total_operations: usize,

    /// Number of operations that completed in this run.
    pub completed_operations: usize,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// State for one run of a workflow: the per-operation contexts holding
/// published outputs for downstream consumers.
pub(crate) struct WorkflowExecution {
    pub(crate) contexts: HashMap<String, ModuleContext>,
}

impl WorkflowExecution {
    pub(crate) fn new() -> Self {
        Self {
            contexts: HashMap::new(),
        }
    }

    pub(crate) async fn execute(
        &mut self,
        workflow: &mut Workflow,
        options: RunOptions,
    ) -> RunResult {
        let mut result = RunResult {
            phase: Phase::Setup,
            operation: None,
            error: None,
            total_operations: workflow.operations.len(),
            completed_operations: 0,
        };

        // Capture implicit dependencies on every operation before building
        // the graph.
        for op in &mut workflow.operations {
            if let Err(err) = op.setup() {
                result.operation = Some(op.id.clone());
                result.error = Some(err);
                return result;
            }
        }
        let workflow = &*workflow;

        // Instantiate a fresh module per operation and cache its metadata.
        let mut modules: HashMap<String, Box<dyn Module>> =
            HashMap::with_capacity(workflow.operations.len());
        let mut infos: HashMap<String, ModuleInfo> =
            HashMap::with_capacity(workflow.operations.len());
        let mut ops_by_id: HashMap<&str, &Operation> =
            HashMap::with_capacity(workflow.operations.len());

        for op in &workflow.operations {
            if ops_by_id.insert(op.id.as_str(), op).is_some() {
                result.operation = Some(op.id.clone());
                result.error = Some(EngineError::DuplicateOperation(op.id.clone()));
                return result;
            }
            match registry::new_module(op) {
                Ok(module) => {
                    infos.insert(op.id.clone(), module.info());
                    modules.insert(op.id.clone(), module);
                }
                Err(err) => {
                    result.operation = Some(op.id.clone());
                    result.error = Some(err);
                    return result;
                }
            }
        }

        // Topologically sort operations based on their dependencies.
        let sorted = match topo_sort(&workflow.operations) {
            Ok(sorted) => sorted,
            Err(err) => {
                result.error = Some(err);
                return result;
            }
        };

        result.phase = Phase::Validate;

        // Input/output compatibility, in sorted order.
        for id in &sorted {
            let (op, info) = match (ops_by_id.get(id.as_str()), infos.get(id)) {
                (Some(op), Some(info)) => (*op, info),
                _ => {
                    result.operation = Some(id.clone());
                    result.error = Some(EngineError::MissingModule(id.clone()));
                    return result;
                }
            };
            if let Err(err) = check_inputs_outputs(op, info, &infos) {
                result.operation = Some(op.id.clone());
                result.error = Some(err);
                return result;
            }
        }

        // Each module validates its own operation.
        for op in &workflow.operations {
            let module = match modules.get(&op.id) {
                Some(module) => module,
                None => {
                    result.operation = Some(op.id.clone());
                    result.error = Some(EngineError::MissingModule(op.id.clone()));
                    return result;
                }
            };
            if let Err(err) = module.validate(op) {
                result.operation = Some(op.id.clone());
                result.error = Some(EngineError::Validation {
                    operation: op.id.clone(),
                    source: anyhow::Error::new(err),
                });
                return result;
            }
        }

        result.phase = Phase::Execute;

        for id in &sorted {
            let op = match ops_by_id.get(id.as_str()) {
                Some(op) => *op,
                None => {
                    result.operation = Some(id.clone());
                    result.error = Some(EngineError::MissingModule(id.clone()));
                    return result;
                }
            };
            result.operation = Some(op.id.clone());

            if options.cancel.is_cancelled() {
                result.error = Some(EngineError::Cancelled);
                return result;
            }

            let info = match infos.get(id) {
                Some(info) => info,
                None => {
                    result.error = Some(EngineError::MissingModule(id.clone()));
                    return result;
                }
            };
            let mut mctx =
                ModuleContext::new(op, info, options.cancel.clone(), options.deadline);

            // Resolve dependency-sourced inputs from the outputs stored by
            // previously executed operations.
            for (key, input) in &op.inputs {
                if input.is_static() {
                    continue;
                }
                let dep_ctx = match self.contexts.get(input.dependency_id()) {
                    Some(ctx) => ctx,
                    None => {
                        result.error = Some(EngineError::MissingDependencyContext(
                            input.dependency_id().to_string(),
                        ));
                        return result;
                    }
                };
                match dep_ctx.get_output(input.output_key()) {
                    Ok(value) => mctx.set_input(key.clone(), value),
                    Err(err) => {
                        result.error = Some(err);
                        return result;
                    }
                }
            }

            let module = match modules.get_mut(id) {
                Some(module) => module,
                None => {
                    result.error = Some(EngineError::MissingModule(id.clone()));
                    return result;
                }
            };

            let executed = op.execute(module, &mctx).await;
            // Retain the context either way; its outputs may help debugging
            // a failed run.
            self.contexts.insert(id.clone(), mctx);
            if let Err(err) = executed {
                result.error = Some(err);
                return result;
            }
            result.completed_operations += 1;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ContextFlag, InputSpec, ModuleInfo, OutputSpec};
    use crate::testing::{self, StubModule};
    use crate::value::{Input, Value, ValueType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Once;

    /// A module that ignores the tainted flag entirely; used to show the
    /// engine itself forces reconciliation for tainted operations.
    #[derive(Default)]
    struct ObliviousModule;

    static OBLIVIOUS_SET_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[async_trait]
    impl Module for ObliviousModule {
        fn info(&self) -> ModuleInfo {
            ModuleInfo {
                id: "oblivious_module",
                name: "Oblivious",
                description: "Always reports the desired state holds.",
                ..ModuleInfo::default()
            }
        }

        fn validate(&self, _op: &Operation) -> crate::error::Result<()> {
            Ok(())
        }

        async fn check(&mut self, _ctx: &ModuleContext) -> crate::error::Result<bool> {
            Ok(true)
        }

        async fn set(&mut self, _ctx: &ModuleContext) -> crate::error::Result<()> {
            OBLIVIOUS_SET_CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn register_test_modules() {
        static ONCE: Once = Once::new();
        ONCE.call_once(|| {
            testing::register_stub_module();
            registry::register_module("oblivious_module", || Box::new(ObliviousModule));
        });
    }

    fn stub_op(id: &str, inputs: &[(&str, Input)]) -> Operation {
        Operation {
            module: "stub_module".to_string(),
            id: id.to_string(),
            inputs: inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            ..Operation::default()
        }
    }

    fn workflow(operations: Vec<Operation>) -> Workflow {
        Workflow {
            name: "test".to_string(),
            operations,
            ..Workflow::default()
        }
    }

    async fn run_with_contexts(wf: &mut Workflow) -> (RunResult, WorkflowExecution) {
        let mut execution = WorkflowExecution::new();
        let result = execution.execute(wf, RunOptions::default()).await;
        (result, execution)
    }

    #[tokio::test]
    async fn test_check_true_short_circuits() {
        register_test_modules();
        let mut wf = workflow(vec![stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(true)),
                ("set_result", Input::from_value(false)),
            ],
        )]);

        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(result.is_success(), "unexpected error: {:?}", result.error);
        assert_eq!(result.completed_operations, 1);

        // The output promised by check is present. Had set also run it would
        // have tripped the write-once rule, so success additionally proves
        // set was never invoked.
        let outputs = execution.contexts["op-1"].outputs();
        assert!(matches!(outputs.get("set_result"), Some(Value::Bool(false))));
    }

    #[tokio::test]
    async fn test_check_false_triggers_set() {
        register_test_modules();
        let mut wf = workflow(vec![stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(false)),
                ("set_result", Input::from_value(true)),
            ],
        )]);

        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(result.is_success(), "unexpected error: {:?}", result.error);

        let outputs = execution.contexts["op-1"].outputs();
        assert!(matches!(outputs.get("set_result"), Some(Value::Bool(true))));
    }

    #[tokio::test]
    async fn test_check_error_demoted_to_set() {
        register_test_modules();
        let mut wf = workflow(vec![stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(true)),
                ("check_error", Input::from_value(true)),
                ("set_result", Input::from_value(true)),
            ],
        )]);

        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(result.is_success(), "unexpected error: {:?}", result.error);

        // The check error was demoted and set reconciled.
        let outputs = execution.contexts["op-1"].outputs();
        assert!(matches!(outputs.get("set_result"), Some(Value::Bool(true))));
    }

    #[tokio::test]
    async fn test_set_error_is_fatal() {
        register_test_modules();
        let mut wf = workflow(vec![
            stub_op(
                "op-1",
                &[
                    ("check_result", Input::from_value(false)),
                    ("set_result", Input::from_value(true)),
                    ("set_error", Input::from_value(true)),
                ],
            ),
            {
                let mut op = stub_op(
                    "op-2",
                    &[
                        ("check_result", Input::from_value(true)),
                        ("set_result", Input::from_value(true)),
                    ],
                );
                op.depends_on = vec!["op-1".to_string()];
                op
            },
        ]);

        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(!result.is_success());
        assert_eq!(result.phase, Phase::Execute);
        assert_eq!(result.operation.as_deref(), Some("op-1"));
        assert_eq!(result.completed_operations, 0);
        assert_eq!(result.total_operations, 2);
        // Dependents of the failed operation never ran.
        assert!(!execution.contexts.contains_key("op-2"));
    }

    #[tokio::test]
    async fn test_dependency_wiring() {
        register_test_modules();
        let producer = stub_op(
            "producer",
            &[
                ("check_result", Input::from_value(false)),
                ("set_result", Input::from_value(true)),
                ("value", Input::from_value("foo")),
            ],
        );
        let consumer = stub_op(
            "consumer",
            &[
                ("check_result", Input::from_value(false)),
                ("set_result", Input::from_value(true)),
                ("value", Input::from_dependency("producer", "result")),
            ],
        );
        // Before execution the consumer's input is a dependency reference.
        assert!(!consumer.inputs["value"].is_static());

        let mut wf = workflow(vec![producer, consumer]);
        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(result.is_success(), "unexpected error: {:?}", result.error);

        // Inside the consumer the value resolved to a plain static string
        // equal to what the producer published.
        let resolved = execution.contexts["consumer"].input("value").unwrap();
        assert!(resolved.is_static());
        assert_eq!(resolved.as_str(), "foo");
        assert_eq!(resolved.dependency_id(), "");

        let outputs = execution.contexts["consumer"].outputs();
        assert!(matches!(outputs.get("result"), Some(Value::String(s)) if s == "foo"));
    }

    #[tokio::test]
    async fn test_static_type_mismatch_fails_validation() {
        register_test_modules();
        let mut wf = workflow(vec![stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value("yes")),
                ("set_result", Input::from_value(true)),
            ],
        )]);

        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(!result.is_success());
        assert_eq!(result.phase, Phase::Validate);
        assert_eq!(result.operation.as_deref(), Some("op-1"));
        assert!(matches!(
            result.error,
            Some(EngineError::InputTypeMismatch { ref input, .. }) if input == "check_result"
        ));
        // Nothing executed.
        assert!(execution.contexts.is_empty());
    }

    #[tokio::test]
    async fn test_missing_required_input_fails_validation() {
        register_test_modules();
        let mut wf = workflow(vec![stub_op(
            "op-1",
            &[("check_result", Input::from_value(true))],
        )]);

        let (result, _) = run_with_contexts(&mut wf).await;
        assert_eq!(result.phase, Phase::Validate);
        assert!(matches!(
            result.error,
            Some(EngineError::MissingInput { ref input, .. }) if input == "set_result"
        ));
    }

    #[tokio::test]
    async fn test_unknown_module_fails_setup() {
        register_test_modules();
        let mut wf = workflow(vec![Operation {
            module: "no_such_module".to_string(),
            id: "op-1".to_string(),
            ..Operation::default()
        }]);

        let (result, _) = run_with_contexts(&mut wf).await;
        assert_eq!(result.phase, Phase::Setup);
        assert!(matches!(result.error, Some(EngineError::UnknownModule(_))));
    }

    #[tokio::test]
    async fn test_duplicate_operation_id() {
        register_test_modules();
        let op = stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(true)),
                ("set_result", Input::from_value(true)),
            ],
        );
        let mut wf = workflow(vec![op.clone(), op]);

        let (result, _) = run_with_contexts(&mut wf).await;
        assert_eq!(result.phase, Phase::Setup);
        assert!(matches!(
            result.error,
            Some(EngineError::DuplicateOperation(ref id)) if id == "op-1"
        ));
    }

    #[tokio::test]
    async fn test_cycle_fails_setup() {
        register_test_modules();
        let mut op = stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(true)),
                ("set_result", Input::from_value(true)),
            ],
        );
        op.depends_on = vec!["op-1".to_string()];
        let mut wf = workflow(vec![op]);

        let (result, _) = run_with_contexts(&mut wf).await;
        assert_eq!(result.phase, Phase::Setup);
        assert!(matches!(result.error, Some(EngineError::OperationCycle(_))));
    }

    #[tokio::test]
    async fn test_tainted_forces_set_even_when_module_ignores_flag() {
        register_test_modules();
        let before = OBLIVIOUS_SET_CALLS.load(Ordering::SeqCst);
        let mut wf = workflow(vec![Operation {
            module: "oblivious_module".to_string(),
            id: "op-1".to_string(),
            tainted: true,
            ..Operation::default()
        }]);

        let (result, _) = run_with_contexts(&mut wf).await;
        assert!(result.is_success(), "unexpected error: {:?}", result.error);
        assert_eq!(OBLIVIOUS_SET_CALLS.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_execution() {
        register_test_modules();
        let mut wf = workflow(vec![stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(true)),
                ("set_result", Input::from_value(true)),
            ],
        )]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wf
            .run(RunOptions {
                cancel,
                deadline: None,
            })
            .await;

        assert_eq!(result.phase, Phase::Execute);
        assert!(matches!(result.error, Some(EngineError::Cancelled)));
        assert_eq!(result.completed_operations, 0);
    }

    #[tokio::test]
    async fn test_module_validate_rejection_is_fatal() {
        register_test_modules();

        /// Rejects any operation whose id starts with "bad".
        #[derive(Default)]
        struct PickyModule;

        #[async_trait]
        impl Module for PickyModule {
            fn info(&self) -> ModuleInfo {
                ModuleInfo {
                    id: "picky_module",
                    ..ModuleInfo::default()
                }
            }

            fn validate(&self, op: &Operation) -> crate::error::Result<()> {
                if op.id.starts_with("bad") {
                    return Err(anyhow::anyhow!("rejected operation id").into());
                }
                Ok(())
            }

            async fn check(&mut self, _ctx: &ModuleContext) -> crate::error::Result<bool> {
                Ok(true)
            }

            async fn set(&mut self, _ctx: &ModuleContext) -> crate::error::Result<()> {
                Ok(())
            }
        }

        static ONCE: Once = Once::new();
        ONCE.call_once(|| registry::register_module("picky_module", || Box::new(PickyModule)));

        let mut wf = workflow(vec![Operation {
            module: "picky_module".to_string(),
            id: "bad-op".to_string(),
            ..Operation::default()
        }]);

        let (result, _) = run_with_contexts(&mut wf).await;
        assert_eq!(result.phase, Phase::Validate);
        assert!(matches!(
            result.error,
            Some(EngineError::Validation { ref operation, .. }) if operation == "bad-op"
        ));
    }

    #[tokio::test]
    async fn test_defaults_visible_through_context() {
        register_test_modules();
        // check_error defaults to false; the stub reads it without error.
        let mut wf = workflow(vec![stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(true)),
                ("set_result", Input::from_value(true)),
            ],
        )]);

        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(result.is_success(), "unexpected error: {:?}", result.error);

        let check_error = execution.contexts["op-1"].input("check_error").unwrap();
        assert!(!check_error.as_bool());
        assert!(matches!(check_error.auto(), Ok(Value::Bool(false))));
    }

    #[tokio::test]
    async fn test_does_not_exist_flag_reaches_context() {
        register_test_modules();
        let mut op = stub_op(
            "op-1",
            &[
                ("check_result", Input::from_value(true)),
                ("set_result", Input::from_value(true)),
            ],
        );
        op.does_not_exist = true;
        let mut wf = workflow(vec![op]);

        let (result, execution) = run_with_contexts(&mut wf).await;
        assert!(result.is_success());
        assert!(execution.contexts["op-1"].does_not_exist());
    }

    #[test]
    fn test_context_from_inputs_flags() {
        let ctx = testing::context_from_inputs(
            HashMap::from([("k".to_string(), Input::from_value("v"))]),
            &[ContextFlag::Tainted, ContextFlag::DoesNotExist],
        );
        assert!(ctx.tainted());
        assert!(ctx.does_not_exist());
        assert_eq!(ctx.input("k").unwrap().as_str(), "v");
    }

    #[test]
    fn test_stub_module_metadata() {
        let info = StubModule::default().info();
        assert_eq!(info.id, "stub_module");
        assert!(info.inputs.contains_key("check_result"));
        assert!(info.outputs.contains_key("result"));
        assert!(matches!(
            info.inputs["check_result"],
            InputSpec {
                value_type: ValueType::Bool,
                required: true,
                ..
            }
        ));
        assert!(matches!(
            info.outputs["result"],
            OutputSpec {
                value_type: ValueType::String,
                ..
            }
        ));
    }
}
