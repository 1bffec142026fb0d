//! Operations
//!
//! An operation is one unit of work within a workflow, bound to a module. In
//! an imperative system operations would be steps; here their order is
//! determined at runtime from the dependencies between them.

use tracing::{debug, info, warn};

use crate::context::ModuleContext;
use crate::error::Result;
use crate::module::Module;
use crate::value::Input;

/// A single operation in a workflow.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    /// Identifier of the module that configures the resource.
    pub module: String,

    /// Unique identifier for the operation, referenced by other operations.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Longer description of what the operation does.
    pub description: String,

    /// Ids of operations that must complete before this one runs. Implicit
    /// dependencies from `fromDependency` inputs are appended during setup.
    pub depends_on: Vec<String>,

    /// Module inputs, keyed by input name.
    pub inputs: std::collections::HashMap<String, Input>,

    /// When true, the operation ensures the resource does not exist. Useful
    /// for resources removed from a previous desired state.
    pub does_not_exist: bool,

    /// When true, the resource is reconciled even if its state appears
    /// correct. Reserved for use by modules, not workflow authors.
    pub tainted: bool,
}

impl Operation {
    /// Pre-execution pass that captures implicit dependencies.
    ///
    /// Walks the inputs and appends the dependency id of every
    /// dependency-sourced input that is not already listed in `depends_on`.
    /// Idempotent and order-insensitive. Must run on every operation before
    /// the dependency graph is built.
    pub(crate) fn setup(&mut self) -> Result<()> {
        for input in self.inputs.values() {
            if input.is_static() {
                continue;
            }
            let dep = input.dependency_id();
            if !self.depends_on.iter().any(|d| d == dep) {
                self.depends_on.push(dep.to_string());
            }
        }
        Ok(())
    }

    /// Run the check-then-set cycle for this operation.
    ///
    /// A check error is demoted to "state does not hold": it is logged and
    /// `set` runs next. A tainted operation proceeds to `set` regardless of
    /// what the module's check reported.
    pub(crate) async fn execute(
        &self,
        module: &mut Box<dyn Module>,
        mctx: &ModuleContext,
    ) -> Result<()> {
        info!(module = %self.module, id = %self.id, "operation check");
        let mut passed = match module.check(mctx).await {
            Ok(passed) => passed,
            Err(err) => {
                debug!(
                    module = %self.module,
                    id = %self.id,
                    error = %err,
                    "failed to check module"
                );
                false
            }
        };

        if passed && self.tainted {
            debug!(module = %self.module, id = %self.id, "operation tainted, forcing set");
            passed = false;
        }

        if passed {
            info!(module = %self.module, id = %self.id, "operation check passed");
            return Ok(());
        }

        info!(module = %self.module, id = %self.id, "operation set");
        if let Err(err) = module.set(mctx).await {
            warn!(module = %self.module, id = %self.id, error = %err, "operation set failed");
            return Err(err);
        }
        info!(module = %self.module, id = %self.id, "operation set passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_setup_adds_implicit_dependencies() {
        let mut op = Operation {
            id: "consumer".to_string(),
            inputs: HashMap::from([
                ("value".to_string(), Input::from_dependency("producer", "result")),
                ("static".to_string(), Input::from_value("x")),
            ]),
            ..Operation::default()
        };

        op.setup().unwrap();
        assert_eq!(op.depends_on, vec!["producer".to_string()]);

        // Every dependency-sourced input now appears in depends_on.
        for input in op.inputs.values() {
            if !input.is_static() {
                assert!(op.depends_on.iter().any(|d| d == input.dependency_id()));
            }
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let mut op = Operation {
            id: "consumer".to_string(),
            depends_on: vec!["producer".to_string()],
            inputs: HashMap::from([(
                "value".to_string(),
                Input::from_dependency("producer", "result"),
            )]),
            ..Operation::default()
        };

        op.setup().unwrap();
        op.setup().unwrap();
        assert_eq!(op.depends_on, vec!["producer".to_string()]);
    }
}
