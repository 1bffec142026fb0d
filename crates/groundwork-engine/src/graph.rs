//! Dependency graph and topological ordering

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, Result};
use crate::operation::Operation;

/// Directed graph of operations and their dependencies.
struct DependencyGraph {
    deps: HashMap<String, Vec<String>>,
    ops: Vec<String>,
    known: HashSet<String>,
}

impl DependencyGraph {
    fn from_operations(ops: &[Operation]) -> Self {
        let mut graph = DependencyGraph {
            deps: HashMap::new(),
            ops: Vec::with_capacity(ops.len()),
            known: HashSet::new(),
        };
        for op in ops {
            graph.ops.push(op.id.clone());
            graph.known.insert(op.id.clone());
            for dep in &op.depends_on {
                graph
                    .deps
                    .entry(op.id.clone())
                    .or_default()
                    .push(dep.clone());
            }
        }
        graph
    }

    /// Depth-first post-order traversal emitting dependencies before
    /// dependents. Re-entering a node that is still on the recursion stack
    /// means a cycle.
    fn visit(
        &self,
        op_id: &str,
        visited: &mut HashSet<String>,
        stack: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        visited.insert(op_id.to_string());
        stack.insert(op_id.to_string());

        if let Some(deps) = self.deps.get(op_id) {
            for dep in deps {
                if stack.contains(dep) {
                    return Err(EngineError::OperationCycle(dep.clone()));
                }
                if !self.known.contains(dep) {
                    return Err(EngineError::DanglingDependency {
                        operation: op_id.to_string(),
                        dependency: dep.clone(),
                    });
                }
                if !visited.contains(dep) {
                    self.visit(dep, visited, stack, order)?;
                }
            }
        }

        stack.remove(op_id);
        order.push(op_id.to_string());
        Ok(())
    }

    fn sort(&self) -> Result<Vec<String>> {
        let mut order = Vec::with_capacity(self.ops.len());
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();

        for op_id in &self.ops {
            if !visited.contains(op_id) {
                self.visit(op_id, &mut visited, &mut stack, &mut order)?;
            }
        }
        Ok(order)
    }
}

/// Topologically sort operations into a linear execution plan.
///
/// Operations are visited in declaration order and dependency edges in
/// listed order, so the result is deterministic for a given workflow
/// document. Fails with a cycle error naming an offending operation, or a
/// dangling-dependency error when an id references no operation.
pub(crate) fn topo_sort(ops: &[Operation]) -> Result<Vec<String>> {
    DependencyGraph::from_operations(ops).sort()
}
