//! Cross-operation type compatibility checking
//!
//! Runs before any module executes, using only declared types from module
//! metadata, so the result is fully deterministic. Static values must be
//! assignable to the declared input type; dependency-sourced inputs must
//! reference a declared output of matching type on the dependency's module.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::module::ModuleInfo;
use crate::operation::Operation;

/// Verify an operation's inputs against its module metadata.
///
/// For each declared input: missing and required fails; missing and optional
/// is skipped (a default is substituted at context construction); a static
/// value must be assignable to the declared type; a dependency reference must
/// name an operation whose module declares the output with a type equal to
/// the declared input type. Declared defaults are also verified against their
/// input types.
pub(crate) fn check_inputs_outputs(
    op: &Operation,
    info: &ModuleInfo,
    ops_info: &HashMap<String, ModuleInfo>,
) -> Result<()> {
    for (name, spec) in &info.inputs {
        if let Some(default) = &spec.default {
            if !spec.value_type.assignable_from(default) {
                return Err(EngineError::DefaultTypeMismatch {
                    input: name.to_string(),
                    module: info.id.to_string(),
                    expected: spec.value_type.clone(),
                });
            }
        }

        let input = match op.inputs.get(*name) {
            Some(input) => input,
            None => {
                if spec.required {
                    return Err(EngineError::MissingInput {
                        input: name.to_string(),
                        operation: op.id.clone(),
                    });
                }
                continue;
            }
        };

        if input.is_static() {
            let assignable = match input.value() {
                Some(value) => spec.value_type.assignable_from(value),
                None => false,
            };
            if !assignable {
                return Err(EngineError::InputTypeMismatch {
                    input: name.to_string(),
                    operation: op.id.clone(),
                    expected: spec.value_type.clone(),
                });
            }
        } else {
            let dep_id = input.dependency_id();
            let dep_info = ops_info.get(dep_id).ok_or_else(|| {
                EngineError::DependencyNotFound {
                    dependency: dep_id.to_string(),
                    input: name.to_string(),
                    operation: op.id.clone(),
                }
            })?;

            let output_key = input.output_key();
            let output = dep_info.outputs.get(output_key).ok_or_else(|| {
                EngineError::DependencyOutputNotFound {
                    output: output_key.to_string(),
                    dependency: dep_id.to_string(),
                    input: name.to_string(),
                    operation: op.id.clone(),
                }
            })?;

            if output.value_type != spec.value_type {
                return Err(EngineError::DependencyTypeMismatch {
                    input: name.to_string(),
                    operation: op.id.clone(),
                    expected: spec.value_type.clone(),
                    dependency: dep_id.to_string(),
                });
            }
        }
    }
    Ok(())
}
