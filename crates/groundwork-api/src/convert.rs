//! Conversion from workflow documents into the engine representation

use std::sync::Arc;

use groundwork_engine as engine;
use tracing::warn;

use crate::error::Result;
use crate::workflow::{OperationInput, OperationSpec, Workflow, WorkflowFile};

/// Convert a configuration-file document into an engine workflow.
///
/// The document itself is retained as the workflow source handle.
pub fn workflow_from_file(doc: &WorkflowFile) -> Result<engine::Workflow> {
    Ok(engine::Workflow {
        name: doc.name.clone(),
        description: doc.spec.description.clone(),
        operations: operations_from_specs(&doc.spec.operations),
        source: Some(Arc::new(doc.clone())),
    })
}

/// Convert a cluster resource into an engine workflow.
///
/// The resource is retained as the workflow source handle so the runner can
/// publish the run result back to its status subresource.
pub fn workflow_from_resource(resource: &Workflow) -> Result<engine::Workflow> {
    resource.validate()?;
    Ok(engine::Workflow {
        name: resource.metadata.name.clone(),
        description: resource.spec.description.clone(),
        operations: operations_from_specs(&resource.spec.operations),
        source: Some(Arc::new(resource.clone())),
    })
}

fn operations_from_specs(specs: &[OperationSpec]) -> Vec<engine::Operation> {
    specs.iter().map(operation_from_spec).collect()
}

fn operation_from_spec(spec: &OperationSpec) -> engine::Operation {
    let mut inputs = std::collections::HashMap::with_capacity(spec.inputs.len());
    for (key, input) in &spec.inputs {
        match input {
            OperationInput::FromDependency(dep) => {
                inputs.insert(
                    key.clone(),
                    engine::Input::from_dependency(dep.id.clone(), dep.output.clone()),
                );
            }
            OperationInput::Static(raw) => match engine::Value::from_json(raw) {
                Some(value) => {
                    inputs.insert(key.clone(), engine::Input::from_value(value));
                }
                // A null input carries no value; treat it as absent so the
                // module's default applies.
                None => {
                    warn!(operation = %spec.id, input = %key, "ignoring null input value");
                }
            },
        }
    }

    engine::Operation {
        module: spec.module.clone(),
        id: spec.id.clone(),
        name: spec.name.clone(),
        description: spec.description.clone(),
        depends_on: spec.depends_on.clone(),
        inputs,
        does_not_exist: spec.does_not_exist,
        tainted: spec.tainted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: wiring
operations:
  - id: producer
    module: stub_module
    inputs:
      check_result: false
      set_result: true
      value: foo
  - id: consumer
    module: stub_module
    dependsOn:
      - producer
    inputs:
      check_result: false
      set_result: true
      port: 5432
      ratio: 0.5
      empty: null
      value:
        fromDependency:
          id: producer
          output: result
"#;

    #[test]
    fn test_conversion_preserves_shape() {
        let doc = WorkflowFile::from_yaml(SAMPLE).unwrap();
        let wf = workflow_from_file(&doc).unwrap();

        assert_eq!(wf.name, "wiring");
        assert_eq!(wf.operations.len(), 2);
        assert!(wf.source.is_some());

        let consumer = &wf.operations[1];
        assert_eq!(consumer.module, "stub_module");
        assert_eq!(consumer.depends_on, vec!["producer".to_string()]);

        let value = &consumer.inputs["value"];
        assert!(!value.is_static());
        assert_eq!(value.dependency_id(), "producer");
        assert_eq!(value.output_key(), "result");

        let check = &consumer.inputs["check_result"];
        assert!(check.is_static());
        assert!(matches!(check.auto(), Ok(engine::Value::Bool(false))));

        assert!(matches!(
            consumer.inputs["port"].auto(),
            Ok(engine::Value::Int(5432))
        ));
        assert!(matches!(
            consumer.inputs["ratio"].auto(),
            Ok(engine::Value::Float(_))
        ));

        // Null inputs are dropped, not materialized.
        assert!(!consumer.inputs.contains_key("empty"));
    }

    #[test]
    fn test_conversion_keeps_flags() {
        let doc = WorkflowFile::from_yaml(
            "name: flags\noperations:\n  - id: gone\n    module: stub_module\n    doesNotExist: true\n",
        )
        .unwrap();
        let wf = workflow_from_file(&doc).unwrap();
        assert!(wf.operations[0].does_not_exist);
        assert!(!wf.operations[0].tainted);
    }
}
