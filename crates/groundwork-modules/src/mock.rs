//! Mock module
//!
//! Does nothing. Used to mock operations and operation results when testing
//! workflows end to end.

use std::collections::HashMap;

use async_trait::async_trait;
use groundwork_engine::{
    InputSpec, Module, ModuleContext, ModuleInfo, Operation, Result, Value, ValueType,
};

const INPUT_PASS: &str = "pass";

pub fn new_module() -> Box<dyn Module> {
    Box::new(MockModule)
}

struct MockModule;

#[async_trait]
impl Module for MockModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "mock_module",
            name: "Mock Module",
            description: "A mock module that does nothing. Used to mock operations and operation results for testing purposes.",
            inputs: HashMap::from([(
                INPUT_PASS,
                InputSpec {
                    description: "Determines if the operation should pass or fail.",
                    value_type: ValueType::Bool,
                    required: false,
                    default: Some(Value::Bool(true)),
                },
            )]),
            outputs: HashMap::new(),
            examples: HashMap::from([(
                "Simple Mock",
                "id: mock-1\nmodule: mock_module",
            )]),
        }
    }

    fn validate(&self, _op: &Operation) -> Result<()> {
        Ok(())
    }

    async fn check(&mut self, ctx: &ModuleContext) -> Result<bool> {
        if ctx.tainted() {
            return Ok(false);
        }
        Ok(ctx.input(INPUT_PASS)?.as_bool())
    }

    async fn set(&mut self, ctx: &ModuleContext) -> Result<()> {
        if ctx.input(INPUT_PASS)?.as_bool() {
            return Ok(());
        }
        Err(anyhow::anyhow!("mock module failed").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundwork_engine::testing::context_from_inputs;
    use groundwork_engine::{ContextFlag, Input};

    #[tokio::test]
    async fn test_mock_passes() {
        let mut module = MockModule;
        let ctx = context_from_inputs(
            HashMap::from([(INPUT_PASS.to_string(), Input::from_value(true))]),
            &[],
        );
        assert!(module.check(&ctx).await.unwrap());
        assert!(module.set(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_fails() {
        let mut module = MockModule;
        let ctx = context_from_inputs(
            HashMap::from([(INPUT_PASS.to_string(), Input::from_value(false))]),
            &[],
        );
        assert!(!module.check(&ctx).await.unwrap());
        assert!(module.set(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_tainted_check_fails() {
        let mut module = MockModule;
        let ctx = context_from_inputs(
            HashMap::from([(INPUT_PASS.to_string(), Input::from_value(true))]),
            &[ContextFlag::Tainted],
        );
        assert!(!module.check(&ctx).await.unwrap());
    }
}
