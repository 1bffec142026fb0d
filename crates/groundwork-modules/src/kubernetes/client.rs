//! Kubernetes client module

use std::collections::HashMap;

use async_trait::async_trait;
use groundwork_engine::{
    EngineError, InputSpec, Module, ModuleContext, ModuleInfo, OpaqueValue, Operation, OutputSpec,
    Result, ValueType,
};
use kube::config::KubeConfigOptions;
use kube::Client;
use tracing::debug;

use super::{ClusterClient, CLIENT_TOKEN, INPUT_CONTEXT, OUTPUT_CLIENT};

pub fn new_module() -> Box<dyn Module> {
    Box::new(ClientModule)
}

struct ClientModule;

#[async_trait]
impl Module for ClientModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "k8s_client",
            name: "Kubernetes Client",
            description: "Establishes a connection to a Kubernetes cluster and provides a client for other modules to use.",
            inputs: HashMap::from([(
                INPUT_CONTEXT,
                InputSpec {
                    description: "The kubeconfig context to use. If not provided, uses the current context, or the in-cluster configuration when running inside a cluster.",
                    value_type: ValueType::String,
                    required: false,
                    default: None,
                },
            )]),
            outputs: HashMap::from([(
                OUTPUT_CLIENT,
                OutputSpec {
                    description: "Authenticated cluster client for other modules to use.",
                    value_type: ValueType::Opaque(CLIENT_TOKEN),
                },
            )]),
            examples: HashMap::from([
                ("Default client", "id: default-k8s-client\nmodule: k8s_client"),
                (
                    "Specific context",
                    "id: prod-k8s-client\nmodule: k8s_client\ninputs:\n  context: prod-cluster",
                ),
            ]),
        }
    }

    fn validate(&self, _op: &Operation) -> Result<()> {
        Ok(())
    }

    async fn check(&mut self, _ctx: &ModuleContext) -> Result<bool> {
        // A client is never "already in the desired state": every run
        // authenticates once so downstream operations receive a usable
        // handle.
        Ok(false)
    }

    async fn set(&mut self, ctx: &ModuleContext) -> Result<()> {
        let kube_context = ctx.input(INPUT_CONTEXT)?.as_str().to_string();

        let client = tokio::select! {
            built = build_client(&kube_context) => built?,
            _ = ctx.cancelled() => return Err(EngineError::Cancelled),
        };

        // Make sure the connection is working before handing it downstream.
        client
            .apiserver_version()
            .await
            .map_err(|err| anyhow::anyhow!("failed to connect to Kubernetes cluster: {}", err))?;

        ctx.output(
            OUTPUT_CLIENT,
            OpaqueValue::new(CLIENT_TOKEN, ClusterClient::new(client)),
        )?;
        Ok(())
    }
}

async fn build_client(kube_context: &str) -> Result<Client> {
    if kube_context.is_empty() {
        debug!("creating Kubernetes client from the default environment");
        return Client::try_default()
            .await
            .map_err(|err| anyhow::anyhow!("failed to create Kubernetes client: {}", err).into());
    }

    debug!(context = %kube_context, "creating Kubernetes client for context");
    let options = KubeConfigOptions {
        context: Some(kube_context.to_string()),
        ..KubeConfigOptions::default()
    };
    let config = kube::Config::from_kubeconfig(&options)
        .await
        .map_err(|err| anyhow::anyhow!("failed to get Kubernetes client config: {}", err))?;
    Client::try_from(config)
        .map_err(|err| anyhow::anyhow!("failed to create Kubernetes client: {}", err).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_metadata() {
        let info = ClientModule.info();
        assert_eq!(info.id, "k8s_client");
        assert!(!info.inputs[INPUT_CONTEXT].required);
        assert_eq!(
            info.outputs[OUTPUT_CLIENT].value_type,
            ValueType::Opaque(CLIENT_TOKEN)
        );
    }

    #[tokio::test]
    async fn test_check_reports_unreconciled() {
        let mut module = ClientModule;
        let ctx = groundwork_engine::testing::context_from_inputs(HashMap::new(), &[]);
        assert!(!module.check(&ctx).await.unwrap());
    }
}
