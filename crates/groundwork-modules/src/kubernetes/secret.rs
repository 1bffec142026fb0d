//! Kubernetes Secret module

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use groundwork_engine::{
    InputSpec, Module, ModuleContext, ModuleInfo, Operation, OutputSpec, Result, Value, ValueType,
};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Error as KubeError};
use serde_json::json;
use tracing::debug;

use super::{
    client_from, entry_target, validate_required, EntryTarget, CLIENT_TOKEN, INPUT_CLIENT,
    INPUT_KEY, INPUT_NAME, INPUT_NAMESPACE, INPUT_VALUE, OUTPUT_VALUE,
};

pub fn new_module() -> Box<dyn Module> {
    Box::new(SecretModule)
}

struct SecretModule;

#[async_trait]
impl Module for SecretModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "k8s_secret",
            name: "Kubernetes Secret",
            description: "Module to manage a single entry in a Kubernetes Secret.",
            inputs: HashMap::from([
                (
                    INPUT_CLIENT,
                    InputSpec {
                        description: "Cluster client, from a k8s_client operation.",
                        value_type: ValueType::Opaque(CLIENT_TOKEN),
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_NAMESPACE,
                    InputSpec {
                        description: "Namespace of the Secret.",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from("default")),
                    },
                ),
                (
                    INPUT_NAME,
                    InputSpec {
                        description: "Name of the Secret.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_KEY,
                    InputSpec {
                        description: "Data key to manage within the Secret.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_VALUE,
                    InputSpec {
                        description: "Desired plaintext value of the entry. The server stores it base64-encoded.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
            ]),
            outputs: HashMap::from([(
                OUTPUT_VALUE,
                OutputSpec {
                    description: "Plaintext value of the managed entry after reconciliation; empty when the entry is absent.",
                    value_type: ValueType::String,
                },
            )]),
            examples: HashMap::from([(
                "Store an API token",
                "id: api-token\nmodule: k8s_secret\ninputs:\n  client:\n    fromDependency:\n      id: default-k8s-client\n      output: client\n  namespace: apps\n  name: app-secrets\n  key: api-token\n  value:\n    fromDependency:\n      id: issue-token\n      output: token",
            )]),
        }
    }

    fn validate(&self, op: &Operation) -> Result<()> {
        validate_required(op)
    }

    async fn check(&mut self, ctx: &ModuleContext) -> Result<bool> {
        let target = entry_target(ctx)?;
        let client = client_from(ctx)?;
        let live = live_value(client.client(), &target).await?;

        if ctx.tainted() {
            return Ok(false);
        }

        if ctx.does_not_exist() {
            if live.is_none() {
                ctx.output(OUTPUT_VALUE, "")?;
                return Ok(true);
            }
            return Ok(false);
        }

        match live {
            Some(value) if value == target.value => {
                ctx.output(OUTPUT_VALUE, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set(&mut self, ctx: &ModuleContext) -> Result<()> {
        let target = entry_target(ctx)?;
        let client = client_from(ctx)?;
        let api: Api<Secret> = Api::namespaced(client.client().clone(), &target.namespace);

        if ctx.does_not_exist() {
            remove_entry(&api, &target).await?;
            ctx.output(OUTPUT_VALUE, "")?;
            return Ok(());
        }

        match api.get(&target.name).await {
            Ok(_) => {
                debug!(name = %target.name, key = %target.key, "patching Secret entry");
                // Writes go through stringData so the server handles the
                // base64 encoding.
                let patch = json!({"stringData": {&target.key: &target.value}});
                api.patch(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(|err| anyhow::anyhow!("failed to update Secret: {}", err))?;
            }
            Err(KubeError::Api(ae)) if ae.code == 404 => {
                debug!(name = %target.name, "creating Secret");
                let secret = Secret {
                    metadata: kube::api::ObjectMeta {
                        name: Some(target.name.clone()),
                        namespace: Some(target.namespace.clone()),
                        ..Default::default()
                    },
                    string_data: Some(BTreeMap::from([(
                        target.key.clone(),
                        target.value.clone(),
                    )])),
                    ..Default::default()
                };
                api.create(&PostParams::default(), &secret)
                    .await
                    .map_err(|err| anyhow::anyhow!("failed to create Secret: {}", err))?;
            }
            Err(err) => {
                return Err(anyhow::anyhow!("failed to read Secret: {}", err).into());
            }
        }

        ctx.output(OUTPUT_VALUE, target.value)?;
        Ok(())
    }
}

/// Current plaintext value of the managed entry, `None` when the Secret or
/// the key does not exist.
async fn live_value(client: &Client, target: &EntryTarget) -> Result<Option<String>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), &target.namespace);
    match api.get(&target.name).await {
        Ok(secret) => Ok(secret
            .data
            .and_then(|data| data.get(&target.key).cloned())
            .map(|bytes| String::from_utf8_lossy(&bytes.0).to_string())),
        Err(KubeError::Api(ae)) if ae.code == 404 => Ok(None),
        Err(err) => Err(anyhow::anyhow!("failed to read Secret: {}", err).into()),
    }
}

async fn remove_entry(api: &Api<Secret>, target: &EntryTarget) -> Result<()> {
    match api.get(&target.name).await {
        Ok(_) => {
            debug!(name = %target.name, key = %target.key, "removing Secret entry");
            let patch = json!({"data": {&target.key: null}});
            api.patch(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(|err| anyhow::anyhow!("failed to update Secret: {}", err))?;
            Ok(())
        }
        Err(KubeError::Api(ae)) if ae.code == 404 => Ok(()),
        Err(err) => Err(anyhow::anyhow!("failed to read Secret: {}", err).into()),
    }
}
