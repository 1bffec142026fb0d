//! Kubernetes ConfigMap module

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use groundwork_engine::{
    InputSpec, Module, ModuleContext, ModuleInfo, Operation, OutputSpec, Result, Value, ValueType,
};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Error as KubeError};
use serde_json::json;
use tracing::debug;

use super::{
    client_from, entry_target, validate_required, EntryTarget, CLIENT_TOKEN, INPUT_CLIENT,
    INPUT_KEY, INPUT_NAME, INPUT_NAMESPACE, INPUT_VALUE, OUTPUT_VALUE,
};

pub fn new_module() -> Box<dyn Module> {
    Box::new(ConfigMapModule)
}

struct ConfigMapModule;

#[async_trait]
impl Module for ConfigMapModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "k8s_configmap",
            name: "Kubernetes ConfigMap",
            description: "Module to manage a single entry in a Kubernetes ConfigMap.",
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
                        description: "Namespace of the ConfigMap.",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from("default")),
                    },
                ),
                (
                    INPUT_NAME,
                    InputSpec {
                        description: "Name of the ConfigMap.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_KEY,
                    InputSpec {
                        description: "Data key to manage within the ConfigMap.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_VALUE,
                    InputSpec {
                        description: "Desired value of the entry.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
            ]),
            outputs: HashMap::from([(
                OUTPUT_VALUE,
                OutputSpec {
                    description: "Value of the managed entry after reconciliation; empty when the entry is absent.",
                    value_type: ValueType::String,
                },
            )]),
            examples: HashMap::from([(
                "Set a feature flag",
                "id: feature-flag\nmodule: k8s_configmap\ninputs:\n  client:\n    fromDependency:\n      id: default-k8s-client\n      output: client\n  namespace: apps\n  name: app-config\n  key: feature\n  value: \"on\"",
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
        let api: Api<ConfigMap> = Api::namespaced(client.client().clone(), &target.namespace);

        if ctx.does_not_exist() {
            remove_entry(&api, &target).await?;
            ctx.output(OUTPUT_VALUE, "")?;
            return Ok(());
        }

        match api.get(&target.name).await {
            Ok(_) => {
                debug!(name = %target.name, key = %target.key, "patching ConfigMap entry");
                let patch = json!({"data": {&target.key: &target.value}});
                api.patch(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
                    .map_err(|err| anyhow::anyhow!("failed to update ConfigMap: {}", err))?;
            }
            Err(KubeError::Api(ae)) if ae.code == 404 => {
                debug!(name = %target.name, "creating ConfigMap");
                let cm = ConfigMap {
                    metadata: kube::api::ObjectMeta {
                        name: Some(target.name.clone()),
                        namespace: Some(target.namespace.clone()),
                        ..Default::default()
                    },
                    data: Some(BTreeMap::from([(
                        target.key.clone(),
                        target.value.clone(),
                    )])),
                    ..Default::default()
                };
                api.create(&PostParams::default(), &cm)
                    .await
                    .map_err(|err| anyhow::anyhow!("failed to create ConfigMap: {}", err))?;
            }
            Err(err) => {
                return Err(anyhow::anyhow!("failed to read ConfigMap: {}", err).into());
            }
        }

        ctx.output(OUTPUT_VALUE, target.value)?;
        Ok(())
    }
}

/// Current value of the managed entry, `None` when the ConfigMap or the key
/// does not exist.
async fn live_value(client: &Client, target: &EntryTarget) -> Result<Option<String>> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &target.namespace);
    match api.get(&target.name).await {
        Ok(cm) => Ok(cm.data.and_then(|data| data.get(&target.key).cloned())),
        Err(KubeError::Api(ae)) if ae.code == 404 => Ok(None),
        Err(err) => Err(anyhow::anyhow!("failed to read ConfigMap: {}", err).into()),
    }
}

async fn remove_entry(api: &Api<ConfigMap>, target: &EntryTarget) -> Result<()> {
    match api.get(&target.name).await {
        Ok(_) => {
            debug!(name = %target.name, key = %target.key, "removing ConfigMap entry");
            // A null in a JSON merge patch removes the key.
            let patch = json!({"data": {&target.key: null}});
            api.patch(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(|err| anyhow::anyhow!("failed to update ConfigMap: {}", err))?;
            Ok(())
        }
        Err(KubeError::Api(ae)) if ae.code == 404 => Ok(()),
        Err(err) => Err(anyhow::anyhow!("failed to read ConfigMap: {}", err).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundwork_engine::Input;

    #[test]
    fn test_info_metadata() {
        let info = ConfigMapModule.info();
        assert_eq!(info.id, "k8s_configmap");
        assert!(info.inputs[INPUT_NAME].required);
        assert_eq!(
            info.inputs[INPUT_CLIENT].value_type,
            ValueType::Opaque(CLIENT_TOKEN)
        );
        assert!(matches!(
            info.inputs[INPUT_NAMESPACE].default,
            Some(Value::String(ref s)) if s == "default"
        ));
        assert_eq!(info.outputs[OUTPUT_VALUE].value_type, ValueType::String);
    }

    #[test]
    fn test_validate() {
        let module = ConfigMapModule;
        let op = Operation {
            module: "k8s_configmap".to_string(),
            id: "cm".to_string(),
            inputs: HashMap::from([
                (
                    INPUT_CLIENT.to_string(),
                    Input::from_dependency("cluster", "client"),
                ),
                (INPUT_NAME.to_string(), Input::from_value("app-config")),
                (INPUT_KEY.to_string(), Input::from_value("feature")),
                (INPUT_VALUE.to_string(), Input::from_value("on")),
            ]),
            ..Operation::default()
        };
        assert!(module.validate(&op).is_ok());

        let missing_client = Operation {
            module: "k8s_configmap".to_string(),
            id: "cm".to_string(),
            inputs: HashMap::from([
                (INPUT_NAME.to_string(), Input::from_value("app-config")),
                (INPUT_KEY.to_string(), Input::from_value("feature")),
                (INPUT_VALUE.to_string(), Input::from_value("on")),
            ]),
            ..Operation::default()
        };
        assert!(module.validate(&missing_client).is_err());

        let empty_key = Operation {
            module: "k8s_configmap".to_string(),
            id: "cm".to_string(),
            inputs: HashMap::from([
                (
                    INPUT_CLIENT.to_string(),
                    Input::from_dependency("cluster", "client"),
                ),
                (INPUT_NAME.to_string(), Input::from_value("app-config")),
                (INPUT_KEY.to_string(), Input::from_value("")),
                (INPUT_VALUE.to_string(), Input::from_value("on")),
            ]),
            ..Operation::default()
        };
        assert!(module.validate(&empty_key).is_err());
    }
}
