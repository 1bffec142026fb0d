//! Kubernetes modules
//!
//! Manages ConfigMap and Secret entries in a cluster. The client module
//! publishes a shared cluster client as an opaque output; the resource
//! modules consume it through a `client` input wired with `fromDependency`,
//! so one workflow authenticates once no matter how many entries it manages.

pub mod client;
pub mod configmap;
pub mod secret;

use groundwork_engine::{ModuleContext, Operation, Result};

pub(crate) const INPUT_CONTEXT: &str = "context";
pub(crate) const INPUT_CLIENT: &str = "client";
pub(crate) const INPUT_NAMESPACE: &str = "namespace";
pub(crate) const INPUT_NAME: &str = "name";
pub(crate) const INPUT_KEY: &str = "key";
pub(crate) const INPUT_VALUE: &str = "value";

pub(crate) const OUTPUT_CLIENT: &str = "client";
pub(crate) const OUTPUT_VALUE: &str = "value";

/// Opaque type token for the shared cluster client.
pub const CLIENT_TOKEN: &str = "kubernetes/client";

/// Inputs that must be present and, when static, non-empty.
pub(crate) const REQUIRED_PARAMETERS: &[&str] = &[INPUT_CLIENT, INPUT_NAME, INPUT_KEY, INPUT_VALUE];

/// Shared handle to an authenticated Kubernetes cluster client.
#[derive(Clone)]
pub struct ClusterClient {
    client: kube::Client,
}

impl ClusterClient {
    pub(crate) fn new(client: kube::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &kube::Client {
        &self.client
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

/// Resolve the `client` input into the shared handle published by a
/// k8s_client operation.
pub(crate) fn client_from(ctx: &ModuleContext) -> Result<ClusterClient> {
    let input = ctx.input(INPUT_CLIENT)?;
    let handle = input
        .as_any()
        .and_then(|value| value.downcast_ref::<ClusterClient>())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("client input is not a Kubernetes client"))?;
    Ok(handle)
}

/// The target entry a module reconciles: namespace/name plus the data key.
pub(crate) struct EntryTarget {
    pub namespace: String,
    pub name: String,
    pub key: String,
    pub value: String,
}

pub(crate) fn entry_target(ctx: &ModuleContext) -> Result<EntryTarget> {
    let target = EntryTarget {
        namespace: ctx.input(INPUT_NAMESPACE)?.as_str().to_string(),
        name: ctx.input(INPUT_NAME)?.as_str().to_string(),
        key: ctx.input(INPUT_KEY)?.as_str().to_string(),
        value: ctx.input(INPUT_VALUE)?.as_str().to_string(),
    };
    if target.name.is_empty() || target.key.is_empty() {
        return Err(anyhow::anyhow!("name and key are required").into());
    }
    Ok(target)
}

pub(crate) fn validate_required(op: &Operation) -> Result<()> {
    for parameter in REQUIRED_PARAMETERS {
        match op.inputs.get(*parameter) {
            None => {
                return Err(anyhow::anyhow!("missing required parameter: {}", parameter).into())
            }
            Some(input) => {
                if !input.is_static() {
                    continue;
                }
                if *parameter != INPUT_VALUE && input.as_str().is_empty() {
                    return Err(anyhow::anyhow!("parameter {} cannot be empty", parameter).into());
                }
            }
        }
    }
    Ok(())
}
