//! `groundwork run` executes workflows once
//!
//! With a workflow file, the document is loaded, converted, and run locally.
//! Without one, Workflow resources are listed from the configured cluster
//! namespaces, run concurrently, and their status subresources updated with
//! the run results.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject};
use kube::Client;
use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use groundwork_api as api;
use groundwork_engine::{RunOptions, RunResult, Workflow};

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to a workflow file; when set, the cluster is not consulted
    #[arg(short = 'f', long, env = "GROUNDWORK_WORKFLOW_FILE")]
    workflow_file: Option<PathBuf>,

    /// Comma-separated namespaces to read Workflow resources from; empty
    /// means the client's default namespace
    #[arg(short = 'n', long, env = "GROUNDWORK_NAMESPACES", default_value = "")]
    namespaces: String,
}

pub async fn run(args: RunArgs, cancel: CancellationToken) -> Result<()> {
    match &args.workflow_file {
        Some(path) => run_workflow_from_file(path, cancel).await,
        None => run_workflows_in_cluster(&args.namespaces, cancel).await,
    }
}

/// Load a workflow from a file and run it.
async fn run_workflow_from_file(path: &PathBuf, cancel: CancellationToken) -> Result<()> {
    info!(file = %path.display(), "loading workflow file");
    let document = std::fs::read_to_string(path)
        .map_err(|err| eyre!("error reading workflow file: {}", err))?;
    let file = api::WorkflowFile::from_yaml(&document)
        .map_err(|err| eyre!("error loading workflow: {}", err))?;
    let mut workflow = api::workflow_from_file(&file)?;

    let result = workflow
        .run(RunOptions {
            cancel,
            deadline: None,
        })
        .await;

    match &result.error {
        None => {
            info!(workflow = %workflow.name, "workflow execution complete");
            Ok(())
        }
        Some(err) => Err(eyre!(
            "workflow {} did not complete in phase {}: {}",
            workflow.name,
            result.phase,
            err
        )),
    }
}

/// Load Workflow resources from the cluster and run them concurrently, one
/// task per workflow. Workflows share no mutable state; each owns its
/// contexts and outputs.
async fn run_workflows_in_cluster(namespaces: &str, cancel: CancellationToken) -> Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|err| eyre!("unable to create Kubernetes client: {}", err))?;

    info!("loading workflow resources from kubernetes");
    let mut workflows = Vec::new();
    for namespace in namespaces.split(',').map(str::trim) {
        let loaded = load_workflows(&client, namespace).await?;
        if loaded.is_empty() {
            if namespace.is_empty() {
                warn!("no workflows found");
            } else {
                warn!(namespace = %namespace, "no workflows found in namespace");
            }
            continue;
        }
        workflows.extend(loaded);
    }

    let mut tasks = JoinSet::new();
    for mut workflow in workflows {
        let client = client.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let name = workflow.name.clone();
            let started = chrono::Utc::now();
            let result = workflow
                .run(RunOptions {
                    cancel,
                    deadline: None,
                })
                .await;
            let failed = !result.is_success();
            if let Err(err) = update_workflow_status(&client, &workflow, &result, started).await {
                error!(workflow = %name, error = %err, "error updating workflow status");
                return Err(err);
            }
            if failed {
                return Err(eyre!("workflow {} did not complete", name));
            }
            Ok(())
        });
    }

    let mut failures = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(_)) => failures += 1,
            Err(err) => {
                error!(error = %err, "workflow task panicked");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(eyre!("{} workflow(s) did not complete", failures));
    }
    Ok(())
}

fn workflow_api_resource() -> ApiResource {
    ApiResource {
        group: api::API_GROUP.to_string(),
        version: api::VERSION.to_string(),
        kind: api::WORKFLOW_KIND.to_string(),
        api_version: api::API_VERSION.to_string(),
        plural: api::WORKFLOW_PLURAL.to_string(),
    }
}

fn workflow_api(client: &Client, namespace: &str) -> Api<DynamicObject> {
    let resource = workflow_api_resource();
    if namespace.is_empty() {
        Api::default_namespaced_with(client.clone(), &resource)
    } else {
        Api::namespaced_with(client.clone(), namespace, &resource)
    }
}

/// List Workflow resources in a namespace and convert them into engine
/// workflows. The originating resource rides along as the source handle.
async fn load_workflows(client: &Client, namespace: &str) -> Result<Vec<Workflow>> {
    let dynamic_api = workflow_api(client, namespace);
    let list = dynamic_api
        .list(&ListParams::default())
        .await
        .map_err(|err| eyre!("error listing workflows: {}", err))?;

    let mut workflows = Vec::with_capacity(list.items.len());
    for object in list.items {
        let resource = resource_from_dynamic(&object)?;
        let workflow = api::workflow_from_resource(&resource).map_err(|err| {
            eyre!(
                "error loading operations for workflow {}: {}",
                resource.metadata.name,
                err
            )
        })?;
        workflows.push(workflow);
    }
    Ok(workflows)
}

fn resource_from_dynamic(object: &DynamicObject) -> Result<api::Workflow> {
    let name = object.metadata.name.clone().unwrap_or_default();
    let spec_value = object
        .data
        .get("spec")
        .cloned()
        .ok_or_else(|| eyre!("workflow {} has no spec", name))?;
    let spec: api::WorkflowSpec = serde_json::from_value(spec_value)
        .map_err(|err| eyre!("error parsing workflow {}: {}", name, err))?;

    Ok(api::Workflow {
        type_meta: api::TypeMeta::workflow(),
        metadata: api::ObjectMeta {
            name,
            namespace: object.metadata.namespace.clone(),
            resource_version: object.metadata.resource_version.clone(),
            labels: object
                .metadata
                .labels
                .clone()
                .unwrap_or_default()
                .into_iter()
                .collect(),
        },
        spec,
        status: None,
    })
}

/// Publish the run result onto the originating resource's status
/// subresource.
async fn update_workflow_status(
    client: &Client,
    workflow: &Workflow,
    result: &RunResult,
    started: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    let source = workflow
        .source
        .as_ref()
        .ok_or_else(|| eyre!("no workflow source"))?;
    let resource = source
        .downcast_ref::<api::Workflow>()
        .ok_or_else(|| eyre!("unexpected workflow source"))?;

    let status = api::WorkflowStatus::from_run(result, started);
    if let Some(err) = &result.error {
        warn!(
            workflow = %workflow.name,
            phase = %result.phase,
            operation = result.operation.as_deref().unwrap_or(""),
            error = %err,
            "workflow execution did not complete"
        );
    } else {
        info!(workflow = %workflow.name, "workflow execution complete");
    }

    let namespace = resource.metadata.namespace.as_deref().unwrap_or("");
    let dynamic_api = workflow_api(client, namespace);
    let patch = json!({ "status": status });
    dynamic_api
        .patch_status(
            &resource.metadata.name,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|err| eyre!("error updating workflow status: {}", err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic_workflow(name: &str) -> DynamicObject {
        DynamicObject {
            metadata: kube::core::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("infra".to_string()),
                ..Default::default()
            },
            types: Some(kube::core::TypeMeta {
                api_version: api::API_VERSION.to_string(),
                kind: api::WORKFLOW_KIND.to_string(),
            }),
            data: json!({
                "spec": {
                    "operations": [
                        {"id": "mock-1", "module": "mock_module", "inputs": {"pass": true}}
                    ]
                }
            }),
        }
    }

    #[test]
    fn test_resource_from_dynamic() {
        let resource = resource_from_dynamic(&dynamic_workflow("wf-1")).unwrap();
        assert_eq!(resource.metadata.name, "wf-1");
        assert_eq!(resource.metadata.namespace.as_deref(), Some("infra"));
        assert_eq!(resource.spec.operations.len(), 1);
        assert_eq!(resource.spec.operations[0].module, "mock_module");
    }

    #[test]
    fn test_resource_from_dynamic_requires_spec() {
        let mut object = dynamic_workflow("wf-1");
        object.data = json!({});
        assert!(resource_from_dynamic(&object).is_err());
    }

    #[test]
    fn test_workflow_api_resource() {
        let resource = workflow_api_resource();
        assert_eq!(resource.group, "groundwork.dev");
        assert_eq!(resource.plural, "workflows");
        assert_eq!(resource.api_version, "groundwork.dev/v1alpha1");
    }
}
