//! PostgreSQL role module

use std::collections::HashMap;

use async_trait::async_trait;
use groundwork_engine::{
    InputSpec, Module, ModuleContext, ModuleInfo, Operation, Result, Value, ValueType,
};
use tracing::debug;

use super::queries::{quote_ident, role_options, ROLE_EXISTS, ROLE_EXISTS_WITH_OPTIONS};
use super::{
    connection_from, Connection, CONNECTION_TOKEN, INPUT_CONNECTION, INPUT_CREATE_DB,
    INPUT_CREATE_ROLE, INPUT_INHERIT, INPUT_LOGIN, INPUT_NAME, INPUT_REPLICATION,
};

const REQUIRED_PARAMETERS: &[&str] = &[INPUT_NAME, INPUT_CONNECTION];

pub fn new_module() -> Box<dyn Module> {
    Box::new(RoleModule { target: None })
}

/// Desired role settings assembled from the module inputs.
struct RoleTarget {
    name: String,
    login: bool,
    inherit: bool,
    create_db: bool,
    create_role: bool,
    replication: bool,
}

struct RoleModule {
    target: Option<RoleTarget>,
}

#[async_trait]
impl Module for RoleModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "postgres_role",
            name: "PostgreSQL Role",
            description: "Module to manage PostgreSQL roles.",
            inputs: HashMap::from([
                (
                    INPUT_CONNECTION,
                    InputSpec {
                        description: "Connection to the PostgreSQL database, from a postgres_connection operation.",
                        value_type: ValueType::Opaque(CONNECTION_TOKEN),
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_NAME,
                    InputSpec {
                        description: "Name of the role to manage.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_LOGIN,
                    InputSpec {
                        description: "If true, the role can log in to the database.",
                        value_type: ValueType::Bool,
                        required: false,
                        default: Some(Value::Bool(true)),
                    },
                ),
                (
                    INPUT_INHERIT,
                    InputSpec {
                        description: "If true, the role inherits privileges from roles it is a member of.",
                        value_type: ValueType::Bool,
                        required: false,
                        default: Some(Value::Bool(true)),
                    },
                ),
                (
                    INPUT_CREATE_DB,
                    InputSpec {
                        description: "If true, the role can create databases.",
                        value_type: ValueType::Bool,
                        required: false,
                        default: Some(Value::Bool(false)),
                    },
                ),
                (
                    INPUT_CREATE_ROLE,
                    InputSpec {
                        description: "If true, the role can create other roles.",
                        value_type: ValueType::Bool,
                        required: false,
                        default: Some(Value::Bool(false)),
                    },
                ),
                (
                    INPUT_REPLICATION,
                    InputSpec {
                        description: "If true, the role can initiate streaming replication.",
                        value_type: ValueType::Bool,
                        required: false,
                        default: Some(Value::Bool(false)),
                    },
                ),
            ]),
            outputs: HashMap::new(),
            examples: HashMap::from([(
                "Create a new role",
                "id: create-role\nmodule: postgres_role\ninputs:\n  connection:\n    fromDependency:\n      id: connect-db\n      output: connection\n  name: my-new-role\n  login: true",
            )]),
        }
    }

    fn validate(&self, op: &Operation) -> Result<()> {
        for parameter in REQUIRED_PARAMETERS {
            match op.inputs.get(*parameter) {
                None => {
                    return Err(
                        anyhow::anyhow!("missing required parameter: {}", parameter).into(),
                    )
                }
                Some(input) => {
                    if !input.is_static() {
                        continue;
                    }
                    if *parameter == INPUT_NAME && input.as_str().is_empty() {
                        return Err(
                            anyhow::anyhow!("parameter {} cannot be empty", parameter).into()
                        );
                    }
                }
            }
        }
        Ok(())
    }

    async fn check(&mut self, ctx: &ModuleContext) -> Result<bool> {
        let target = role_target(ctx)?;
        let conn = connection_from(ctx)?;

        let exists = role_exists(&conn, &target.name).await?;
        let result = if ctx.does_not_exist() {
            !exists
        } else {
            exists && role_options_correct(&conn, &target).await?
        };
        self.target = Some(target);

        if ctx.tainted() {
            return Ok(false);
        }
        Ok(result)
    }

    async fn set(&mut self, ctx: &ModuleContext) -> Result<()> {
        let target = match self.target.take() {
            Some(target) => target,
            None => role_target(ctx)?,
        };
        let conn = connection_from(ctx)?;

        // The role may exist with the wrong options or not exist at all;
        // probe again before deciding how to reconcile.
        let exists = role_exists(&conn, &target.name).await?;

        if ctx.does_not_exist() {
            if exists {
                drop_role(&conn, &target).await?;
            }
            return Ok(());
        }
        if exists {
            alter_role(&conn, &target).await
        } else {
            create_role(&conn, &target).await
        }
    }
}

fn role_target(ctx: &ModuleContext) -> Result<RoleTarget> {
    let name = ctx.input(INPUT_NAME)?.as_str().to_string();
    if name.is_empty() {
        return Err(anyhow::anyhow!("role name cannot be empty").into());
    }
    Ok(RoleTarget {
        name,
        login: ctx.input(INPUT_LOGIN)?.as_bool(),
        inherit: ctx.input(INPUT_INHERIT)?.as_bool(),
        create_db: ctx.input(INPUT_CREATE_DB)?.as_bool(),
        create_role: ctx.input(INPUT_CREATE_ROLE)?.as_bool(),
        replication: ctx.input(INPUT_REPLICATION)?.as_bool(),
    })
}

async fn role_exists(conn: &Connection, name: &str) -> Result<bool> {
    let row = conn
        .client()
        .query_one(ROLE_EXISTS, &[&name])
        .await
        .map_err(|err| anyhow::anyhow!("error checking role: {}", err))?;
    Ok(row.get(0))
}

async fn role_options_correct(conn: &Connection, target: &RoleTarget) -> Result<bool> {
    let row = conn
        .client()
        .query_one(
            ROLE_EXISTS_WITH_OPTIONS,
            &[
                &target.name,
                &target.login,
                &target.inherit,
                &target.create_db,
                &target.create_role,
                &target.replication,
            ],
        )
        .await
        .map_err(|err| anyhow::anyhow!("error checking role options: {}", err))?;
    Ok(row.get(0))
}

async fn create_role(conn: &Connection, target: &RoleTarget) -> Result<()> {
    let statement = format!(
        "CREATE ROLE {} {}",
        quote_ident(&target.name),
        role_options(
            target.login,
            target.inherit,
            target.create_db,
            target.create_role,
            target.replication,
        ),
    );
    debug!(role = %target.name, "creating role");
    conn.client()
        .execute(statement.as_str(), &[])
        .await
        .map_err(|err| anyhow::anyhow!("error creating role: {}", err))?;
    Ok(())
}

async fn alter_role(conn: &Connection, target: &RoleTarget) -> Result<()> {
    let statement = format!(
        "ALTER ROLE {} {}",
        quote_ident(&target.name),
        role_options(
            target.login,
            target.inherit,
            target.create_db,
            target.create_role,
            target.replication,
        ),
    );
    debug!(role = %target.name, "updating role");
    conn.client()
        .execute(statement.as_str(), &[])
        .await
        .map_err(|err| anyhow::anyhow!("error updating role: {}", err))?;
    Ok(())
}

async fn drop_role(conn: &Connection, target: &RoleTarget) -> Result<()> {
    let statement = format!("DROP ROLE {}", quote_ident(&target.name));
    debug!(role = %target.name, "dropping role");
    conn.client()
        .execute(statement.as_str(), &[])
        .await
        .map_err(|err| anyhow::anyhow!("error dropping role: {}", err))?;
    Ok(())
}
