//! PostgreSQL grant module

use std::collections::HashMap;

use async_trait::async_trait;
use groundwork_engine::{
    InputSpec, Module, ModuleContext, ModuleInfo, Operation, Result, Value, ValueType,
};
use tracing::debug;

use super::queries::{
    quote_ident, HAS_DATABASE_PRIVILEGE, HAS_ROLE, HAS_SCHEMA_PRIVILEGE, HAS_TABLE_PRIVILEGE,
};
use super::{
    connection_from, Connection, CONNECTION_TOKEN, INPUT_CONNECTION, INPUT_PERMISSION,
    INPUT_RESOURCE, INPUT_ROLE, INPUT_SCHEMA, INPUT_SCOPE,
};

const REQUIRED_PARAMETERS: &[&str] = &[INPUT_CONNECTION, INPUT_ROLE, INPUT_PERMISSION];

const SCOPE_INSTANCE: &str = "instance";
const SCOPE_TABLE: &str = "table";
const SCOPE_SCHEMA: &str = "schema";
const SCOPE_DATABASE: &str = "database";

const SCHEMA_PERMISSIONS: &[&str] = &["CREATE", "USAGE", "ALL"];
const DATABASE_PERMISSIONS: &[&str] = &["CREATE", "CONNECT", "TEMPORARY", "TEMP", "ALL"];

pub fn new_module() -> Box<dyn Module> {
    Box::new(GrantModule { target: None })
}

/// Desired privilege assembled from the module inputs.
struct GrantTarget {
    role: String,
    permission: String,
    scope: Scope,
    resource: String,
    schema: String,
}

/// Resource-level scope a grant applies to. Instance scope covers role
/// membership, where one role is granted to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Instance,
    Table,
    Schema,
    Database,
}

impl Scope {
    fn parse(scope: &str) -> Result<Scope> {
        match scope.to_lowercase().as_str() {
            SCOPE_INSTANCE => Ok(Scope::Instance),
            SCOPE_TABLE => Ok(Scope::Table),
            SCOPE_SCHEMA => Ok(Scope::Schema),
            SCOPE_DATABASE => Ok(Scope::Database),
            other => Err(anyhow::anyhow!(
                "scope must be one of '{}', '{}', '{}', '{}', got {:?}",
                SCOPE_INSTANCE,
                SCOPE_TABLE,
                SCOPE_SCHEMA,
                SCOPE_DATABASE,
                other
            )
            .into()),
        }
    }
}

struct GrantModule {
    target: Option<GrantTarget>,
}

#[async_trait]
impl Module for GrantModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "postgres_grant",
            name: "PostgreSQL Grant",
            description: "Ensures that a PostgreSQL role has the specified permission on a resource.",
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
                    INPUT_ROLE,
                    InputSpec {
                        description: "Role or username that will have the grant assigned.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_PERMISSION,
                    InputSpec {
                        description: "Permission or role to be assigned to the role. For instance-scoped grants this is a role name; the valid permissions otherwise vary by scope.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_SCOPE,
                    InputSpec {
                        description: "Kind of object the permission applies to: 'instance' (role membership), 'table', 'schema', or 'database'.",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from(SCOPE_INSTANCE)),
                    },
                ),
                (
                    INPUT_RESOURCE,
                    InputSpec {
                        description: "Name of the table, schema, or database. Unused for instance-scoped grants.",
                        value_type: ValueType::String,
                        required: false,
                        default: None,
                    },
                ),
                (
                    INPUT_SCHEMA,
                    InputSpec {
                        description: "Schema containing the table, for table-scoped grants.",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from("public")),
                    },
                ),
            ]),
            outputs: HashMap::new(),
            examples: HashMap::from([
                (
                    "Grant role membership",
                    "id: grant-role-membership\nmodule: postgres_grant\ninputs:\n  connection:\n    fromDependency:\n      id: connect-db\n      output: connection\n  role: my-user\n  permission: my-other-role",
                ),
                (
                    "Grant SELECT on a table",
                    "id: reporting-select\nmodule: postgres_grant\ninputs:\n  connection:\n    fromDependency:\n      id: connect-db\n      output: connection\n  role: reporting\n  permission: SELECT\n  scope: table\n  resource: events",
                ),
            ]),
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
                    if *parameter != INPUT_CONNECTION && input.as_str().is_empty() {
                        return Err(
                            anyhow::anyhow!("parameter {} cannot be empty", parameter).into()
                        );
                    }
                }
            }
        }

        if let Some(input) = op.inputs.get(INPUT_SCOPE) {
            if input.is_static() {
                Scope::parse(input.as_str())?;
            }
        }
        Ok(())
    }

    async fn check(&mut self, ctx: &ModuleContext) -> Result<bool> {
        let target = grant_target(ctx)?;
        let conn = connection_from(ctx)?;

        let granted = privilege_granted(&conn, &target).await?;
        self.target = Some(target);

        if ctx.tainted() {
            return Ok(false);
        }
        if ctx.does_not_exist() {
            return Ok(!granted);
        }
        Ok(granted)
    }

    async fn set(&mut self, ctx: &ModuleContext) -> Result<()> {
        let target = match self.target.take() {
            Some(target) => target,
            None => grant_target(ctx)?,
        };
        let conn = connection_from(ctx)?;

        let statement = grant_statement(&target, ctx.does_not_exist())?;
        debug!(role = %target.role, permission = %target.permission, "reconciling grant");
        conn.client()
            .execute(statement.as_str(), &[])
            .await
            .map_err(|err| anyhow::anyhow!("error reconciling grant: {}", err))?;
        Ok(())
    }
}

fn grant_target(ctx: &ModuleContext) -> Result<GrantTarget> {
    let role = ctx.input(INPUT_ROLE)?.as_str().to_string();
    let permission = ctx.input(INPUT_PERMISSION)?.as_str().to_string();
    if role.is_empty() || permission.is_empty() {
        return Err(anyhow::anyhow!("role and permission are required").into());
    }

    let scope_name = ctx
        .input(INPUT_SCOPE)
        .map(|input| input.as_str().to_string())
        .unwrap_or_default();
    let scope = if scope_name.is_empty() {
        Scope::Instance
    } else {
        Scope::parse(&scope_name)?
    };

    let resource = ctx
        .input(INPUT_RESOURCE)
        .map(|input| input.as_str().to_string())
        .unwrap_or_default();
    let mut schema = ctx
        .input(INPUT_SCHEMA)
        .map(|input| input.as_str().to_string())
        .unwrap_or_default();
    if schema.is_empty() {
        schema = "public".to_string();
    }

    let mut target = GrantTarget {
        role,
        permission,
        scope,
        resource,
        schema,
    };

    match scope {
        // For role membership the permission is a role name; it is always
        // identifier-quoted when interpolated.
        Scope::Instance => {}
        Scope::Table | Scope::Schema | Scope::Database => {
            if target.resource.is_empty() {
                return Err(anyhow::anyhow!(
                    "resource is required for {:?}-scoped grants",
                    scope
                )
                .into());
            }
            target.permission = target.permission.to_uppercase();
            // Privileges are interpolated into DDL; restrict them to
            // keyword text.
            if !target
                .permission
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == ' ' || c == ',')
            {
                return Err(anyhow::anyhow!("invalid permission: {:?}", target.permission).into());
            }
        }
    }

    Ok(target)
}

fn grant_object(target: &GrantTarget) -> String {
    match target.scope {
        Scope::Instance => String::new(),
        Scope::Table => format!(
            "TABLE {}.{}",
            quote_ident(&target.schema),
            quote_ident(&target.resource)
        ),
        Scope::Schema => format!("SCHEMA {}", quote_ident(&target.resource)),
        Scope::Database => format!("DATABASE {}", quote_ident(&target.resource)),
    }
}

/// Render the GRANT (or REVOKE) statement for the target, enforcing the
/// permissions each scope accepts.
fn grant_statement(target: &GrantTarget, revoke: bool) -> Result<String> {
    match target.scope {
        Scope::Instance => {
            return Ok(if revoke {
                format!(
                    "REVOKE {} FROM {}",
                    quote_ident(&target.permission),
                    quote_ident(&target.role),
                )
            } else {
                format!(
                    "GRANT {} TO {}",
                    quote_ident(&target.permission),
                    quote_ident(&target.role),
                )
            });
        }
        Scope::Schema => {
            if !SCHEMA_PERMISSIONS.contains(&target.permission.as_str()) {
                return Err(
                    anyhow::anyhow!("invalid schema permission: {}", target.permission).into(),
                );
            }
        }
        Scope::Database => {
            if !DATABASE_PERMISSIONS.contains(&target.permission.as_str()) {
                return Err(
                    anyhow::anyhow!("invalid database permission: {}", target.permission).into(),
                );
            }
        }
        Scope::Table => {}
    }

    Ok(if revoke {
        format!(
            "REVOKE {} ON {} FROM {}",
            target.permission,
            grant_object(target),
            quote_ident(&target.role),
        )
    } else {
        format!(
            "GRANT {} ON {} TO {}",
            target.permission,
            grant_object(target),
            quote_ident(&target.role),
        )
    })
}

async fn privilege_granted(conn: &Connection, target: &GrantTarget) -> Result<bool> {
    let row = match target.scope {
        // pg_has_role with USAGE reports effective membership.
        Scope::Instance => {
            conn.client()
                .query_one(HAS_ROLE, &[&target.role, &target.permission])
                .await
        }
        Scope::Table => {
            let object = format!("{}.{}", target.schema, target.resource);
            conn.client()
                .query_one(HAS_TABLE_PRIVILEGE, &[&target.role, &object, &target.permission])
                .await
        }
        Scope::Schema => {
            conn.client()
                .query_one(
                    HAS_SCHEMA_PRIVILEGE,
                    &[&target.role, &target.resource, &target.permission],
                )
                .await
        }
        Scope::Database => {
            conn.client()
                .query_one(
                    HAS_DATABASE_PRIVILEGE,
                    &[&target.role, &target.resource, &target.permission],
                )
                .await
        }
    };

    let row = row.map_err(|err| anyhow::anyhow!("error checking grant: {}", err))?;
    Ok(row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundwork_engine::testing::context_from_inputs;
    use groundwork_engine::Input;

    fn target(scope: Scope) -> GrantTarget {
        GrantTarget {
            role: "reporting".to_string(),
            permission: "SELECT".to_string(),
            scope,
            resource: "events".to_string(),
            schema: "public".to_string(),
        }
    }

    fn membership_inputs() -> HashMap<String, Input> {
        HashMap::from([
            (INPUT_ROLE.to_string(), Input::from_value("my-user")),
            (
                INPUT_PERMISSION.to_string(),
                Input::from_value("my-other-role"),
            ),
        ])
    }

    #[test]
    fn test_grant_object_rendering() {
        assert_eq!(grant_object(&target(Scope::Table)), "TABLE \"public\".\"events\"");
        assert_eq!(grant_object(&target(Scope::Schema)), "SCHEMA \"events\"");
        assert_eq!(grant_object(&target(Scope::Database)), "DATABASE \"events\"");
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!(Scope::parse("instance").unwrap(), Scope::Instance);
        assert_eq!(Scope::parse("INSTANCE").unwrap(), Scope::Instance);
        assert_eq!(Scope::parse("table").unwrap(), Scope::Table);
        assert_eq!(Scope::parse("Schema").unwrap(), Scope::Schema);
        assert_eq!(Scope::parse("database").unwrap(), Scope::Database);
        assert!(Scope::parse("column").is_err());
    }

    #[test]
    fn test_default_scope_is_instance() {
        // No scope or resource given: a role membership grant.
        let ctx = context_from_inputs(membership_inputs(), &[]);
        let target = grant_target(&ctx).unwrap();
        assert_eq!(target.scope, Scope::Instance);
        assert_eq!(target.permission, "my-other-role");
        assert!(target.resource.is_empty());
    }

    #[test]
    fn test_membership_statements() {
        let ctx = context_from_inputs(membership_inputs(), &[]);
        let target = grant_target(&ctx).unwrap();

        assert_eq!(
            grant_statement(&target, false).unwrap(),
            "GRANT \"my-other-role\" TO \"my-user\""
        );
        assert_eq!(
            grant_statement(&target, true).unwrap(),
            "REVOKE \"my-other-role\" FROM \"my-user\""
        );
    }

    #[test]
    fn test_table_statements() {
        let t = target(Scope::Table);
        assert_eq!(
            grant_statement(&t, false).unwrap(),
            "GRANT SELECT ON TABLE \"public\".\"events\" TO \"reporting\""
        );
        assert_eq!(
            grant_statement(&t, true).unwrap(),
            "REVOKE SELECT ON TABLE \"public\".\"events\" FROM \"reporting\""
        );
    }

    #[test]
    fn test_scope_permission_rules() {
        let mut schema = target(Scope::Schema);
        schema.permission = "USAGE".to_string();
        assert!(grant_statement(&schema, false).is_ok());
        schema.permission = "SELECT".to_string();
        assert!(grant_statement(&schema, false).is_err());

        let mut database = target(Scope::Database);
        database.permission = "CONNECT".to_string();
        assert!(grant_statement(&database, false).is_ok());
        database.permission = "USAGE".to_string();
        assert!(grant_statement(&database, false).is_err());
    }

    #[test]
    fn test_resource_required_for_object_scopes() {
        let mut inputs = membership_inputs();
        inputs.insert(INPUT_SCOPE.to_string(), Input::from_value("table"));
        let ctx = context_from_inputs(inputs, &[]);
        assert!(grant_target(&ctx).is_err());
    }

    #[test]
    fn test_grant_target_normalizes_permission() {
        let ctx = context_from_inputs(
            HashMap::from([
                (INPUT_ROLE.to_string(), Input::from_value("reporting")),
                (INPUT_PERMISSION.to_string(), Input::from_value("select")),
                (INPUT_SCOPE.to_string(), Input::from_value("table")),
                (INPUT_RESOURCE.to_string(), Input::from_value("events")),
                (INPUT_SCHEMA.to_string(), Input::from_value("public")),
            ]),
            &[],
        );
        let target = grant_target(&ctx).unwrap();
        assert_eq!(target.permission, "SELECT");
    }

    #[test]
    fn test_membership_permission_keeps_case() {
        // Role names are identifiers, not keywords; case is preserved.
        let mut inputs = membership_inputs();
        inputs.insert(
            INPUT_PERMISSION.to_string(),
            Input::from_value("MixedCaseRole"),
        );
        let ctx = context_from_inputs(inputs, &[]);
        let target = grant_target(&ctx).unwrap();
        assert_eq!(target.permission, "MixedCaseRole");
    }

    #[test]
    fn test_grant_target_rejects_injection() {
        let ctx = context_from_inputs(
            HashMap::from([
                (INPUT_ROLE.to_string(), Input::from_value("reporting")),
                (
                    INPUT_PERMISSION.to_string(),
                    Input::from_value("SELECT; DROP TABLE events"),
                ),
                (INPUT_SCOPE.to_string(), Input::from_value("table")),
                (INPUT_RESOURCE.to_string(), Input::from_value("events")),
                (INPUT_SCHEMA.to_string(), Input::from_value("public")),
            ]),
            &[],
        );
        assert!(grant_target(&ctx).is_err());
    }

    #[test]
    fn test_validate_scope() {
        let module = GrantModule { target: None };
        let op = Operation {
            module: "postgres_grant".to_string(),
            id: "grant".to_string(),
            inputs: HashMap::from([
                (
                    INPUT_CONNECTION.to_string(),
                    Input::from_dependency("connect-db", "connection"),
                ),
                (INPUT_ROLE.to_string(), Input::from_value("reporting")),
                (INPUT_PERMISSION.to_string(), Input::from_value("SELECT")),
                (INPUT_SCOPE.to_string(), Input::from_value("galaxy")),
            ]),
            ..Operation::default()
        };
        assert!(module.validate(&op).is_err());
    }

    #[test]
    fn test_validate_membership_grant_without_resource() {
        let module = GrantModule { target: None };
        let op = Operation {
            module: "postgres_grant".to_string(),
            id: "grant".to_string(),
            inputs: HashMap::from([
                (
                    INPUT_CONNECTION.to_string(),
                    Input::from_dependency("connect-db", "connection"),
                ),
                (INPUT_ROLE.to_string(), Input::from_value("my-user")),
                (
                    INPUT_PERMISSION.to_string(),
                    Input::from_value("my-other-role"),
                ),
            ]),
            ..Operation::default()
        };
        assert!(module.validate(&op).is_ok());
    }
}
