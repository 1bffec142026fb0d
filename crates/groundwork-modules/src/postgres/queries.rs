//! Query text used by the PostgreSQL modules

/// Whether a role exists.
pub(crate) const ROLE_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)";

/// Whether a role exists with exactly the requested option flags.
pub(crate) const ROLE_EXISTS_WITH_OPTIONS: &str = "SELECT EXISTS (\
     SELECT 1 FROM pg_roles \
     WHERE rolname = $1 \
       AND rolcanlogin = $2 \
       AND rolinherit = $3 \
       AND rolcreatedb = $4 \
       AND rolcreaterole = $5 \
       AND rolreplication = $6)";

/// Whether a role is a member of another role (instance-scope grants).
pub(crate) const HAS_ROLE: &str = "SELECT pg_has_role($1, $2, 'USAGE')";

pub(crate) const HAS_TABLE_PRIVILEGE: &str = "SELECT has_table_privilege($1, $2, $3)";
pub(crate) const HAS_SCHEMA_PRIVILEGE: &str = "SELECT has_schema_privilege($1, $2, $3)";
pub(crate) const HAS_DATABASE_PRIVILEGE: &str = "SELECT has_database_privilege($1, $2, $3)";

/// Quote an identifier for interpolation into DDL, which cannot take bind
/// parameters.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Render the role option keywords for CREATE ROLE / ALTER ROLE.
pub(crate) fn role_options(
    login: bool,
    inherit: bool,
    create_db: bool,
    create_role: bool,
    replication: bool,
) -> String {
    let flag = |on: bool, word: &str| {
        if on {
            word.to_string()
        } else {
            format!("NO{}", word)
        }
    };
    [
        flag(login, "LOGIN"),
        flag(inherit, "INHERIT"),
        flag(create_db, "CREATEDB"),
        flag(create_role, "CREATEROLE"),
        flag(replication, "REPLICATION"),
    ]
    .join(" ")
}
