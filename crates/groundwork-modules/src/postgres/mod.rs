//! PostgreSQL modules
//!
//! Manages PostgreSQL roles and grants through an established connection.
//! The connection module publishes a shared client handle as an opaque
//! output; downstream modules consume it through a `connection` input wired
//! with `fromDependency`.

pub mod connection;
pub mod grant;
pub mod queries;
pub mod role;

use std::sync::Arc;

use groundwork_engine::{ModuleContext, Result};

pub(crate) const INPUT_HOST: &str = "host";
pub(crate) const INPUT_PORT: &str = "port";
pub(crate) const INPUT_DATABASE: &str = "database";
pub(crate) const INPUT_USERNAME: &str = "username";
pub(crate) const INPUT_PASSWORD: &str = "password";
pub(crate) const INPUT_SSLMODE: &str = "sslmode";
pub(crate) const INPUT_CONNECTION: &str = "connection";
pub(crate) const INPUT_NAME: &str = "name";
pub(crate) const INPUT_ROLE: &str = "role";
pub(crate) const INPUT_PERMISSION: &str = "permission";
pub(crate) const INPUT_SCOPE: &str = "scope";
pub(crate) const INPUT_RESOURCE: &str = "resource";
pub(crate) const INPUT_SCHEMA: &str = "schema";
pub(crate) const INPUT_LOGIN: &str = "login";
pub(crate) const INPUT_INHERIT: &str = "inherit";
pub(crate) const INPUT_CREATE_DB: &str = "create_db";
pub(crate) const INPUT_CREATE_ROLE: &str = "create_role";
pub(crate) const INPUT_REPLICATION: &str = "replication";

pub(crate) const OUTPUT_CONNECTION: &str = "connection";

/// Opaque type token for the shared connection handle.
pub const CONNECTION_TOKEN: &str = "postgres/connection";

/// Shared handle to an established PostgreSQL session.
///
/// The driver task owning the socket runs until the client is dropped at the
/// end of the workflow; the engine does not close resources between
/// operations.
#[derive(Clone)]
pub struct Connection {
    client: Arc<tokio_postgres::Client>,
}

impl Connection {
    pub(crate) fn new(client: tokio_postgres::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Resolve the `connection` input into the shared handle published by a
/// connection operation.
pub(crate) fn connection_from(ctx: &ModuleContext) -> Result<Connection> {
    let input = ctx.input(INPUT_CONNECTION)?;
    let conn = input
        .as_any()
        .and_then(|value| value.downcast_ref::<Connection>())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("connection input is not a PostgreSQL connection"))?;
    Ok(conn)
}
