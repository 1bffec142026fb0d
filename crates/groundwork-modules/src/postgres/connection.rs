//! PostgreSQL connection module

use std::collections::HashMap;

use async_trait::async_trait;
use groundwork_engine::{
    EngineError, InputSpec, Module, ModuleContext, ModuleInfo, OpaqueValue, Operation, OutputSpec,
    Result, Value, ValueType,
};
use tokio_postgres::config::SslMode;
use tokio_postgres::NoTls;
use tracing::{debug, warn};

use super::{
    Connection, CONNECTION_TOKEN, INPUT_DATABASE, INPUT_HOST, INPUT_PASSWORD, INPUT_PORT,
    INPUT_SSLMODE, INPUT_USERNAME, OUTPUT_CONNECTION,
};

const REQUIRED_PARAMETERS: &[&str] = &[INPUT_USERNAME];

pub fn new_module() -> Box<dyn Module> {
    Box::new(ConnectionModule { target: None })
}

/// Connection settings assembled from the module inputs.
struct ConnectionTarget {
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
    ssl_mode: SslMode,
}

struct ConnectionModule {
    target: Option<ConnectionTarget>,
}

#[async_trait]
impl Module for ConnectionModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: "postgres_connection",
            name: "PostgreSQL connection",
            description: "Connection to a PostgreSQL database.",
            inputs: HashMap::from([
                (
                    INPUT_HOST,
                    InputSpec {
                        description: "Hostname or IP address of the PostgreSQL server.",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from("localhost")),
                    },
                ),
                (
                    INPUT_PORT,
                    InputSpec {
                        description: "Port number of the PostgreSQL server.",
                        value_type: ValueType::Int,
                        required: false,
                        default: Some(Value::Int(5432)),
                    },
                ),
                (
                    INPUT_DATABASE,
                    InputSpec {
                        description: "Name of the PostgreSQL database to connect to.",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from("postgres")),
                    },
                ),
                (
                    INPUT_USERNAME,
                    InputSpec {
                        description: "Username to connect to the PostgreSQL database.",
                        value_type: ValueType::String,
                        required: true,
                        default: None,
                    },
                ),
                (
                    INPUT_PASSWORD,
                    InputSpec {
                        description: "Password to connect to the PostgreSQL database.",
                        value_type: ValueType::String,
                        required: false,
                        default: None,
                    },
                ),
                (
                    INPUT_SSLMODE,
                    InputSpec {
                        description: "SSL mode to use when connecting. Options are 'disable', 'prefer', 'require'.",
                        value_type: ValueType::String,
                        required: false,
                        default: Some(Value::from("prefer")),
                    },
                ),
            ]),
            outputs: HashMap::from([(
                OUTPUT_CONNECTION,
                OutputSpec {
                    description: "The established connection to the PostgreSQL database.",
                    value_type: ValueType::Opaque(CONNECTION_TOKEN),
                },
            )]),
            examples: HashMap::from([(
                "Connect to a database",
                "id: connect-db\nmodule: postgres_connection\ninputs:\n  host: db.example.com\n  database: mydb\n  username: admin",
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
                    if input.is_static() && input.as_str().is_empty() {
                        return Err(
                            anyhow::anyhow!("parameter {} cannot be empty", parameter).into()
                        );
                    }
                }
            }
        }

        if let Some(input) = op.inputs.get(INPUT_SSLMODE) {
            if input.is_static() {
                parse_ssl_mode(input.as_str())?;
            }
        }
        Ok(())
    }

    async fn check(&mut self, ctx: &ModuleContext) -> Result<bool> {
        self.target = Some(connection_target(ctx)?);
        // A connection is never "already in the desired state": every run
        // establishes a fresh session so downstream operations receive a
        // usable handle.
        Ok(false)
    }

    async fn set(&mut self, ctx: &ModuleContext) -> Result<()> {
        let target = match self.target.take() {
            Some(target) => target,
            None => connection_target(ctx)?,
        };

        let mut config = tokio_postgres::Config::new();
        config
            .host(&target.host)
            .port(target.port)
            .dbname(&target.database)
            .user(&target.username)
            .ssl_mode(target.ssl_mode);
        if !target.password.is_empty() {
            config.password(&target.password);
        }

        debug!(host = %target.host, port = target.port, database = %target.database, "connecting to PostgreSQL");
        let (client, driver) = tokio::select! {
            connected = config.connect(NoTls) => {
                connected.map_err(|err| anyhow::anyhow!("error connecting to database: {}", err))?
            }
            _ = ctx.cancelled() => return Err(EngineError::Cancelled),
        };

        // The driver owns the socket; it runs until the client handle is
        // dropped when the workflow ends.
        tokio::spawn(async move {
            if let Err(err) = driver.await {
                warn!(error = %err, "postgres connection closed with error");
            }
        });

        ctx.output(
            OUTPUT_CONNECTION,
            OpaqueValue::new(CONNECTION_TOKEN, Connection::new(client)),
        )?;
        Ok(())
    }
}

fn connection_target(ctx: &ModuleContext) -> Result<ConnectionTarget> {
    let host = ctx.input(INPUT_HOST)?.as_str().to_string();
    let port = ctx.input(INPUT_PORT)?.as_int();
    let database = ctx.input(INPUT_DATABASE)?.as_str().to_string();
    let username = ctx.input(INPUT_USERNAME)?.as_str().to_string();
    let password = ctx.input(INPUT_PASSWORD)?.as_str().to_string();
    let ssl_mode = parse_ssl_mode(ctx.input(INPUT_SSLMODE)?.as_str())?;

    let port = u16::try_from(port)
        .map_err(|_| anyhow::anyhow!("port {} is out of range", port))?;

    Ok(ConnectionTarget {
        host,
        port,
        database,
        username,
        password,
        ssl_mode,
    })
}

fn parse_ssl_mode(mode: &str) -> Result<SslMode> {
    match mode {
        "disable" => Ok(SslMode::Disable),
        "" | "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => Err(anyhow::anyhow!("unsupported sslmode: {}", other).into()),
    }
}
