//! `stratum-cli`: ad-hoc CRUD against a running configuration, mostly for
//! smoke-testing a backend connection string without writing a test harness.

use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use stratum_core::config::{DatabaseConfig, ResourceConfig};
use stratum_core::schema::{AttributeDef, AttributeType, Schema};
use stratum_core::value::Value;
use stratum_server::Database;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratum-cli", about = "Stratum object-store runtime CLI")]
struct Cli {
    /// Backend connection string, e.g. `memory://`, `file:///tmp/store`, `s3://bucket/prefix`.
    #[arg(long, env = "STRATUM_CONNECTION_STRING", default_value = "memory://")]
    connection_string: String,

    /// Expose Prometheus metrics at `http://127.0.0.1:<port>/metrics` (requires the `prometheus` feature).
    #[arg(long, env = "STRATUM_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inserts a record with a single string field and prints its id.
    Put {
        resource: String,
        field: String,
        value: String,
    },
    /// Fetches a record by id and prints its fields.
    Get { resource: String, id: String },
    /// Deletes a record by id.
    Delete { resource: String, id: String },
    /// Lists up to `limit` records in a resource.
    List {
        resource: String,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stratum_server=info")))
        .init();

    let cli = Cli::parse();
    if let Some(port) = cli.metrics_port {
        install_prometheus_exporter(port)?;
    }

    let db_config = DatabaseConfig::new(cli.connection_string);
    let db = Database::connect(&db_config)?;

    match cli.command {
        Command::Put { resource, field, value } => {
            let schema = ad_hoc_schema(&resource, &field);
            let resource = db.register_resource(schema, ResourceConfig::default());
            let mut data = BTreeMap::new();
            data.insert(field, Value::String(value));
            let record = resource.insert(data).await?;
            println!("{}", record.id);
        }
        Command::Get { resource, id } => {
            let schema = ad_hoc_schema(&resource, "value");
            let resource = db.register_resource(schema, ResourceConfig::default());
            let record = resource.get(&id).await?;
            let json: serde_json::Map<String, serde_json::Value> =
                record.data.into_iter().map(|(k, v)| (k, v.into_json())).collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Command::Delete { resource, id } => {
            let schema = ad_hoc_schema(&resource, "value");
            let resource = db.register_resource(schema, ResourceConfig::default());
            resource.delete(&id).await?;
            tracing::info!(id, "deleted");
        }
        Command::List { resource, limit } => {
            let schema = ad_hoc_schema(&resource, "value");
            let resource = db.register_resource(schema, ResourceConfig::default());
            for record in resource.list(limit).await? {
                println!("{}", record.id);
            }
        }
    }

    Ok(())
}

fn ad_hoc_schema(resource_name: &str, field: &str) -> Schema {
    Schema::compile(resource_name, 1, vec![AttributeDef::new(field, AttributeType::String)], vec![])
        .expect("ad-hoc single-field schema is always well-formed")
}

#[cfg(feature = "prometheus")]
fn install_prometheus_exporter(port: u16) -> anyhow::Result<()> {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
        .install()?;
    tracing::info!(port, "prometheus exporter installed");
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_prometheus_exporter(_port: u16) -> anyhow::Result<()> {
    anyhow::bail!("--metrics-port requires building stratum-cli with the `prometheus` feature")
}
