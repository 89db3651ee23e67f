//! oxide-dal CLI
//!
//! Runs service flows and inspects or synchronizes tables using a JSON
//! service definition.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_dal::{
    plan_table, sync_table, Connection, Connector, Provider, ProviderRegistry, SqlxConnector,
    TableSchema,
};
use oxide_flow::{CancelSignal, FlowRunner, FunctionRegistry, ServiceConfig, Services};

/// Dialect-aware data access: flows, introspection and table sync.
#[derive(Parser)]
#[command(name = "oxide-dal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service definition file.
    #[arg(short, long, env = "OXIDE_DAL_CONFIG", default_value = "services.json")]
    config: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow and print its result as JSON.
    Run {
        /// Flow name.
        flow: String,

        /// Flow input as a JSON document.
        #[arg(short, long, default_value = "{}")]
        input: String,
    },

    /// List the tables of a connection.
    Tables {
        /// Logical connection name.
        connection: String,
    },

    /// Print a table's schema as JSON.
    Describe {
        /// Logical connection name.
        connection: String,

        /// Table name.
        table: String,
    },

    /// Create or alter a table to match a JSON schema snapshot.
    Sync {
        /// Logical connection name.
        connection: String,

        /// Schema snapshot file (as printed by `describe`).
        snapshot: PathBuf,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a SQL item with its fragments expanded.
    Sql {
        /// SQL item name.
        item: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let services = ServiceConfig::load(&cli.config)?.into_services(FunctionRegistry::new())?;
    let connector = SqlxConnector::new(ProviderRegistry::with_defaults());

    match cli.command {
        Commands::Run { flow, input } => {
            let input: serde_json::Value = serde_json::from_str(&input)?;
            let runner = FlowRunner::new(Arc::new(services), Arc::new(connector));
            let cancel = CancelSignal::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let result = runner.run(&flow, input, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                anyhow::bail!("flow '{flow}' failed");
            }
        }

        Commands::Tables { connection } => {
            let (mut conn, provider) = open(&services, &connector, &connection).await?;
            let tables = provider.get_tables(conn.as_mut()).await;
            conn.close().await?;
            for table in tables? {
                println!("{table}");
            }
        }

        Commands::Describe { connection, table } => {
            let (mut conn, provider) = open(&services, &connector, &connection).await?;
            let schema = provider.get_table_schema(conn.as_mut(), &table).await;
            conn.close().await?;
            match schema? {
                Some(schema) => println!("{}", serde_json::to_string_pretty(&schema)?),
                None => anyhow::bail!("table '{table}' not found"),
            }
        }

        Commands::Sync {
            connection,
            snapshot,
            dry_run,
        } => {
            let desired: TableSchema = serde_json::from_str(&std::fs::read_to_string(&snapshot)?)?;
            let (mut conn, provider) = open(&services, &connector, &connection).await?;

            let outcome = if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
                plan_table(conn.as_mut(), provider.as_ref(), &desired).await
            } else {
                sync_table(conn.as_mut(), provider.as_ref(), &desired).await
            };
            conn.close().await?;

            match outcome? {
                Some(sql) => println!("{sql}"),
                None => info!("Table '{}' already matches the snapshot.", desired.name),
            }
        }

        Commands::Sql { item } => {
            println!("{}", services.mapper.resolve(&item)?);
        }
    }

    Ok(())
}

async fn open(
    services: &Services,
    connector: &SqlxConnector,
    name: &str,
) -> anyhow::Result<(Box<dyn Connection>, Arc<dyn Provider>)> {
    let settings = services.connections.get(name)?;
    let provider = services.providers.get(&settings.dialect)?;
    let conn = connector.connect(settings).await?;
    Ok((conn, provider))
}
