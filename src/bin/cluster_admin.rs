use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clustercoord::admin::AdminClient;
use clustercoord::configuration::{DatabaseConfiguration, INIT_ID_KEY, ReplicationMode};
use clustercoord::connection::{AdminClientConfig, ClusterSpec, MemoryConnector};
use clustercoord::core::printable;
use clustercoord::RealAdminClient;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cluster-admin")]
#[command(about = "Inspect and exercise cluster configuration writes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the system keys a configuration writes
    Keys {
        #[arg(long)]
        replication_mode: String,
        #[arg(long)]
        storage_engine: String,
    },
    /// Print the encoded replication policy for a mode, in hex
    Policy {
        #[arg(long)]
        replication_mode: String,
    },
    /// Configure and exclude against an in-memory cluster
    Demo {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        cluster_file_dir: Option<PathBuf>,
        #[arg(long, default_value = "double")]
        replication_mode: String,
        #[arg(long, default_value = "ssd")]
        storage_engine: String,
        #[arg(long = "exclude")]
        excluded: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Keys {
            replication_mode,
            storage_engine,
        } => print_keys(&DatabaseConfiguration::new(replication_mode, storage_engine)),
        Command::Policy { replication_mode } => print_policy(&replication_mode),
        Command::Demo {
            config,
            cluster_file_dir,
            replication_mode,
            storage_engine,
            excluded,
        } => {
            let mut admin_config = match config {
                Some(path) => AdminClientConfig::from_json_file(&path)
                    .await
                    .with_context(|| format!("Failed to load config '{}'", path.display()))?,
                None => AdminClientConfig::default(),
            };
            if let Some(dir) = cluster_file_dir {
                admin_config = admin_config.cluster_file_dir(dir);
            }
            let configuration = DatabaseConfiguration::new(replication_mode, storage_engine);
            run_demo(&admin_config, &configuration, &excluded).await
        }
    }
}

fn print_keys(configuration: &DatabaseConfiguration) -> Result<()> {
    let keys = configuration
        .configuration_keys()
        .with_context(|| format!("Invalid configuration ({})", configuration))?;
    for kv in keys {
        println!("{}", kv);
    }
    Ok(())
}

fn print_policy(replication_mode: &str) -> Result<()> {
    let mode: ReplicationMode = replication_mode.parse()?;
    let hex = mode
        .policy()
        .versioned_bytes()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<String>();
    println!("{}", hex);
    Ok(())
}

async fn run_demo(
    config: &AdminClientConfig,
    configuration: &DatabaseConfiguration,
    excluded: &[String],
) -> Result<()> {
    let connector = MemoryConnector::with_options(config.memory_store.clone());
    let cluster = ClusterSpec::new("demo", "demo:local@127.0.0.1:4500");
    let client = RealAdminClient::connect(&cluster, config, &connector)
        .await
        .context("Failed to open demo cluster")?;

    let report = client
        .configure_database_with_report(configuration, true)
        .await
        .context("Failed to configure new database")?;
    println!(
        "configured {} in {} attempt(s), {} key(s) written",
        configuration, report.attempts, report.writes
    );

    let store = connector.store_for(&cluster.connection_string).await?;
    for kv in store.scan_prefix(b"\xff/conf/") {
        println!("  {}", kv);
    }

    if !excluded.is_empty() {
        client.exclude_instances(excluded).await?;
        println!("excluded: {}", client.excluded_addresses().await?.join(", "));

        let pending = client.can_safely_remove(excluded).await?;
        println!("unsafe to remove: {}", pending.len());

        client.include_instances(excluded).await?;
        println!("after include: {} excluded", client.excluded_addresses().await?.len());
    }

    println!("init marker: {}", printable(&store.read(INIT_ID_KEY).unwrap_or_default()));
    Ok(())
}
