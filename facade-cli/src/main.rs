use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use openshift_facade::{OpenshiftClient, ResourceRequest, Settings};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(about = "Read-only access to a fleet of OpenShift clusters")]
struct Args {
    /// Output format
    #[arg(long, value_enum, default_value_t = Output::Json, global = true)]
    output: Output,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a resource from one cluster or every matching cluster
    Get(Get),
    /// List clusters and regions of an environment
    Clusters {
        environment: String,
        /// Keep one region per cluster (azure clusters keep all)
        #[arg(long)]
        simplified: bool,
    },
    /// List environment and cluster names
    Environments,
}

#[derive(Parser, Debug)]
struct Get {
    #[arg(long, short)]
    env: String,
    /// Cluster name. If omitted, every cluster of the environment is queried.
    #[arg(long, short)]
    cluster: Option<String>,
    /// Resource kind, e.g. `pods`, `routes`, `bgblock`, `url`
    #[arg(long, short)]
    kind: String,
    #[arg(long, short)]
    namespace: Option<String>,
    #[arg(long, short)]
    region: Option<String>,
    /// Fetch a single named object instead of a listing
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    az: Option<String>,
}

impl Get {
    fn request(&self) -> ResourceRequest {
        ResourceRequest {
            environment: self.env.clone(),
            cluster: self.cluster.clone(),
            kind: Some(self.kind.clone()),
            namespace: self.namespace.clone(),
            region: self.region.clone(),
            name: self.name.clone(),
            az: self.az.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Output {
    Json,
    Yaml,
}

impl Output {
    fn print<T: Serialize>(self, value: &T) -> anyhow::Result<()> {
        let text = match self {
            Output::Json => serde_json::to_string_pretty(value)?,
            Output::Yaml => serde_yaml::to_string(value)?,
        };
        println!("{}", text);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = Settings::from_env().context("invalid settings")?;
    tracing::info!(entity = settings.entity.as_str(), "Loading cluster configuration");
    let client = OpenshiftClient::connect(&settings)
        .await
        .context("failed to load cluster configuration")?;

    match &args.command {
        Command::Get(get) => {
            let results = client
                .get_resource(&get.request())
                .await
                .with_context(|| format!("failed to get {} in {}", get.kind, get.env))?;
            args.output.print(&results)?;
        }
        Command::Clusters {
            environment,
            simplified,
        } => {
            let (all, simple) = client.cluster_summaries(environment)?;
            args.output
                .print(if *simplified { &simple } else { &all })?;
        }
        Command::Environments => {
            let (environments, clusters) = client.environments_and_clusters();
            args.output.print(&serde_json::json!({
                "environments": environments,
                "clusters": clusters,
            }))?;
        }
    }
    Ok(())
}
