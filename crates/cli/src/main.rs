use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use pactum_core::Work;
use pactum_pipeline::render::{
    render_pipeline_pod, render_role, render_role_binding, render_scheduling_config_map,
    render_service_account, RoleScope,
};
use pactum_pipeline::{PipelineIdentity, PipelineLabels};

#[derive(Parser, Debug)]
#[command(name = "pactumctl", version, about = "Pactum CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a Work manifest (resource request vs worker resource)
    Classify {
        /// Work manifest file (YAML or JSON; full object or bare spec)
        file: PathBuf,
    },
    /// Print the merged scheduling selectors of a Work manifest
    Selectors {
        /// Work manifest file (YAML or JSON; full object or bare spec)
        file: PathBuf,
    },
    /// Derive the pipeline identity for a promise/resource-request pair
    Pipeline {
        /// Promise identifier
        promise_id: String,
        /// Resource request identifier
        resource_request_id: String,
        /// Render the auxiliary objects as YAML instead of listing names
        #[arg(long = "render", action = ArgAction::SetTrue)]
        render: bool,
        /// Pipeline container image (used with --render)
        #[arg(long = "image", default_value = "ghcr.io/pactum/pipeline:latest")]
        image: String,
        /// API group granted to the pipeline role (used with --render)
        #[arg(long = "api-group", default_value = pactum_controller::WORK_GROUP)]
        api_group: String,
        /// Resource plurals granted to the pipeline role (used with --render)
        #[arg(long = "resource", default_value = "*")]
        resources: Vec<String>,
    },
    /// Run the work controller against the current cluster context
    Controller {},
}

fn init_tracing() {
    let env = std::env::var("PACTUM_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("PACTUM_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid PACTUM_METRICS_ADDR; expected host:port");
        }
    }
}

/// Accept either a full Work object or just its spec body.
fn work_from_value(mut value: serde_json::Value) -> Result<Work> {
    if value.get("kind").and_then(|k| k.as_str()) == Some("Work") {
        if let Some(spec) = value.get_mut("spec") {
            value = spec.take();
        }
    }
    serde_json::from_value(value).context("decoding work spec")
}

fn load_work(path: &Path) -> Result<Work> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw).context("parsing manifest")?;
    let json = serde_json::to_value(value).context("converting manifest to JSON")?;
    work_from_value(json)
}

fn classification(work: &Work) -> &'static str {
    if work.is_resource_request() {
        "resource-request"
    } else if work.is_worker_resource() {
        "worker-resource"
    } else {
        "unclassified"
    }
}

#[derive(Serialize)]
struct ClassifyOut<'a> {
    kind: &'a str,
    replicas: i32,
    scheduling: bool,
}

#[derive(Serialize)]
struct PipelineOut {
    configure_pipeline_name: String,
    service_account_name: String,
    role_name: String,
    role_binding_name: String,
    config_map_name: String,
    namespace: String,
    promise_id: String,
    resource_request_id: String,
    labels: PipelineLabels,
    pipeline_pod_labels: PipelineLabels,
}

impl PipelineOut {
    fn from_identity(id: &PipelineIdentity) -> Self {
        Self {
            configure_pipeline_name: id.configure_pipeline_name(),
            service_account_name: id.service_account_name(),
            role_name: id.role_name(),
            role_binding_name: id.role_binding_name(),
            config_map_name: id.config_map_name(),
            namespace: id.namespace().to_string(),
            promise_id: id.promise_id().to_string(),
            resource_request_id: id.resource_request_id().to_string(),
            labels: id.labels(),
            pipeline_pod_labels: id.pipeline_pod_labels(),
        }
    }
}

fn print_rendered(id: &PipelineIdentity, image: &str, scope: &RoleScope) -> Result<()> {
    let docs = vec![
        serde_yaml::to_string(&render_service_account(id))?,
        serde_yaml::to_string(&render_role(id, scope))?,
        serde_yaml::to_string(&render_role_binding(id))?,
        // Selectors come from the resource request's Work at pipeline time;
        // an offline render publishes an empty selector map.
        serde_yaml::to_string(&render_scheduling_config_map(id, &Default::default())?)?,
        serde_yaml::to_string(&render_pipeline_pod(id, image))?,
    ];
    print!("{}", docs.join("---\n"));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { file } => {
            let work = load_work(&file)?;
            let out = ClassifyOut {
                kind: classification(&work),
                replicas: work.replicas,
                scheduling: work.has_scheduling(),
            };
            match cli.output {
                Output::Human => {
                    println!("kind: {}", out.kind);
                    println!("replicas: {}", out.replicas);
                    println!(
                        "scheduling: {}",
                        if out.scheduling { "present" } else { "none" }
                    );
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&out)?),
            }
        }
        Commands::Selectors { file } => {
            let work = load_work(&file)?;
            let selectors = work.scheduling_selectors();
            match cli.output {
                Output::Human => {
                    if selectors.is_empty() {
                        println!("(no selectors; matches any worker)");
                    }
                    for (key, value) in &selectors {
                        println!("{}={}", key, value);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&selectors)?),
            }
        }
        Commands::Pipeline {
            promise_id,
            resource_request_id,
            render,
            image,
            api_group,
            resources,
        } => {
            let namespace = cli.namespace.as_deref().unwrap_or("default");
            let id = PipelineIdentity::new(&promise_id, &resource_request_id, namespace);
            if render {
                let scope = RoleScope { api_groups: vec![api_group], resources };
                print_rendered(&id, &image, &scope)?;
            } else {
                let out = PipelineOut::from_identity(&id);
                match cli.output {
                    Output::Human => {
                        println!("configure-pipeline: {}", out.configure_pipeline_name);
                        println!("service-account:    {}", out.service_account_name);
                        println!("role:               {}", out.role_name);
                        println!("role-binding:       {}", out.role_binding_name);
                        println!("config-map:         {}", out.config_map_name);
                        println!("namespace:          {}", out.namespace);
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&out)?),
                }
            }
        }
        Commands::Controller {} => {
            info!(ns = ?cli.namespace, "controller invoked");
            pactum_controller::run(cli.namespace.as_deref()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_work_object_unwraps_to_its_spec() {
        let value = serde_json::json!({
            "apiVersion": "platform.pactum.dev/v1alpha1",
            "kind": "Work",
            "metadata": { "name": "shop-work" },
            "spec": { "replicas": 1 }
        });
        let work = work_from_value(value).unwrap();
        assert!(work.is_resource_request());
    }

    #[test]
    fn bare_spec_body_parses_directly() {
        let value = serde_json::json!({ "replicas": -1 });
        let work = work_from_value(value).unwrap();
        assert!(work.is_worker_resource());
    }

    #[test]
    fn foreign_kinds_are_not_unwrapped() {
        let value = serde_json::json!({
            "kind": "ConfigMap",
            "spec": { "replicas": 1 }
        });
        // Not a Work object: decoded as a bare spec body, whose unknown
        // fields are ignored and whose replicas default to 0.
        let work = work_from_value(value).unwrap();
        assert_eq!(work.replicas, 0);
    }
}
