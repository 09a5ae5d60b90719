use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use registry_operator_metrics::config::{load_config, schema_json};
use registry_operator_metrics::exposition::MetricFamily;
use registry_operator_metrics::metrics::Metrics;
use registry_operator_metrics::scrape::ScrapeClient;
use registry_operator_metrics::startup::Server;
use registry_operator_metrics::utils::logger::init_logging;

#[derive(Parser)]
#[command(
    name = "registry-operator-metrics",
    about = "HTTPS Prometheus exporter for the image registry operator"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true, default_value = "./config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve /metrics over TLS (the default).
    Serve,
    /// Fetch a metrics endpoint and print what it exposes.
    Scrape {
        #[arg(long)]
        url: String,
        /// Skip server certificate verification.
        #[arg(long, default_value_t = false)]
        insecure: bool,
        /// Only print this family; exit non-zero if it is absent.
        #[arg(long)]
        metric: Option<String>,
    },
    /// Print the JSON schema of the configuration file.
    Schema,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::Scrape {
            url,
            insecure,
            metric,
        } => scrape(url, insecure, metric).await,
        Command::Schema => match schema_json() {
            Ok(schema) => {
                println!("{}", schema);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error rendering schema: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn serve(config_path: PathBuf) -> ExitCode {
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    let metrics = match Metrics::new() {
        Ok(metrics) => metrics,
        Err(e) => {
            error!(error = %e, "Failed to register metrics");
            return ExitCode::FAILURE;
        }
    };
    info!(
        families = ?metrics.registry().names(),
        "Registered operator metrics"
    );

    let server = match Server::bind(&config, metrics).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Metrics server failed to start");
            return ExitCode::FAILURE;
        }
    };

    match server.serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Metrics server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn scrape(url: String, insecure: bool, metric: Option<String>) -> ExitCode {
    let client = match ScrapeClient::new(url, insecure) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error building client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let families = match metric {
        Some(name) => match client.find(&name).await {
            Ok(Some(family)) => vec![family],
            Ok(None) => {
                eprintln!("{} does not expose {}", client.url(), name);
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Error scraping {}: {}", client.url(), e);
                return ExitCode::FAILURE;
            }
        },
        None => match client.scrape().await {
            Ok(families) => families,
            Err(e) => {
                eprintln!("Error scraping {}: {}", client.url(), e);
                return ExitCode::FAILURE;
            }
        },
    };

    for family in &families {
        print_family(family);
    }
    ExitCode::SUCCESS
}

fn print_family(family: &MetricFamily) {
    println!("{} ({})", family.name, family.kind);
    for sample in &family.samples {
        let labels: Vec<String> = sample
            .labels
            .iter()
            .map(|(key, value)| format!("{}={:?}", key, value))
            .collect();
        if labels.is_empty() {
            println!("  {} {}", sample.name, sample.value);
        } else {
            println!("  {}{{{}}} {}", sample.name, labels.join(","), sample.value);
        }
    }
}
