use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dermasense_api::{AnalysisResponse, AnalysisServer, MetricsServer};
use dermasense_node::config::ServiceConfig;
use dermasense_node::logging;
use dermasense_vision::{
    decode_image, DevicePreference, ImageClassifier, Labels, SkinClassifier,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dermasense")]
#[command(about = "Skin condition image analysis service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "DERMASENSE_CONFIG")]
    config: Option<PathBuf>,

    /// API listen address (e.g., 0.0.0.0:8000)
    #[arg(long, value_name = "ADDR", env = "DERMASENSE_LISTEN_ADDR")]
    listen_addr: Option<SocketAddr>,

    /// Model weights (.pth/.pt or .safetensors)
    #[arg(long, value_name = "FILE", env = "DERMASENSE_WEIGHTS")]
    weights: Option<PathBuf>,

    /// Swin variant the weights were trained with
    #[arg(long, env = "DERMASENSE_VARIANT")]
    variant: Option<String>,

    /// Compute device (auto, cpu, cuda, metal)
    #[arg(long, env = "DERMASENSE_DEVICE")]
    device: Option<DevicePreference>,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "ADDR", env = "DERMASENSE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the model and serve the HTTP API (default)
    Serve,

    /// Classify a local image and print the analysis as JSON
    Classify {
        /// Image file
        image: PathBuf,
    },

    /// Print the class index to label table
    Labels,

    /// Write the default configuration as TOML
    InitConfig {
        /// Output path
        #[arg(default_value = "dermasense.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Uses LOG_FORMAT env var (json, pretty, compact) and RUST_LOG for levels
    let log_format = std::env::var("LOG_FORMAT").ok();
    let log_config = logging::LogConfig::for_format(log_format.as_deref());

    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("Warning: Failed to initialize structured logging: {}", e);
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("dermasense=info".parse()?),
            )
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Labels) => {
            print_labels();
            return Ok(());
        }
        Some(Commands::InitConfig { ref path }) => {
            ServiceConfig::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli)?;

    match cli.command {
        Some(Commands::Classify { ref image }) => classify_file(&config, image).await,
        _ => serve(config).await,
    }
}

/// Config file (or defaults) with CLI overrides applied, then validated.
fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    if let Some(addr) = cli.listen_addr {
        config.server.listen_addr = addr;
    }
    if let Some(weights) = &cli.weights {
        config.model.weights_path = weights.clone();
    }
    if let Some(variant) = &cli.variant {
        config.model.variant = variant.clone();
    }
    if let Some(device) = cli.device {
        config.model.device = device;
    }
    if let Some(addr) = cli.metrics_addr {
        config.metrics.enabled = true;
        config.metrics.listen_addr = addr;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

async fn load_classifier(config: &ServiceConfig) -> Result<SkinClassifier> {
    let settings = config.model.clone();
    let classifier = tokio::task::spawn_blocking(move || SkinClassifier::load(&settings))
        .await?
        .with_context(|| {
            format!(
                "Failed to load model weights from {}",
                config.model.weights_path.display()
            )
        })?;
    Ok(classifier)
}

async fn serve(config: ServiceConfig) -> Result<()> {
    info!("Starting DermaSense");
    info!("Model variant: {}", config.model.variant);
    info!("Weights: {}", config.model.weights_path.display());

    let classifier: Arc<dyn ImageClassifier> = Arc::new(load_classifier(&config).await?);
    info!("Model ready on {}", classifier.device_name());

    if config.metrics.enabled {
        let metrics = MetricsServer::new(config.metrics.listen_addr);
        tokio::spawn(async move {
            if let Err(e) = metrics.start().await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let server = AnalysisServer::new(classifier, config.server.api_config());
    server.start(config.server.listen_addr).await
}

async fn classify_file(config: &ServiceConfig, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let classifier = load_classifier(config).await?;

    let image = decode_image(&bytes)
        .with_context(|| format!("Unable to decode image {}", path.display()))?;
    let prediction = classifier.classify(&image)?;
    info!(
        label = %prediction.label,
        probability = prediction.probability,
        "Classified {}",
        path.display()
    );

    let response = AnalysisResponse::from(&prediction);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn print_labels() {
    for (index, label) in Labels::default().iter() {
        println!("{:>2}  {}", index, label);
    }
}
