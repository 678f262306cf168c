use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod document;
mod error;
mod reveal;
mod utils;

use api::AppState;
use config::{AppConfig, Credentials};
use reveal::{GenderReveal, LabelPolicy};
use utils::cloud_storage::CloudStorageService;
use utils::document_ai::{DocumentAiService, ProcessorConfig};
use utils::gcp_auth::AccessTokenProvider;
use utils::openai_chat::OpenAiChatService;
use utils::secret_manager::SecretManagerService;

/// Exit status for any failure before the server is listening.
const EXIT_STARTUP_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    let matches = config::command().get_matches();

    init_tracing(matches.get_flag("quiet"));

    let config = match AppConfig::from_matches(&matches, |name| std::env::var(name).ok()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            process::exit(EXIT_STARTUP_FAILURE);
        }
    };

    if let Err(e) = run(config).await {
        error!("Failed to start server: {:#}", e);
        process::exit(EXIT_STARTUP_FAILURE);
    }
}

/// Logs go to stderr; RUST_LOG wins over --quiet.
fn init_tracing(quiet: bool) {
    let default_level = if quiet { "error" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let client = utils::build_http_client(config.http_timeout)?;

    // Log credential sources without exposing secrets
    let auth = Arc::new(match &config.gcp_access_token {
        Some(token) => {
            info!("Using access token from configuration for Google APIs");
            AccessTokenProvider::from_static(client.clone(), token.clone())
        }
        None => {
            info!("Using metadata server credentials for Google APIs");
            AccessTokenProvider::metadata(client.clone())
        }
    });

    let secrets = SecretManagerService::new(client.clone(), auth.clone(), config.project_id.clone());
    let credentials = Credentials::fetch(&secrets, &config).await?;

    let storage = CloudStorageService::new(client.clone(), auth.clone());
    let parser = DocumentAiService::new(
        client.clone(),
        auth,
        ProcessorConfig {
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            processor_id: credentials.processor_id.clone(),
        },
    );
    let classifier = OpenAiChatService::new(
        client,
        credentials.openai_api_key.clone(),
        config.openai_model.clone(),
    )
    .with_endpoint(config.openai_base_url.clone());

    if config.label_policy == LabelPolicy::Lenient {
        info!("Label validation disabled, model answers are returned as-is");
    }
    info!(
        "Serving gs://{}/{} with model {} for origins {:?}",
        config.document.bucket, config.document.object, config.openai_model, config.allowed_origins
    );

    let reveal = GenderReveal::new(
        Arc::new(storage),
        Arc::new(parser),
        Arc::new(classifier),
        config.document.clone(),
        config.label_policy,
    );
    let state = AppState {
        reveal: Arc::new(reveal),
    };

    api::start_server(config.addr, state, &config.allowed_origins).await?;
    Ok(())
}
