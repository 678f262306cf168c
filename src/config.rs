use anyhow::{anyhow, bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::error::RevealError;
use crate::reveal::providers::SecretStore;
use crate::reveal::{DocumentLocation, LabelPolicy};
use crate::utils::openai_chat::{DEFAULT_MODEL, OPENAI_ENDPOINT};

const DEFAULT_PROJECT_ID: &str = "personal-website-35";
const DEFAULT_LOCATION: &str = "us";
const DEFAULT_BUCKET: &str = "gender-reveal-documents";
const DEFAULT_OBJECT: &str = "gender-reveal.pdf";
const DEFAULT_OPENAI_SECRET: &str = "open-ai-gender-reveal-key";
const DEFAULT_PROCESSOR_SECRET: &str = "gender-reveal-document-processor-id";
const DEFAULT_ORIGINS: &str = "https://courtneyperigo.com,https://www.courtneyperigo.com";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Command line flags and, for each, the environment variable consulted when it is absent.
const ENV_FALLBACKS: &[(&str, &str)] = &[
    ("addr", "BIND_ADDR"),
    ("project-id", "GCP_PROJECT_ID"),
    ("location", "GCP_LOCATION"),
    ("bucket", "GENDER_REVEAL_BUCKET"),
    ("object", "GENDER_REVEAL_OBJECT"),
    ("openai-secret", "OPENAI_SECRET_NAME"),
    ("processor-secret", "PROCESSOR_SECRET_NAME"),
    ("openai-model", "OPENAI_MODEL"),
    ("openai-base-url", "OPENAI_BASE_URL"),
    ("allowed-origins", "ALLOWED_ORIGINS"),
    ("gcp-access-token", "GOOGLE_OAUTH_ACCESS_TOKEN"),
    ("http-timeout", "HTTP_TIMEOUT_SECS"),
];

/// Everything the service needs to know at startup, resolved once.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub project_id: String,
    pub location: String,
    pub document: DocumentLocation,
    pub openai_secret: String,
    pub processor_secret: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub allowed_origins: Vec<String>,
    pub gcp_access_token: Option<String>,
    pub http_timeout: Duration,
    pub label_policy: LabelPolicy,
}

pub fn command() -> Command {
    Command::new("gender-reveal")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Gender reveal service backed by Document AI and OpenAI")
        .long_about(
            "Serves GET /gender-reveal: downloads the prenatal test PDF from Cloud Storage,\n\
            extracts its text with Document AI and asks an OpenAI chat model whether the\n\
            results say 'male' or 'female'.\n\
            Every option can also be set through the environment variable named in its help.",
        )
        .arg(
            Arg::new("addr")
                .long("addr")
                .value_name("HOST:PORT")
                .help("Listen address [env: BIND_ADDR, default 0.0.0.0:$PORT or 0.0.0.0:8080]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("project-id")
                .long("project-id")
                .value_name("ID")
                .help("Google Cloud project holding the secrets and processor [env: GCP_PROJECT_ID]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("location")
                .long("location")
                .value_name("REGION")
                .help("Document AI processor location [env: GCP_LOCATION]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("bucket")
                .long("bucket")
                .value_name("NAME")
                .help("Cloud Storage bucket with the results PDF [env: GENDER_REVEAL_BUCKET]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("object")
                .long("object")
                .value_name("KEY")
                .help("Object key of the results PDF [env: GENDER_REVEAL_OBJECT]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("openai-secret")
                .long("openai-secret")
                .value_name("SECRET")
                .help("Secret Manager secret holding the OpenAI API key [env: OPENAI_SECRET_NAME]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("processor-secret")
                .long("processor-secret")
                .value_name("SECRET")
                .help("Secret Manager secret holding the Document AI processor id [env: PROCESSOR_SECRET_NAME]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("openai-model")
                .long("openai-model")
                .value_name("MODEL")
                .help("Chat completion model [env: OPENAI_MODEL]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("openai-base-url")
                .long("openai-base-url")
                .value_name("URL")
                .help("OpenAI API base URL [env: OPENAI_BASE_URL]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("allowed-origins")
                .long("allowed-origins")
                .value_name("ORIGINS")
                .help("Comma separated CORS origins [env: ALLOWED_ORIGINS]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("gcp-access-token")
                .long("gcp-access-token")
                .value_name("TOKEN")
                .help("Use this OAuth token instead of the metadata server [env: GOOGLE_OAUTH_ACCESS_TOKEN]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("http-timeout")
                .long("http-timeout")
                .value_name("SECS")
                .help("Timeout for each outbound API call [env: HTTP_TIMEOUT_SECS]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("allow-any-label")
                .long("allow-any-label")
                .help("Return the model answer even when it is not 'male' or 'female'")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors")
                .action(ArgAction::SetTrue),
        )
}

impl AppConfig {
    /// Resolves flags, then environment variables, then defaults.
    pub fn from_matches<F>(matches: &ArgMatches, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |flag: &str| -> Option<String> {
            matches.get_one::<String>(flag).cloned().or_else(|| {
                ENV_FALLBACKS
                    .iter()
                    .find(|(name, _)| *name == flag)
                    .and_then(|(_, var)| env(*var))
            })
        };
        let value_or = |flag: &str, default: &str| value(flag).unwrap_or_else(|| default.to_string());

        let addr = match value("addr") {
            Some(addr) => addr,
            None => {
                let port = env("PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
                format!("0.0.0.0:{}", port)
            }
        };
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid listen address {:?}", addr))?;

        let openai_base_url = value_or("openai-base-url", OPENAI_ENDPOINT);
        url::Url::parse(&openai_base_url)
            .with_context(|| format!("invalid OpenAI base URL {:?}", openai_base_url))?;

        let allowed_origins = parse_origins(&value_or("allowed-origins", DEFAULT_ORIGINS))?;

        let http_timeout = match value("http-timeout") {
            Some(secs) => {
                let secs: u64 = secs
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid HTTP timeout {:?}", secs))?;
                if secs == 0 {
                    bail!("HTTP timeout must be at least one second");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let label_policy = if matches.get_flag("allow-any-label") {
            LabelPolicy::Lenient
        } else {
            LabelPolicy::Strict
        };

        Ok(Self {
            addr,
            project_id: value_or("project-id", DEFAULT_PROJECT_ID),
            location: value_or("location", DEFAULT_LOCATION),
            document: DocumentLocation {
                bucket: value_or("bucket", DEFAULT_BUCKET),
                object: value_or("object", DEFAULT_OBJECT),
            },
            openai_secret: value_or("openai-secret", DEFAULT_OPENAI_SECRET),
            processor_secret: value_or("processor-secret", DEFAULT_PROCESSOR_SECRET),
            openai_model: value_or("openai-model", DEFAULT_MODEL),
            openai_base_url,
            allowed_origins,
            gcp_access_token: value("gcp-access-token").filter(|t| !t.trim().is_empty()),
            http_timeout,
            label_policy,
        })
    }
}

/// Origins must be bare scheme://host[:port] values, as browsers send them.
fn parse_origins(raw: &str) -> Result<Vec<String>> {
    let mut origins = Vec::new();
    for origin in raw.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        let parsed = url::Url::parse(origin).with_context(|| format!("invalid origin {:?}", origin))?;
        if !parsed.origin().is_tuple() {
            bail!("origin {:?} has no scheme, host and port", origin);
        }
        if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(anyhow!("origin {:?} must not carry a path or query", origin));
        }
        origins.push(parsed.origin().ascii_serialization());
    }
    if origins.is_empty() {
        bail!("at least one allowed origin is required");
    }
    Ok(origins)
}

/// API credentials read from Secret Manager once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub processor_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .field("processor_id", &self.processor_id)
            .finish()
    }
}

impl Credentials {
    pub async fn fetch(store: &dyn SecretStore, config: &AppConfig) -> Result<Self, RevealError> {
        let openai_api_key = store.access(&config.openai_secret).await?.trim().to_string();
        let processor_id = store.access(&config.processor_secret).await?.trim().to_string();

        if openai_api_key.is_empty() {
            return Err(RevealError::Credential(format!(
                "secret {} is empty",
                config.openai_secret
            )));
        }
        if processor_id.is_empty() {
            return Err(RevealError::Credential(format!(
                "secret {} is empty",
                config.processor_secret
            )));
        }

        info!("Loaded credentials from project {}", config.project_id);
        Ok(Self {
            openai_api_key,
            processor_id,
        })
    }
}
