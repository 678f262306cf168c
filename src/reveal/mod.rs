pub mod prompt;
pub mod providers;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::document::build_context;
use crate::error::RevealError;
use crate::utils::pdf::{is_pdf, PDF_MIME_TYPE};
use providers::{BlobStore, Classifier, DocumentParser};

pub const LABELS: [&str; 2] = ["male", "female"];

/// Where the test results PDF lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLocation {
    pub bucket: String,
    pub object: String,
}

/// What to do with a model answer that is not one of [`LABELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPolicy {
    /// Reject it with [`RevealError::UnexpectedLabel`].
    Strict,
    /// Pass the trimmed answer through unchanged.
    Lenient,
}

/// Lowercases and strips the decoration models like to add ("Female.", "“male”").
pub fn normalize_label(answer: &str) -> String {
    answer
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Strict: the normalized label, or an error. Lenient: the trimmed answer as is.
pub fn check_label(answer: &str, policy: LabelPolicy) -> Result<String, RevealError> {
    let raw = answer.trim();
    let normalized = normalize_label(raw);
    let known = LABELS.contains(&normalized.as_str());
    match policy {
        LabelPolicy::Strict if known => Ok(normalized),
        LabelPolicy::Strict => Err(RevealError::UnexpectedLabel(raw.to_string())),
        LabelPolicy::Lenient => {
            if !known {
                warn!("Passing through unexpected label {:?}", raw);
            }
            Ok(raw.to_string())
        }
    }
}

/// One reveal: fetch the PDF, parse it, rebuild its text, ask the model.
pub struct GenderReveal {
    storage: Arc<dyn BlobStore>,
    parser: Arc<dyn DocumentParser>,
    classifier: Arc<dyn Classifier>,
    location: DocumentLocation,
    label_policy: LabelPolicy,
}

impl GenderReveal {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        parser: Arc<dyn DocumentParser>,
        classifier: Arc<dyn Classifier>,
        location: DocumentLocation,
        label_policy: LabelPolicy,
    ) -> Self {
        Self {
            storage,
            parser,
            classifier,
            location,
            label_policy,
        }
    }

    pub fn location(&self) -> &DocumentLocation {
        &self.location
    }

    pub async fn reveal(&self) -> Result<String, RevealError> {
        let DocumentLocation { bucket, object } = &self.location;

        let content = self.storage.fetch(bucket, object).await?;
        let head = &content[..content.len().min(512)];
        if !is_pdf(head) {
            return Err(RevealError::StorageFetch(format!(
                "gs://{}/{} is not a PDF",
                bucket, object
            )));
        }

        let document = self.parser.process(&content, PDF_MIME_TYPE).await?;
        let context = build_context(&document)?;
        debug!(
            "Built context of {} characters from {} pages",
            context.chars().count(),
            document.pages.len()
        );

        let answer = self.classifier.classify(&context).await?;
        let label = check_label(&answer, self.label_policy)?;
        info!("Revealed label: {}", label);
        Ok(label)
    }
}
