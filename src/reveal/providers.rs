use async_trait::async_trait;

use crate::document::Document;
use crate::error::RevealError;

/// Named secrets, resolved to their latest version.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn access(&self, name: &str) -> Result<String, RevealError>;
}

/// Raw object bytes from blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, bucket: &str, object: &str) -> Result<Vec<u8>, RevealError>;
}

/// Turns raw file bytes into a structured [`Document`].
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn process(&self, content: &[u8], mime_type: &str) -> Result<Document, RevealError>;
}

/// Answers the reveal question for the extracted test results.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, context: &str) -> Result<String, RevealError>;
}
