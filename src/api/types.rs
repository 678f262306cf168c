use serde::{Deserialize, Serialize};

pub const SERVICE_MESSAGE: &str = "Gender Reveal Service is working.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealResponse {
    pub gender: String,
}
