use rocket::serde::{Deserialize, Serialize};

/// the longest summary that gets stored, in characters
pub const SUMMARY_MAX_CHARS: usize = 1000;

/// everything the processing service needs to work on one file
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    pub file_id: u32,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// the processing service's response body
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(crate = "rocket::serde")]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub vector_id: Option<String>,
}

/// how a single pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed,
    /// the file was gone or no longer claimed by the time the job ran, so nothing happened
    Skipped,
}

/// cuts `summary` down to [`SUMMARY_MAX_CHARS`] characters, never splitting a character
pub fn truncate_summary(summary: &str) -> &str {
    match summary.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((index, _)) => &summary[..index],
        None => summary,
    }
}
