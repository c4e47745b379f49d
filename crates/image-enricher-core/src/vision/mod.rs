//! Image content analysis through a vision language model.

mod ollama;
mod parser;

pub use ollama::OllamaClient;
pub use parser::{parse_response, AnalysisOutcome, UNKNOWN_SCENE};

use chrono::Utc;
use log::debug;
use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging;
use crate::types::AnalysisRecord;

/// Instruction sent with every image
pub const ANALYSIS_PROMPT: &str = r#"Analyze this image and provide information in JSON format:

{
    "description": "A brief, detailed description of what's in the image (2-3 sentences)",
    "objects": ["list", "of", "detected", "objects"],
    "people": ["descriptions of people if any, or empty list"],
    "scene_type": "indoor/outdoor/landscape/portrait/etc",
    "activities": ["activities", "or", "events", "happening"],
    "confidence": 0.0-1.0 (your confidence in this analysis)
}

Be specific and descriptive. Only return the JSON, no additional text."#;

/// A model that answers a prompt about one image with free text
pub trait VisionService: Send + Sync {
    fn describe(&self, image: &Path, prompt: &str) -> Result<String>;
}

/// Sends images to a `VisionService` and interprets the replies
pub struct VisionAnalyzer {
    service: Box<dyn VisionService>,
    default_confidence: f64,
    fallback_confidence: f64,
}

impl VisionAnalyzer {
    pub fn new(service: Box<dyn VisionService>, config: &Config) -> Self {
        Self {
            service,
            default_confidence: config.default_confidence,
            fallback_confidence: config.fallback_confidence,
        }
    }

    /// Analyze one image file.
    ///
    /// Fails only when the file is missing or the service call fails. A reply
    /// that cannot be read as JSON still produces a record.
    pub fn analyze(&self, path: &Path) -> Result<AnalysisRecord> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let raw_response = self
            .service
            .describe(path, ANALYSIS_PROMPT)
            .map_err(|e| {
                logging::log_service_error(path, &e);
                e
            })?;

        let outcome = parse_response(&raw_response, self.default_confidence, self.fallback_confidence);
        match &outcome {
            AnalysisOutcome::Fallback { reason, .. } => logging::log_parse_fallback(path, reason),
            AnalysisOutcome::Structured(_) => debug!("Parsed structured analysis for {}", path.display()),
        }

        Ok(AnalysisRecord {
            analyzed_at: Utc::now(),
            result: outcome.into_result(),
            raw_response,
        })
    }
}
