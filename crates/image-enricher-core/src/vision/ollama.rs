use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::VisionService;
use crate::config::Config;
use crate::error::{Error, Result};

/// Blocking client for a local Ollama server
pub struct OllamaClient {
    http_client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    images: Vec<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(config.ollama_timeout())
            .build()?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/api/chat", config.ollama_host.trim_end_matches('/')),
            model: config.ollama_model.clone(),
        })
    }
}

impl VisionService for OllamaClient {
    fn describe(&self, image: &Path, prompt: &str) -> Result<String> {
        let bytes = fs::read(image)?;
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
                images: vec![STANDARD.encode(bytes)],
            }],
            stream: false,
        };

        debug!("Sending {} to {} ({})", image.display(), self.endpoint, self.model);

        let response = self.http_client.post(&self.endpoint).json(&request).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Service(format!(
                "{} returned {}: {}",
                self.endpoint,
                status.as_u16(),
                body.trim()
            )));
        }

        let chat: ChatResponse = response.json()?;
        Ok(chat.message.content)
    }
}
