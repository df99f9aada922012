//! Report parsing capability
//!
//! Turns extracted report text into [`ParsedReport`]. The production client
//! talks to an OpenAI-compatible `/chat/completions` endpoint and asks for a
//! JSON object back.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use vitalink_common::ReportType;

use crate::models::ParsedReport;

// ============================================================================
// Parser Constants
// ============================================================================

pub const DEFAULT_PARSER_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_PARSER_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_PARSER_TIMEOUT_SECS: u64 = 120;

/// Longer inputs are cut before being sent
pub const DEFAULT_MAX_INPUT_CHARS: usize = 100_000;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Parser request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parser returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parser returned no content")]
    EmptyResponse,

    #[error("Parser output is not a valid report: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parsing capability: report text in, structured markers out
#[async_trait]
pub trait ReportParser: Send + Sync {
    async fn parse(
        &self,
        content: &str,
        report_type: ReportType,
    ) -> Result<ParsedReport, ParseError>;
}

#[derive(Debug, Clone)]
pub struct HttpParserConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_input_chars: usize,
}

impl Default for HttpParserConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PARSER_URL.to_string(),
            api_key: None,
            model: DEFAULT_PARSER_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_PARSER_TIMEOUT_SECS),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

/// [`ReportParser`] backed by a chat-completions API
pub struct HttpReportParser {
    client: Client,
    config: HttpParserConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl HttpReportParser {
    pub fn new(config: HttpParserConfig) -> Result<Self, ParseError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn instructions(report_type: ReportType) -> &'static str {
        match report_type {
            ReportType::Blood => {
                "Extract every lab measurement from the blood test report. Respond with a JSON \
                 object {\"biomarkers\": [{\"marker_name\", \"value\", \"unit\", \
                 \"reference_range\"}]}."
            },
            ReportType::Genetic => {
                "Extract every genetic variant call from the report. Respond with a JSON object \
                 {\"snps\": [{\"snp_id\", \"gene_name\", \"genotype\"}]}."
            },
            ReportType::Combined => {
                "Extract every lab measurement and every genetic variant call from the report. \
                 Respond with a JSON object {\"biomarkers\": [{\"marker_name\", \"value\", \
                 \"unit\", \"reference_range\"}], \"snps\": [{\"snp_id\", \"gene_name\", \
                 \"genotype\"}]}."
            },
        }
    }
}

/// First `max_chars` characters of `content`
fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[async_trait]
impl ReportParser for HttpReportParser {
    async fn parse(
        &self,
        content: &str,
        report_type: ReportType,
    ) -> Result<ParsedReport, ParseError> {
        let input = truncate_chars(content, self.config.max_input_chars);

        let body = json!({
            "model": self.config.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": Self::instructions(report_type) },
                { "role": "user", "content": input },
            ],
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ParseError::EmptyResponse)?;

        let report: ParsedReport = serde_json::from_str(&content)?;

        debug!(
            %report_type,
            biomarkers = report.biomarkers.len(),
            snps = report.snps.len(),
            "Report parsed"
        );

        Ok(report)
    }
}
