//! The header oracle: an external language model asked which rows of a raw
//! sheet hold the column headers and which row names the subjects. Its
//! answers are advisory; [`crate::resolver`] validates them.

use crate::error::{AnalysisError, Result};
use crate::models::{OracleConfig, RawSheet};
use crate::resolver::parse_answer;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub trait HeaderOracle {
    /// Proposes a header layout for `sheet`, ideally
    /// `{"header rows list": [..], "subject header row": n}`.
    fn propose(&self, sheet: &RawSheet) -> impl Future<Output = Result<Value>> + Send;
}

/// Always answers with the same value. Used when the layout is already known.
pub struct StaticOracle {
    answer: Value,
}

impl StaticOracle {
    pub fn new(answer: Value) -> Self {
        Self { answer }
    }

    pub fn from_rows(header_rows: &[usize], subject_row: usize) -> Self {
        Self::new(json!({
            "header rows list": header_rows,
            "subject header row": subject_row,
        }))
    }
}

impl HeaderOracle for StaticOracle {
    async fn propose(&self, _sheet: &RawSheet) -> Result<Value> {
        Ok(self.answer.clone())
    }
}

pub struct GeminiOracle {
    client: reqwest::Client,
    config: OracleConfig,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

pub fn header_prompt(csv_content: &str) -> String {
    format!(
        "You are a data analyst.\n\n\
        Input: raw CSV content of a student attendance sheet. Row 1 is the first line.\n\
        CSV:\n{csv_content}\n\
        Tasks:\n\
        1. Find the row numbers that together form the column header.\n\
        2. Find the row number that holds the main subject headings.\n\n\
        Answer with a JSON object only, for example:\n\
        {{\"header rows list\": [5, 6, 7], \"subject header row\": 4}}\n"
    )
}

impl GeminiOracle {
    /// Reads the API key from the environment variable named in `config`.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            AnalysisError::OracleUnavailable(format!("{} is not set", config.api_key_env))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::OracleUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model,
            self.api_key
        )
    }

    /// Sends `prompt` and returns the first candidate's text. Server errors,
    /// connection failures and timeouts are retried.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let payload = json!({"contents": [{"role": "user", "parts": [{"text": prompt}]}]});
        let attempts = self.config.max_retries.max(1);
        let delay = Duration::from_secs(self.config.retry_delay_secs);

        for attempt in 1..=attempts {
            info!(attempt, attempts, model = %self.config.model, "sending header prompt");
            let response = match self.client.post(self.url()).json(&payload).send().await {
                Ok(response) => response,
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < attempts => {
                    warn!(attempt, error = %e, "oracle request failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    return Err(AnalysisError::OracleUnavailable(format!(
                        "request failed after {attempt} attempt(s): {}",
                        e.without_url()
                    )))
                }
            };

            let status = response.status();
            if status.is_server_error() && attempt < attempts {
                warn!(attempt, %status, "oracle server error, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                continue;
            }
            if !status.is_success() {
                return Err(AnalysisError::OracleUnavailable(format!(
                    "HTTP {status} after {attempt} attempt(s)"
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| AnalysisError::OracleUnavailable(e.without_url().to_string()))?;
            let parsed: GenerateResponse = serde_json::from_str(&body)
                .map_err(|_| AnalysisError::OracleResponseMalformed { raw: body.clone() })?;
            return parsed.first_text().ok_or_else(|| {
                AnalysisError::OracleUnavailable(format!("unexpected response structure: {body}"))
            });
        }

        Err(AnalysisError::OracleUnavailable(format!(
            "no answer after {attempts} attempt(s)"
        )))
    }
}

impl HeaderOracle for GeminiOracle {
    async fn propose(&self, sheet: &RawSheet) -> Result<Value> {
        let prompt = header_prompt(&sheet.to_csv()?);
        let text = self.generate(&prompt).await?;
        info!(answer = %text.trim(), "header oracle answered");
        parse_answer(&text)
    }
}
