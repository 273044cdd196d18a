//! OpenAI-compatible oracle
//!
//! Sends each oracle request as a chat completion with a fixed system prompt
//! asking for a JSON object, then decodes the reply. Replies wrapped in
//! Markdown code fences are accepted.

use super::{ExtractedUnits, LanguageOracle, OracleError, QuestionSource};
use crate::config::OracleConfig;
use crate::types::{TestCase, UnitPair, TEST_CASE_COUNT};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

const EXTRACT_PROMPT: &str = "\
Task: Extract the unit to convert FROM and the unit to convert TO from a unit conversion question.
Rules:
1. Use FULL unit names (e.g. \"meters per second\", never \"m/s\").
2. Never abbreviate unit names.
Respond with a JSON object: {\"from_unit\": \"...\", \"to_unit\": \"...\"}";

const VALIDATE_PROMPT: &str = "\
Task: Decide whether converting between the two given units is physically meaningful,
i.e. both measure the same kind of quantity.
Respond with a JSON object: {\"is_valid\": true} or {\"is_valid\": false}";

const FORMULA_PROMPT: &str = "\
Task: Generate a mathematical formula for converting one unit into another.
Rules:
1. Always use FULL unit names (e.g. \"meters per second\", never \"m/s\").
2. Never abbreviate unit names.
3. Use only '*' for multiplication, '/' for division, '**' for exponentiation, '+' and '-'.
4. Minimize the number of mathematical operations.
5. The equation MUST be in the form: to_unit = <expression involving from_unit>
6. The left-hand side must always be the to_unit.
If feedback from failed test cases is given, use it to correct the previous mistake.
Respond with a JSON object: {\"formula\": \"...\"}";

const TEST_CASES_PROMPT: &str = "\
Task: Generate exactly 10 numeric test cases for a unit conversion formula.
Cover: a baseline value, a standard value, a fractional value, zero, a decimal input,
a very small input, a high-precision input, a negative value (replace it with a positive
value if the input unit can never be negative), a large value, and one edge case specific
to this formula. Compute every expected_output from the physical definition of the units.
Respond with a JSON object: {\"test_cases\": [{\"input_value\": 1.0, \"expected_output\": 100.0}, ...]}";

const QUESTIONS_PROMPT: &str = "\
Task: Create natural-language unit conversion questions.
Rules:
- Each question MUST ask about converting one unit into another.
- Use full words, NEVER abbreviations (e.g. 'meters', not 'm').
- Questions must be simple: 'How do I convert X to Y?'
Respond with a JSON object with keys 'question_1', 'question_2', ... and string values.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    top_p: f64,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidityReply {
    is_valid: bool,
}

#[derive(Debug, Deserialize)]
struct FormulaReply {
    formula: String,
}

#[derive(Debug, Deserialize)]
struct TestCasesReply {
    test_cases: Vec<TestCase>,
}

/// Chat-completions client implementing every oracle capability
pub struct OpenAiOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f64,
    top_p: f64,
}

impl OpenAiOracle {
    /// Build from configuration, reading the API key from the configured variable
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            OracleError::Unavailable(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &OracleConfig, api_key: impl Into<String>) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    fn request<'a>(&'a self, system: &'a str, user: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            top_p: self.top_p,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }

    /// One chat completion, decoded into `T`
    async fn complete<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, OracleError> {
        let start = Instant::now();
        let url = format!("{}/chat/completions", self.endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(system, user))
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Response(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::Response("reply has no content".to_string()))?;

        debug!(
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat completion"
        );
        decode_reply(&content)
    }
}

/// Strip an optional Markdown code fence around a reply
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

/// Decode a JSON reply, tolerating fences and prose around the object
pub(crate) fn decode_reply<T: DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    let body = strip_code_fence(text);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => {
            let object = body
                .find('{')
                .zip(body.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &body[start..=end]);
            match object {
                Some(object) => serde_json::from_str(object)
                    .map_err(|e| OracleError::Response(format!("{}: {}", e, text.trim()))),
                None => Err(OracleError::Response(format!("{}: {}", first, text.trim()))),
            }
        }
    }
}

/// Questions from `{"question_1": "...", ...}` in key order, or from a plain array
fn collect_questions(value: serde_json::Value) -> Result<Vec<String>, OracleError> {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(u64, String)> = map
                .into_iter()
                .filter_map(|(key, value)| {
                    let index = key
                        .rsplit('_')
                        .next()
                        .and_then(|n| n.parse().ok())
                        .unwrap_or(u64::MAX);
                    value.as_str().map(|q| (index, q.trim().to_string()))
                })
                .filter(|(_, q)| !q.is_empty())
                .collect();
            entries.sort();
            Ok(entries.into_iter().map(|(_, q)| q).collect())
        }
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| item.as_str().map(|q| q.trim().to_string()))
            .filter(|q| !q.is_empty())
            .collect()),
        other => Err(OracleError::Response(format!(
            "expected an object of questions, got {}",
            other
        ))),
    }
}

#[async_trait]
impl LanguageOracle for OpenAiOracle {
    async fn extract_units(&self, question: &str) -> Result<ExtractedUnits, OracleError> {
        self.complete(EXTRACT_PROMPT, &format!("question: {}", question))
            .await
    }

    async fn is_convertible(&self, pair: &UnitPair) -> Result<bool, OracleError> {
        let user = format!(
            "from_unit: {}\nto_unit: {}",
            pair.from_unit().replace('_', " "),
            pair.to_unit().replace('_', " ")
        );
        let reply: ValidityReply = self.complete(VALIDATE_PROMPT, &user).await?;
        Ok(reply.is_valid)
    }

    async fn generate_formula(
        &self,
        pair: &UnitPair,
        feedback: &str,
    ) -> Result<String, OracleError> {
        let user = format!(
            "from_unit: {}\nto_unit: {}\nfeedback:\n{}",
            pair.from_unit(),
            pair.to_unit(),
            feedback
        );
        let reply: FormulaReply = self.complete(FORMULA_PROMPT, &user).await?;
        Ok(reply.formula)
    }

    async fn generate_test_cases(&self, formula: &str) -> Result<Vec<TestCase>, OracleError> {
        let user = format!("formula: {}\ncount: {}", formula, TEST_CASE_COUNT);
        let reply: TestCasesReply = self.complete(TEST_CASES_PROMPT, &user).await?;
        Ok(reply.test_cases)
    }
}

#[async_trait]
impl QuestionSource for OpenAiOracle {
    async fn generate_questions(
        &self,
        count: usize,
        prompt: &str,
    ) -> Result<Vec<String>, OracleError> {
        let user = format!("instruction: {}\ncount: {}", prompt, count);
        let reply: serde_json::Value = self.complete(QUESTIONS_PROMPT, &user).await?;
        let mut questions = collect_questions(reply)?;
        questions.truncate(count);
        Ok(questions)
    }
}
