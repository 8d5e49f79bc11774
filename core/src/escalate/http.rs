//! OpenAI-compatible chat-completions reasoner (Groq by default).

use super::prompt::{build_system_prompt, build_user_prompt};
use super::response::parse_answer;
use super::{EscalationError, EscalationRequest, Reasoner, ReasonerResponse, TokenUsage};
use serde::Deserialize;
use std::time::{Duration, Instant};

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 200;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpReasoner {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key_env: String,
    timeout: Duration,
}

impl HttpReasoner {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key_env: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EscalationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EscalationError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key_env: api_key_env.into(),
            timeout,
        })
    }

    /// Groq endpoint and model, key from `GROQ_API_KEY`, 5 s timeout.
    pub fn groq() -> Result<Self, EscalationError> {
        Self::new(
            DEFAULT_ENDPOINT,
            DEFAULT_MODEL,
            DEFAULT_API_KEY_ENV,
            DEFAULT_TIMEOUT,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<String, EscalationError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| EscalationError::MissingApiKey(self.api_key_env.clone()))
    }

    fn request_body(&self, request: &EscalationRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": build_system_prompt() },
                { "role": "user", "content": build_user_prompt(request) },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "response_format": { "type": "json_object" },
        })
    }

    fn map_send_error(&self, e: &reqwest::Error) -> EscalationError {
        if e.is_timeout() {
            EscalationError::Timeout(self.timeout.as_millis() as u64)
        } else {
            EscalationError::Http(e.to_string())
        }
    }
}

impl Reasoner for HttpReasoner {
    fn name(&self) -> &str {
        "http"
    }

    fn reason(&self, request: &EscalationRequest) -> Result<ReasonerResponse, EscalationError> {
        let api_key = self.api_key()?;
        let start = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            log::error!(
                "[HttpReasoner::reason] API error {}: {}",
                status.as_u16(),
                body.chars().take(300).collect::<String>()
            );
            return Err(EscalationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .map_err(|e| EscalationError::Parse(format!("Invalid completion body: {e}")))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(EscalationError::EmptyResponse)?;

        let answer = parse_answer(&content)?;
        let latency_ms = start.elapsed().as_millis() as u64;
        log::debug!(
            "[HttpReasoner::reason] {} answered {} in {latency_ms} ms",
            self.model,
            answer.primary_category
        );

        Ok(ReasonerResponse {
            answer,
            latency_ms,
            usage: completion.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::taxonomy::test_support::{category, snapshot};
    use crate::taxonomy::SkillGroup;

    fn request() -> EscalationRequest {
        let taxonomy = snapshot(vec![category("ac_breakdown", SkillGroup::Technical, &["ac"])]);
        EscalationRequest::new("ac broken", &classify("ac broken", &taxonomy), &taxonomy)
    }

    #[test]
    fn test_missing_api_key_fails_before_network() {
        let reasoner = HttpReasoner::new(
            "http://127.0.0.1:9/unused",
            DEFAULT_MODEL,
            "TRIAGE_TEST_KEY_THAT_IS_NEVER_SET",
            Duration::from_millis(100),
        )
        .unwrap();
        let err = reasoner.reason(&request()).unwrap_err();
        assert!(matches!(err, EscalationError::MissingApiKey(ref var) if var == "TRIAGE_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_request_body_shape() {
        let reasoner = HttpReasoner::groq().unwrap();
        let body = reasoner.request_body(&request());
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("ac broken"));
    }

    #[test]
    fn test_completion_usage_is_parsed() {
        let json = r#"{
            "choices": [{"message": {"content": "{}"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
        }"#;
        let completion: ChatCompletion = serde_json::from_str(json).unwrap();
        assert_eq!(completion.usage.unwrap().total_tokens, 160);
        assert_eq!(completion.choices.len(), 1);
    }
}
