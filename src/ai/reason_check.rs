//! Plausibility scoring of leave reasons through a hosted chat-completion API.
//!
//! The model is asked to grade a reason on four 0..=5 dimensions and to answer
//! with a strict JSON object. A reason passes when the total reaches the
//! configured minimum score. Successful assessments are cached per
//! `(min_score, reason)` so resubmitting the same text does not hit the API.

use std::time::{Duration, Instant};

use moka::future::Cache;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::ai::error::{ReasonCheckError, make_snippet};
use crate::config::Config;
use crate::model::leave_request::AiVerdict;

const SYSTEM_PROMPT: &str = "You are a strict homeroom teacher reviewing student leave \
applications. Assess them rigorously: 1) authenticity requires concrete details \
2) urgent matters must explain their time sensitivity 3) the requested duration must be \
reasonable 4) the request must follow school rules.";

const RUBRIC: &str = r#"As the homeroom teacher, strictly review the student's leave reason on the following dimensions.

Dimensions (0-5 points each):
1. Authenticity - are there concrete supporting details (hospital certificate, exact times, ...)
2. Urgency - can it genuinely not be postponed (emergency, sudden event, ...)
3. Reasonableness - does the requested duration match the cause
4. Compliance - does it follow school leave regulations

Scoring guide:
- 5: clear proof (hospital certificate, parent statement, ...)
- 4: convincing reason but no written proof
- 3: plausible reason but lacking detail
- 2: vague reason
- 1: clearly unreasonable
- 0: violates school rules"#;

const ANSWER_FORMAT: &str = r#"Reply with JSON strictly in this shape:
{
    "score": total score,
    "details": {
        "authenticity": authenticity score,
        "urgency": urgency score,
        "reasonableness": reasonableness score,
        "compliance": compliance score
    },
    "reason": "review opinion, including concrete improvements",
    "suggestion": "how the student could phrase the reason better"
}"#;

pub fn build_prompt(reason: &str) -> String {
    format!("{RUBRIC}\n\nLeave reason to review:\n{reason}\n\n{ANSWER_FORMAT}")
}

/// The JSON object the model is asked to return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Assessment {
    pub score: f64,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasonCheck {
    pub is_valid: bool,
    pub assessment: Assessment,
}

impl ReasonCheck {
    pub fn verdict(&self) -> AiVerdict {
        if self.is_valid {
            AiVerdict::Valid
        } else {
            AiVerdict::Invalid
        }
    }
}

/// Parses the assistant `content` and grades it against `min_score`.
pub fn grade(content: &str, min_score: u32) -> Result<ReasonCheck, ReasonCheckError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| ReasonCheckError::Decode(format!("content is not JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| ReasonCheckError::Decode("content is not a JSON object".into()))?;
    if !object.contains_key("score") || !object.contains_key("details") {
        return Err(ReasonCheckError::Decode(
            "missing required keys `score` and `details`".into(),
        ));
    }

    let assessment: Assessment = serde_json::from_value(value)
        .map_err(|e| ReasonCheckError::Decode(format!("unexpected assessment shape: {e}")))?;

    Ok(ReasonCheck {
        is_valid: assessment.score >= f64::from(min_score),
        assessment,
    })
}

#[derive(Debug, Clone)]
pub struct ReasonCheckerConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub min_score: u32,
    pub cache_capacity: u64,
}

impl From<&Config> for ReasonCheckerConfig {
    fn from(config: &Config) -> Self {
        Self {
            api_key: config.ai_api_key.clone(),
            endpoint: config.ai_endpoint.clone(),
            model: config.ai_model.clone(),
            timeout: Duration::from_secs(config.ai_timeout_secs),
            min_score: config.ai_min_score,
            cache_capacity: config.ai_cache_capacity,
        }
    }
}

/// Client for the scoring API. Cheap to share behind `web::Data`.
pub struct ReasonChecker {
    client: Option<reqwest::Client>,
    url_chat: String,
    model: String,
    min_score: u32,
    cache: Cache<String, ReasonCheck>,
}

impl ReasonChecker {
    /// Without an API key the checker is built in a disabled state and every
    /// call reports [`ReasonCheckError::MissingApiKey`].
    pub fn new(cfg: ReasonCheckerConfig) -> Result<Self, ReasonCheckError> {
        let client = match cfg.api_key.as_deref() {
            Some(api_key) => {
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::AUTHORIZATION,
                    header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                        .map_err(|e| ReasonCheckError::InvalidApiKey(e.to_string()))?,
                );
                headers.insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static("application/json"),
                );

                Some(
                    reqwest::Client::builder()
                        .timeout(cfg.timeout)
                        .default_headers(headers)
                        .build()?,
                )
            }
            None => {
                warn!("DEEPSEEK_API_KEY not set, leave reasons will not be scored");
                None
            }
        };

        let url_chat = format!("{}/v1/chat/completions", cfg.endpoint.trim_end_matches('/'));

        info!(
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            min_score = cfg.min_score,
            enabled = client.is_some(),
            "ReasonChecker initialized"
        );

        Ok(Self {
            client,
            url_chat,
            model: cfg.model,
            min_score: cfg.min_score,
            cache: Cache::builder()
                .max_capacity(cfg.cache_capacity)
                .time_to_live(Duration::from_secs(86400))
                .build(),
        })
    }

    fn cache_key(&self, reason: &str) -> String {
        format!("{}:{}", self.min_score, reason.trim())
    }

    /// Scores `reason`, consulting the cache first.
    pub async fn check(&self, reason: &str) -> Result<ReasonCheck, ReasonCheckError> {
        let key = self.cache_key(reason);
        if let Some(hit) = self.cache.get(&key).await {
            debug!("reason check served from cache");
            return Ok(hit);
        }

        let result = self.request(reason).await?;
        self.cache.insert(key, result.clone()).await;
        Ok(result)
    }

    /// Like [`check`](Self::check) but never fails: errors are logged and
    /// reported as [`AiVerdict::Unavailable`] with no details.
    pub async fn verdict_for(&self, reason: &str) -> (AiVerdict, Option<Assessment>) {
        match self.check(reason).await {
            Ok(check) => (check.verdict(), Some(check.assessment)),
            Err(ReasonCheckError::MissingApiKey) => (AiVerdict::Unavailable, None),
            Err(e) => {
                error!(error = %e, "reason check failed");
                (AiVerdict::Unavailable, None)
            }
        }
    }

    async fn request(&self, reason: &str) -> Result<ReasonCheck, ReasonCheckError> {
        let client = self
            .client
            .as_ref()
            .ok_or(ReasonCheckError::MissingApiKey)?;

        let started = Instant::now();
        let prompt = build_prompt(reason);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: 600,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(model = %self.model, reason_len = reason.len(), "POST {}", self.url_chat);

        let resp = client.post(&self.url_chat).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(
                %status,
                %snippet,
                latency_ms = started.elapsed().as_millis(),
                "chat completion returned non-success status"
            );
            return Err(ReasonCheckError::HttpStatus {
                status,
                url: self.url_chat.clone(),
                snippet,
            });
        }

        let out: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ReasonCheckError::Decode(format!("serde error: {e}")))?;

        let message = out
            .choices
            .into_iter()
            .next()
            .ok_or(ReasonCheckError::EmptyChoices)?
            .message;

        if message.role.as_deref() != Some("assistant") {
            return Err(ReasonCheckError::InvalidMessage);
        }

        let content = message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(ReasonCheckError::EmptyContent)?;

        let check = grade(&content, self.min_score)?;

        info!(
            score = check.assessment.score,
            is_valid = check.is_valid,
            latency_ms = started.elapsed().as_millis(),
            "reason check completed"
        );

        Ok(check)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

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

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    role: Option<String>,
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker_for(server: &MockServer) -> ReasonChecker {
        ReasonChecker::new(ReasonCheckerConfig {
            api_key: Some("test-key".to_string()),
            endpoint: server.uri(),
            model: "deepseek-chat".to_string(),
            timeout: Duration::from_secs(5),
            min_score: 12,
            cache_capacity: 10,
        })
        .unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    const GOOD: &str = r#"{"score": 16, "details": {"authenticity": 4, "urgency": 4, "reasonableness": 4, "compliance": 4}, "reason": "Clear cause", "suggestion": "Attach the clinic note"}"#;

    #[test]
    fn grade_compares_score_with_threshold() {
        let check = grade(GOOD, 12).unwrap();
        assert!(check.is_valid);
        assert_eq!(check.verdict(), AiVerdict::Valid);
        assert_eq!(check.assessment.details["urgency"], 4);

        let strict = grade(GOOD, 17).unwrap();
        assert!(!strict.is_valid);

        let boundary = grade(r#"{"score": 12, "details": {}}"#, 12).unwrap();
        assert!(boundary.is_valid);
    }

    #[test]
    fn grade_requires_score_and_details() {
        assert!(matches!(
            grade(r#"{"score": 20}"#, 12),
            Err(ReasonCheckError::Decode(_))
        ));
        assert!(matches!(grade("[1, 2]", 12), Err(ReasonCheckError::Decode(_))));
        assert!(matches!(grade("sure!", 12), Err(ReasonCheckError::Decode(_))));
    }

    #[test]
    fn prompt_embeds_the_reason() {
        let prompt = build_prompt("My grandmother is in hospital");
        assert!(prompt.contains("My grandmother is in hospital"));
        assert!(prompt.contains("\"score\""));
    }

    #[actix_web::test]
    async fn sends_expected_request_and_caches_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "max_tokens": 600,
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(GOOD)))
            .expect(1)
            .mount(&server)
            .await;

        let checker = checker_for(&server);
        let first = checker.check("Fever since last night").await.unwrap();
        let second = checker.check("Fever since last night").await.unwrap();

        assert!(first.is_valid);
        assert_eq!(first, second);
        // `.expect(1)` is verified when the server drops
    }

    #[actix_web::test]
    async fn non_success_status_is_an_error_and_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let checker = checker_for(&server);
        for _ in 0..2 {
            match checker.check("Family wedding").await {
                Err(ReasonCheckError::HttpStatus { status, snippet, .. }) => {
                    assert_eq!(status.as_u16(), 503);
                    assert_eq!(snippet, "overloaded");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[actix_web::test]
    async fn malformed_completions_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;
        assert!(matches!(
            checker_for(&server).check("x").await,
            Err(ReasonCheckError::EmptyChoices)
        ));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "user", "content": GOOD}}]
            })))
            .mount(&server)
            .await;
        assert!(matches!(
            checker_for(&server).check("x").await,
            Err(ReasonCheckError::InvalidMessage)
        ));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("")))
            .mount(&server)
            .await;
        assert!(matches!(
            checker_for(&server).check("x").await,
            Err(ReasonCheckError::EmptyContent)
        ));
    }

    #[actix_web::test]
    async fn failures_degrade_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("not json")))
            .mount(&server)
            .await;

        let (verdict, details) = checker_for(&server).verdict_for("x").await;
        assert_eq!(verdict, AiVerdict::Unavailable);
        assert!(details.is_none());
    }

    #[actix_web::test]
    async fn missing_api_key_disables_checks() {
        let checker = ReasonChecker::new(ReasonCheckerConfig {
            api_key: None,
            endpoint: "http://127.0.0.1:9".to_string(),
            model: "deepseek-chat".to_string(),
            timeout: Duration::from_secs(1),
            min_score: 12,
            cache_capacity: 10,
        })
        .unwrap();

        assert!(matches!(
            checker.check("x").await,
            Err(ReasonCheckError::MissingApiKey)
        ));
        assert_eq!(checker.verdict_for("x").await.0, AiVerdict::Unavailable);
    }
}
