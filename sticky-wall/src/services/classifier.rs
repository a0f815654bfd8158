//! Automated content moderation adapter
//!
//! Sends the submitted image to a vision-capable chat-completions
//! endpoint with a fixed moderation prompt and normalizes the free-form
//! reply into a structured decision. The model is expected to answer
//! with a JSON object but is not trusted to: parsing degrades from
//! balanced-brace JSON extraction to an APPROVED-keyword heuristic, and
//! any invocation failure folds to a fail-closed "unavailable" decision
//! that routes the note to manual review. This adapter never returns an
//! error to the pipeline.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Instruction prompt sent with every classification request
const MODERATION_PROMPT: &str = "\
You are moderating images for a public collaborative sticky-note wall. \
Each image is a small hand-drawn or typed note. APPROVE supportive, \
neutral, or harmless expression. REJECT explicit sexual content, graphic \
violence, hate speech, direct threats, personal information, spam, or \
illegal content. Respond with a JSON object exactly like \
{\"decision\": \"APPROVED\" or \"REJECTED\", \"reason\": \"short explanation\", \
\"confidence\": 0.0 to 1.0} and nothing else.";

/// Confidence assigned when only the keyword heuristic could read the reply
const HEURISTIC_CONFIDENCE: f64 = 0.5;

/// Errors from the vision backend invocation
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response carried no message content")]
    MissingContent,
}

/// Raw output of one vision invocation
#[derive(Debug, Clone)]
pub struct GenerateOutput {
    pub text: String,
    /// 0 when the capability does not report usage
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Single-shot vision capability port
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn generate(
        &self,
        image_data_uri: &str,
        prompt: &str,
    ) -> Result<GenerateOutput, ClassifierError>;
}

/// Normalized reading of the model's reply
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierVerdict {
    /// The reply contained a parseable JSON decision
    Structured {
        approved: bool,
        reason: String,
        confidence: f64,
    },
    /// Keyword fallback: the literal APPROVED token decided
    Heuristic { approved: bool },
    /// Invocation failed; fail closed toward manual review
    Unavailable,
}

/// Final decision handed to the submission pipeline
#[derive(Debug, Clone)]
pub struct ModerationDecision {
    pub approved: bool,
    pub reason: String,
    pub confidence: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

// ---------------------------------------------------------------------------
// HTTP backend (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

/// Vision backend over an OpenAI-compatible chat-completions endpoint
pub struct HttpVisionBackend {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpVisionBackend {
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        timeout_secs: u64,
    ) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl VisionBackend for HttpVisionBackend {
    async fn generate(
        &self,
        image_data_uri: &str,
        prompt: &str,
    ) -> Result<GenerateOutput, ClassifierError> {
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_data_uri } }
                ]
            }],
            "max_tokens": 300
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ClassifierError::MissingContent)?;

        let usage = parsed.usage.unwrap_or_default();
        Ok(GenerateOutput {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// First balanced `{...}` substring, string-literal aware so braces
/// inside reason text don't break the scan. Markdown code fences around
/// the object fall away for free.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read the model's free-form reply into a verdict.
///
/// Preference order: balanced JSON object with a `decision` field, then
/// the APPROVED-keyword heuristic over the raw text.
pub fn parse_verdict(text: &str) -> ClassifierVerdict {
    if let Some(candidate) = extract_json_object(text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            if let Some(decision) = value.get("decision").and_then(|d| d.as_str()) {
                let approved = decision.to_ascii_lowercase().starts_with("approv");
                let reason = value
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("")
                    .to_string();
                let confidence = value
                    .get("confidence")
                    .and_then(|c| c.as_f64())
                    .unwrap_or(HEURISTIC_CONFIDENCE)
                    .clamp(0.0, 1.0);
                return ClassifierVerdict::Structured {
                    approved,
                    reason,
                    confidence,
                };
            }
        }
    }

    ClassifierVerdict::Heuristic {
        approved: text.to_ascii_lowercase().contains("approved"),
    }
}

/// Fold any verdict into the one decision shape the pipeline consumes
fn decision_from(verdict: ClassifierVerdict, input_tokens: i64, output_tokens: i64) -> ModerationDecision {
    match verdict {
        ClassifierVerdict::Structured {
            approved,
            reason,
            confidence,
        } => ModerationDecision {
            approved,
            reason,
            confidence,
            input_tokens,
            output_tokens,
        },
        ClassifierVerdict::Heuristic { approved } => ModerationDecision {
            approved,
            reason: "keyword heuristic (unparseable classifier reply)".to_string(),
            confidence: HEURISTIC_CONFIDENCE,
            input_tokens,
            output_tokens,
        },
        ClassifierVerdict::Unavailable => ModerationDecision {
            approved: false,
            reason: "moderation unavailable".to_string(),
            confidence: 0.0,
            input_tokens,
            output_tokens,
        },
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// The moderation classifier the pipeline calls.
///
/// Built without a backend when no endpoint is configured; every note
/// then lands in the manual review queue.
pub struct ModerationClassifier {
    backend: Option<Arc<dyn VisionBackend>>,
}

impl ModerationClassifier {
    pub fn new(backend: Option<Arc<dyn VisionBackend>>) -> Self {
        if backend.is_none() {
            warn!("no moderation backend configured; all notes will require manual review");
        }
        Self { backend }
    }

    /// Classify an image. Infallible by design: invocation errors and
    /// timeouts become the fail-closed unavailable decision.
    pub async fn classify(&self, image_data_uri: &str) -> ModerationDecision {
        let Some(backend) = &self.backend else {
            return decision_from(ClassifierVerdict::Unavailable, 0, 0);
        };

        match backend.generate(image_data_uri, MODERATION_PROMPT).await {
            Ok(output) => decision_from(
                parse_verdict(&output.text),
                output.input_tokens,
                output.output_tokens,
            ),
            Err(e) => {
                warn!(error = %e, "classifier invocation failed; routing to manual review");
                decision_from(ClassifierVerdict::Unavailable, 0, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_json_parses_structured() {
        let verdict = parse_verdict(
            r#"{"decision": "APPROVED", "reason": "friendly doodle", "confidence": 0.93}"#,
        );
        assert_eq!(
            verdict,
            ClassifierVerdict::Structured {
                approved: true,
                reason: "friendly doodle".to_string(),
                confidence: 0.93,
            }
        );
    }

    #[test]
    fn test_fenced_json_parses_identically() {
        let bare = r#"{"decision": "REJECTED", "reason": "hate speech", "confidence": 0.99}"#;
        let fenced = format!("```json\n{}\n```", bare);
        assert_eq!(parse_verdict(bare), parse_verdict(&fenced));
    }

    #[test]
    fn test_prose_wrapped_json_still_found() {
        let text = r#"Sure! Here is my assessment: {"decision": "approved", "confidence": 0.85} Hope that helps."#;
        match parse_verdict(text) {
            ClassifierVerdict::Structured {
                approved,
                confidence,
                ..
            } => {
                assert!(approved);
                assert_eq!(confidence, 0.85);
            }
            other => panic!("expected structured verdict, got {:?}", other),
        }
    }

    #[test]
    fn test_braces_inside_reason_do_not_truncate() {
        let text = r#"{"decision": "REJECTED", "reason": "contains {redacted} slur", "confidence": 0.9}"#;
        match parse_verdict(text) {
            ClassifierVerdict::Structured { approved, reason, .. } => {
                assert!(!approved);
                assert_eq!(reason, "contains {redacted} slur");
            }
            other => panic!("expected structured verdict, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_confidence_defaults_to_low_trust() {
        match parse_verdict(r#"{"decision": "APPROVED"}"#) {
            ClassifierVerdict::Structured { confidence, .. } => assert_eq!(confidence, 0.5),
            other => panic!("expected structured verdict, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        match parse_verdict(r#"{"decision": "APPROVED", "confidence": 7.5}"#) {
            ClassifierVerdict::Structured { confidence, .. } => assert_eq!(confidence, 1.0),
            other => panic!("expected structured verdict, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_heuristic_on_unparseable_reply() {
        assert_eq!(
            parse_verdict("This looks fine to me. APPROVED!"),
            ClassifierVerdict::Heuristic { approved: true }
        );
        assert_eq!(
            parse_verdict("this is Approved content"),
            ClassifierVerdict::Heuristic { approved: true }
        );
        assert_eq!(
            parse_verdict("I cannot allow this image."),
            ClassifierVerdict::Heuristic { approved: false }
        );
    }

    #[test]
    fn test_json_without_decision_field_falls_to_heuristic() {
        assert_eq!(
            parse_verdict(r#"{"verdict": "ok"} APPROVED"#),
            ClassifierVerdict::Heuristic { approved: true }
        );
    }

    struct FailingBackend;

    #[async_trait]
    impl VisionBackend for FailingBackend {
        async fn generate(
            &self,
            _image_data_uri: &str,
            _prompt: &str,
        ) -> Result<GenerateOutput, ClassifierError> {
            Err(ClassifierError::Network("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_invocation_error_fails_closed() {
        let classifier = ModerationClassifier::new(Some(Arc::new(FailingBackend)));
        let decision = classifier.classify("data:image/png;base64,AA==").await;
        assert!(!decision.approved);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.reason, "moderation unavailable");
        assert_eq!(decision.input_tokens, 0);
    }

    #[tokio::test]
    async fn test_missing_backend_fails_closed() {
        let classifier = ModerationClassifier::new(None);
        let decision = classifier.classify("data:image/png;base64,AA==").await;
        assert!(!decision.approved);
        assert_eq!(decision.confidence, 0.0);
    }

    struct CannedBackend(&'static str);

    #[async_trait]
    impl VisionBackend for CannedBackend {
        async fn generate(
            &self,
            _image_data_uri: &str,
            _prompt: &str,
        ) -> Result<GenerateOutput, ClassifierError> {
            Ok(GenerateOutput {
                text: self.0.to_string(),
                input_tokens: 120,
                output_tokens: 18,
            })
        }
    }

    #[tokio::test]
    async fn test_usage_carried_through() {
        let classifier = ModerationClassifier::new(Some(Arc::new(CannedBackend(
            r#"{"decision": "APPROVED", "reason": "ok", "confidence": 0.95}"#,
        ))));
        let decision = classifier.classify("data:image/png;base64,AA==").await;
        assert!(decision.approved);
        assert_eq!(decision.input_tokens, 120);
        assert_eq!(decision.output_tokens, 18);
    }
}
