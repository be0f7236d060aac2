//! Core request/response types for Oxigate.
//!
//! A caller hands the gateway a [`GenerateRequest`] and always gets a
//! [`GenerateResponse`] back — degraded to a canned fallback if every
//! provider is unavailable, but never an error (the one exception being
//! malformed caller input, rejected up front).
//!
//! The task payload is a tagged enum over the task kind, so adapters
//! pattern-match exhaustively instead of probing optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RequestError;

/// Provider name reported when the static fallback served the response.
pub const FALLBACK_PROVIDER: &str = "fallback";

// ─────────────────────────────────────────────
// Task kinds and payloads
// ─────────────────────────────────────────────

/// What kind of work the caller wants done.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Chat,
    Generation,
    Analysis,
}

impl TaskKind {
    /// Stable lowercase name, used in fingerprints and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Chat => "chat",
            TaskKind::Generation => "generation",
            TaskKind::Analysis => "analysis",
        }
    }
}

impl FromStr for TaskKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(TaskKind::Chat),
            "generation" => Ok(TaskKind::Generation),
            "analysis" => Ok(TaskKind::Analysis),
            other => Err(RequestError::UnknownTaskKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker role in a chat conversation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a chat conversation. Serializes to the `{role, content}`
/// shape the OpenAI-compatible wire format expects.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The request payload, tagged by task kind.
///
/// Each variant carries exactly the fields that task needs; adapters match
/// on the variant rather than inspecting a generic map.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskPayload {
    /// Multi-turn conversation.
    Chat { messages: Vec<ChatTurn> },
    /// One-shot text generation from a prompt.
    Generation { prompt: String },
    /// Analyze a body of text, optionally focused on one aspect.
    Analysis {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        focus: Option<String>,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Chat { .. } => TaskKind::Chat,
            TaskPayload::Generation { .. } => TaskKind::Generation,
            TaskPayload::Analysis { .. } => TaskKind::Analysis,
        }
    }

    /// Render the payload as chat turns for an OpenAI-compatible API.
    pub fn to_turns(&self) -> Vec<ChatTurn> {
        match self {
            TaskPayload::Chat { messages } => messages.clone(),
            TaskPayload::Generation { prompt } => vec![ChatTurn::user(prompt.clone())],
            TaskPayload::Analysis { content, focus } => {
                let instruction = match focus {
                    Some(focus) => format!("Analyze the following text, focusing on {focus}."),
                    None => "Analyze the following text.".to_string(),
                };
                vec![ChatTurn::system(instruction), ChatTurn::user(content.clone())]
            }
        }
    }

    /// Canonical text of the payload — the input to fingerprinting and to
    /// the input-token estimate. Role-prefixed so a user turn and a system
    /// turn with the same text do not collapse.
    pub fn canonical_text(&self) -> String {
        match self {
            TaskPayload::Chat { messages } => messages
                .iter()
                .map(|turn| format!("{:?}:{}", turn.role, turn.content))
                .collect::<Vec<_>>()
                .join("\n"),
            TaskPayload::Generation { prompt } => prompt.clone(),
            TaskPayload::Analysis { content, focus } => match focus {
                Some(focus) => format!("{focus}\n{content}"),
                None => content.clone(),
            },
        }
    }

    /// Rough input-token estimate (~4 chars per token). Only used to size
    /// budget reservations; measured usage is what gets committed.
    pub fn estimate_input_tokens(&self) -> u32 {
        let chars = self.canonical_text().chars().count() as u32;
        chars.div_ceil(4)
    }

    fn is_empty(&self) -> bool {
        match self {
            TaskPayload::Chat { messages } => {
                messages.is_empty() || messages.iter().all(|m| m.content.trim().is_empty())
            }
            TaskPayload::Generation { prompt } => prompt.trim().is_empty(),
            TaskPayload::Analysis { content, .. } => content.trim().is_empty(),
        }
    }
}

// ─────────────────────────────────────────────
// GenerateRequest
// ─────────────────────────────────────────────

/// A request to the gateway. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Opaque correlation token, echoed into every usage record.
    pub id: String,
    /// Who is asking — used for A/B assignment, never for cache keys.
    pub user_id: String,
    pub payload: TaskPayload,
    /// Free-form hints (e.g. "requires-realtime-data") matched against
    /// provider specialties during routing.
    #[serde(default)]
    pub context_hints: Vec<String>,
    /// Upper bound on generated tokens; also sizes the budget reservation.
    pub max_tokens: u32,
    pub created_at: DateTime<Utc>,
}

impl GenerateRequest {
    /// Create a request with a fresh correlation id.
    pub fn new(user_id: impl Into<String>, payload: TaskPayload, max_tokens: u32) -> Self {
        GenerateRequest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            payload,
            context_hints: Vec::new(),
            max_tokens,
            created_at: Utc::now(),
        }
    }

    pub fn with_hints(mut self, hints: Vec<String>) -> Self {
        self.context_hints = hints;
        self
    }

    /// Reject malformed caller input. This is the only condition the
    /// gateway surfaces as a hard error.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.user_id.trim().is_empty() {
            return Err(RequestError::Invalid("userId must not be empty".into()));
        }
        if self.payload.is_empty() {
            return Err(RequestError::Invalid(
                "payload must contain non-empty text".into(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(RequestError::Invalid("maxTokens must be positive".into()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// GenerateResponse
// ─────────────────────────────────────────────

/// What the caller receives. Always present — degradation is visible only
/// through `provider_used == "fallback"`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub content: String,
    /// Provider that actually served the request, or `"fallback"`.
    pub provider_used: String,
    /// Model that produced the content (empty for fallback responses).
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    /// Dollars actually committed against the budget for this response.
    pub cost: f64,
    pub latency_ms: u64,
    pub served_from_cache: bool,
}

// ─────────────────────────────────────────────
// Usage records
// ─────────────────────────────────────────────

/// Outcome of one provider attempt.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    BudgetRejected,
    CircuitOpen,
    AllProvidersExhausted,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failure => "failure",
            AttemptOutcome::BudgetRejected => "budget-rejected",
            AttemptOutcome::CircuitOpen => "circuit-open",
            AttemptOutcome::AllProvidersExhausted => "all-providers-exhausted",
        }
    }
}

/// Append-only record of one provider attempt. A single request can yield
/// several of these when it falls back across providers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub request_id: String,
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Record for an attempt that never reached the provider
    /// (circuit open, budget rejection, exhaustion).
    pub fn skipped(
        request_id: impl Into<String>,
        provider: impl Into<String>,
        outcome: AttemptOutcome,
    ) -> Self {
        UsageRecord {
            request_id: request_id.into(),
            provider: provider.into(),
            outcome,
            latency_ms: 0,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_kind_parse() {
        assert_eq!("chat".parse::<TaskKind>().unwrap(), TaskKind::Chat);
        assert_eq!("Analysis".parse::<TaskKind>().unwrap(), TaskKind::Analysis);
        assert!("summarize".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_payload_tagged_serialization() {
        let payload = TaskPayload::Generation {
            prompt: "write a haiku".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "generation");
        assert_eq!(json["prompt"], "write a haiku");
    }

    #[test]
    fn test_payload_chat_deserialization() {
        let json = json!({
            "kind": "chat",
            "messages": [
                {"role": "system", "content": "Be terse."},
                {"role": "user", "content": "Hello"}
            ]
        });
        let payload: TaskPayload = serde_json::from_value(json).unwrap();
        match payload {
            TaskPayload::Chat { messages } => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].role, Role::System);
                assert_eq!(messages[1].content, "Hello");
            }
            _ => panic!("expected chat payload"),
        }
    }

    #[test]
    fn test_payload_unknown_kind_rejected() {
        let json = json!({"kind": "summarize", "prompt": "x"});
        assert!(serde_json::from_value::<TaskPayload>(json).is_err());
    }

    #[test]
    fn test_generation_to_turns() {
        let payload = TaskPayload::Generation {
            prompt: "hello".to_string(),
        };
        let turns = payload.to_turns();
        assert_eq!(turns, vec![ChatTurn::user("hello")]);
    }

    #[test]
    fn test_analysis_to_turns_includes_focus() {
        let payload = TaskPayload::Analysis {
            content: "the text".to_string(),
            focus: Some("tone".to_string()),
        };
        let turns = payload.to_turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::System);
        assert!(turns[0].content.contains("tone"));
        assert_eq!(turns[1].content, "the text");
    }

    #[test]
    fn test_canonical_text_distinguishes_roles() {
        let a = TaskPayload::Chat {
            messages: vec![ChatTurn::user("same")],
        };
        let b = TaskPayload::Chat {
            messages: vec![ChatTurn::system("same")],
        };
        assert_ne!(a.canonical_text(), b.canonical_text());
    }

    #[test]
    fn test_estimate_input_tokens_rounds_up() {
        let payload = TaskPayload::Generation {
            prompt: "abcde".to_string(), // 5 chars → 2 tokens
        };
        assert_eq!(payload.estimate_input_tokens(), 2);
    }

    #[test]
    fn test_request_validation() {
        let ok = GenerateRequest::new(
            "user-1",
            TaskPayload::Generation {
                prompt: "hi".to_string(),
            },
            256,
        );
        assert!(ok.validate().is_ok());

        let empty_prompt = GenerateRequest::new(
            "user-1",
            TaskPayload::Generation {
                prompt: "   ".to_string(),
            },
            256,
        );
        assert!(empty_prompt.validate().is_err());

        let zero_tokens = GenerateRequest::new(
            "user-1",
            TaskPayload::Generation {
                prompt: "hi".to_string(),
            },
            0,
        );
        assert!(zero_tokens.validate().is_err());
    }

    #[test]
    fn test_empty_chat_rejected() {
        let request = GenerateRequest::new("u", TaskPayload::Chat { messages: vec![] }, 10);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let payload = TaskPayload::Generation {
            prompt: "x".to_string(),
        };
        let a = GenerateRequest::new("u", payload.clone(), 10);
        let b = GenerateRequest::new("u", payload, 10);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_outcome_kebab_case() {
        let json = serde_json::to_value(AttemptOutcome::BudgetRejected).unwrap();
        assert_eq!(json, "budget-rejected");
        let json = serde_json::to_value(AttemptOutcome::AllProvidersExhausted).unwrap();
        assert_eq!(json, "all-providers-exhausted");
    }

    #[test]
    fn test_skipped_record_is_free() {
        let record = UsageRecord::skipped("req-1", "alpha", AttemptOutcome::CircuitOpen);
        assert_eq!(record.cost, 0.0);
        assert_eq!(record.tokens_in, 0);
        assert_eq!(record.outcome, AttemptOutcome::CircuitOpen);
    }

    #[test]
    fn test_response_round_trip() {
        let response = GenerateResponse {
            content: "hello".to_string(),
            provider_used: "alpha".to_string(),
            model: "alpha-large".to_string(),
            tokens_in: 10,
            tokens_out: 5,
            cost: 0.0021,
            latency_ms: 180,
            served_from_cache: false,
        };
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.contains("providerUsed"));
        assert!(text.contains("servedFromCache"));
        let back: GenerateResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back, response);
    }
}
