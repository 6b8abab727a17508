//! Answer scoring. `ChatScorer` asks a chat model for a strict JSON verdict and reads it
//! back leniently; a scoring failure is always per-answer, never per-session.
//!
//! When a `ContextSource` is attached, passages relevant to the question go into the prompt
//! as reference material and the verdict reports whether the answer agrees with them.

use crate::context::{
    join_context, ContextSource, NoContext, DEFAULT_CONTEXT_TOP_K, SCORING_CONTEXT_CHARS,
};
use crate::error::ScoringError;
use crate::llm::{extract_json_block, LlmChain};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub question: String,
    pub ideal_answer: Option<String>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0–100.
    pub score: f64,
    pub feedback: String,
    #[serde(default)]
    pub missing_points: Vec<String>,
    /// Model's own confidence, 0–1, when it reports one.
    #[serde(default)]
    pub reliability: Option<f64>,
    /// Answer agrees with the reference material the scorer was given.
    #[serde(default)]
    pub grounded_in_context: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl Evaluation {
    /// Verdict for an empty answer; the scorer is not consulted.
    pub fn no_answer() -> Self {
        Self {
            score: 0.0,
            feedback: "No answer was given.".to_string(),
            missing_points: Vec::new(),
            reliability: None,
            grounded_in_context: false,
            reasoning: String::new(),
        }
    }
}

#[async_trait]
pub trait AnswerScorer: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> Result<Evaluation, ScoringError>;
}

const SCORING_SYSTEM_PROMPT: &str = "You are a strict but fair technical interviewer grading a spoken answer. \
The answer is a speech transcript, so ignore filler words and minor transcription errors. \
When reference material is given, treat it as ground truth and judge whether the answer agrees with it. \
Respond ONLY with a JSON object: \
{\"score\": <integer 0-100>, \"feedback\": \"<one or two sentences addressed to the candidate>\", \
\"missing_points\": [\"<key point not covered>\"], \"reliability\": <number 0-1>, \
\"grounded_in_context\": <true or false>, \"reasoning\": \"<how you decided the score>\"}";

/// Scorer backed by OpenAI-compatible chat endpoints (Groq, then Gemini).
pub struct ChatScorer {
    chain: Arc<LlmChain>,
    context: Arc<dyn ContextSource>,
    context_top_k: usize,
}

impl ChatScorer {
    pub fn new(chain: Arc<LlmChain>) -> Self {
        Self {
            chain,
            context: Arc::new(NoContext),
            context_top_k: DEFAULT_CONTEXT_TOP_K,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextSource>, top_k: usize) -> Self {
        self.context = context;
        self.context_top_k = top_k.max(1);
        self
    }

    fn user_prompt(request: &ScoreRequest, context: &str) -> String {
        let mut prompt = format!("Question: {}\n", request.question);
        if let Some(ideal) = request.ideal_answer.as_deref().filter(|s| !s.trim().is_empty()) {
            prompt.push_str(&format!("Reference answer: {}\n", ideal));
        }
        prompt.push_str(&format!("Candidate answer: {}\n", request.answer));
        if !context.trim().is_empty() {
            prompt.push_str(&format!("Reference material:\n\"\"\"{}\"\"\"\n", context));
        }
        prompt
    }
}

#[async_trait]
impl AnswerScorer for ChatScorer {
    async fn score(&self, request: &ScoreRequest) -> Result<Evaluation, ScoringError> {
        if self.chain.is_empty() {
            return Err(ScoringError::Unavailable);
        }
        let passages = self
            .context
            .relevant(&request.question, self.context_top_k)
            .await;
        let context = join_context(&passages, SCORING_CONTEXT_CHARS);
        let user = Self::user_prompt(request, &context);
        let done = self
            .chain
            .first_success(|endpoint| {
                let user = user.clone();
                async move { endpoint.complete(SCORING_SYSTEM_PROMPT, &user).await }
            })
            .await
            .map_err(|e| ScoringError::Request(e.to_string()))?;
        debug!(target: "hiresense::scoring", provider = %done.provider, passages = passages.len(), "verdict received");
        parse_verdict(&done.value)
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn verdict_from_json(v: &Value) -> Result<Evaluation, ScoringError> {
    let score = v
        .get("score")
        .and_then(number)
        .filter(|s| s.is_finite())
        .ok_or_else(|| ScoringError::Parse("verdict has no numeric score".to_string()))?;
    let text = |key: &str| {
        v.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };
    let missing_points = v
        .get("missing_points")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    // `reliability_score` is the 0–100 spelling some models fall back to.
    let reliability = v.get("reliability").and_then(number).or_else(|| {
        v.get("reliability_score")
            .and_then(number)
            .map(|r| if r > 1.0 { r / 100.0 } else { r })
    });
    Ok(Evaluation {
        score: score.clamp(0.0, 100.0),
        feedback: text("feedback"),
        missing_points,
        reliability: reliability.filter(|r| r.is_finite()).map(|r| r.clamp(0.0, 1.0)),
        grounded_in_context: v
            .get("grounded_in_context")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        reasoning: text("reasoning"),
    })
}

fn prose_score_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)score\s*:\s*(\d+)").expect("static regex"))
}

fn prose_feedback_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)feedback\s*:(.*)").expect("static regex"))
}

fn prose_missing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)missing points").expect("static regex"))
}

/// Plain-text verdict: `Score: N`, `Feedback: ...`, then `Missing points:` with `-`/`*` bullets.
fn verdict_from_prose(raw: &str) -> Option<Evaluation> {
    let score: f64 = prose_score_re().captures(raw)?.get(1)?.as_str().parse().ok()?;
    let rest = prose_feedback_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or("");
    let (feedback, bullets) = match prose_missing_re().find(rest) {
        Some(m) => {
            let bullets = rest[m.end()..].split_once('\n').map(|(_, b)| b).unwrap_or("");
            (rest[..m.start()].trim(), bullets)
        }
        None => (rest, ""),
    };
    let missing_points = bullets
        .lines()
        .map(str::trim)
        .filter_map(|l| l.strip_prefix('-').or_else(|| l.strip_prefix('*')))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    let feedback = if feedback.is_empty() {
        "Evaluation completed, but detailed feedback could not be parsed."
    } else {
        feedback
    };
    Some(Evaluation {
        score: score.clamp(0.0, 100.0),
        feedback: feedback.to_string(),
        missing_points,
        reliability: None,
        grounded_in_context: false,
        reasoning: String::new(),
    })
}

/// Read a verdict out of a model reply. Accepts fenced JSON, numeric strings, and a
/// missing `missing_points`; a reply with no usable JSON is read as a `Score:`/`Feedback:`
/// text verdict. The score is clamped into 0–100.
pub fn parse_verdict(raw: &str) -> Result<Evaluation, ScoringError> {
    let json_failure = match extract_json_block(raw, '{', '}') {
        Some(block) => match serde_json::from_str::<Value>(block) {
            Ok(v) => match verdict_from_json(&v) {
                Ok(evaluation) => return Ok(evaluation),
                Err(e) => e,
            },
            Err(e) => ScoringError::Parse(e.to_string()),
        },
        None => ScoringError::Parse("no JSON object in reply".to_string()),
    };
    verdict_from_prose(raw).ok_or(json_failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChunkIndex, ContextChunk};

    #[test]
    fn verdict_parses_from_fenced_reply() {
        let raw = "```json\n{\"score\": 72, \"feedback\": \"Good outline.\", \"missing_points\": [\"paging\"], \"reliability\": 0.8, \"grounded_in_context\": true, \"reasoning\": \"Covers segmentation only.\"}\n```";
        let e = parse_verdict(raw).unwrap();
        assert_eq!(e.score, 72.0);
        assert_eq!(e.feedback, "Good outline.");
        assert_eq!(e.missing_points, vec!["paging".to_string()]);
        assert_eq!(e.reliability, Some(0.8));
        assert!(e.grounded_in_context);
        assert_eq!(e.reasoning, "Covers segmentation only.");
    }

    #[test]
    fn score_is_clamped_and_strings_accepted() {
        assert_eq!(parse_verdict("{\"score\": 140}").unwrap().score, 100.0);
        assert_eq!(parse_verdict("{\"score\": -3}").unwrap().score, 0.0);
        assert_eq!(parse_verdict("{\"score\": \"85%\"}").unwrap().score, 85.0);
    }

    #[test]
    fn reliability_score_on_hundred_scale_is_normalized() {
        let e = parse_verdict("{\"score\": 60, \"reliability_score\": 90}").unwrap();
        assert_eq!(e.reliability, Some(0.9));
        assert!(!e.grounded_in_context);
        assert_eq!(e.reasoning, "");
    }

    #[test]
    fn text_verdict_is_read_when_no_json_is_present() {
        let e = parse_verdict(
            "Score: 72\nFeedback: Good outline of paging.\nMissing points:\n- TLB\n* page faults\nnot a bullet",
        )
        .unwrap();
        assert_eq!(e.score, 72.0);
        assert_eq!(e.feedback, "Good outline of paging.");
        assert_eq!(e.missing_points, vec!["TLB".to_string(), "page faults".to_string()]);
        assert_eq!(e.reliability, None);

        let bare = parse_verdict("score : 140").unwrap();
        assert_eq!(bare.score, 100.0);
        assert!(bare.missing_points.is_empty());
        assert!(!bare.feedback.is_empty());
    }

    #[test]
    fn unusable_replies_are_parse_errors() {
        assert!(matches!(parse_verdict("I cannot grade this."), Err(ScoringError::Parse(_))));
        assert!(matches!(
            parse_verdict("{\"feedback\": \"no number\"}"),
            Err(ScoringError::Parse(_))
        ));
    }

    #[test]
    fn prompt_includes_reference_and_context_only_when_present() {
        let mut req = ScoreRequest {
            question: "What is a deadlock?".into(),
            ideal_answer: None,
            answer: "Two threads waiting on each other.".into(),
        };
        let plain = ChatScorer::user_prompt(&req, "");
        assert!(!plain.contains("Reference answer"));
        assert!(!plain.contains("Reference material"));
        req.ideal_answer = Some("Circular wait on resources.".into());
        let grounded = ChatScorer::user_prompt(&req, "Deadlock needs circular wait.");
        assert!(grounded.contains("Reference answer: Circular wait"));
        assert!(grounded.contains("Reference material:\n\"\"\"Deadlock needs circular wait.\"\"\""));
    }

    #[tokio::test]
    async fn scorer_without_endpoints_is_unavailable() {
        let corpus = ChunkIndex::from_chunks(vec![ContextChunk {
            text: "Deadlock needs circular wait.".into(),
            source: "os.pdf".into(),
        }]);
        let scorer = ChatScorer::new(Arc::new(LlmChain::new("scoring")))
            .with_context(Arc::new(corpus), 4);
        let req = ScoreRequest {
            question: "q".into(),
            ideal_answer: None,
            answer: "a".into(),
        };
        assert!(matches!(scorer.score(&req).await, Err(ScoringError::Unavailable)));
    }
}
