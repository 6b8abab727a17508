//! hiresense-core: the interview itself (stages, questions, scoring, reference material,
//! history) and the single-session orchestrator that drives it over the speech chains in
//! `hiresense-voice`.
//!
//! Re-exports the public surface so the gateway only depends on the crate root.

pub mod answers;
mod config;
pub mod context;
mod error;
mod llm;
pub mod machine;
mod orchestrator;
pub mod questions;
pub mod scoring;
mod session;
pub mod store;

pub use config::{InterviewConfig, InterviewSettings, ScoringSettings};
pub use context::{ChunkIndex, ContextChunk, ContextSource, NoContext, DEFAULT_CONTEXT_TOP_K};
pub use error::{
    ContextError, InterviewError, InterviewResult, QuestionError, ScoringError, StoreError,
};
pub use llm::{extract_json_block, ChatEndpoint, LlmChain, LlmError, GEMINI_OPENAI_BASE};
pub use machine::{
    AnswerOutcome, InterviewMachine, MachineConfig, NextPrompt, Prompt, PromptKind, RecordWindows,
};
pub use orchestrator::{Components, InterviewOrchestrator, StartOutcome};
pub use questions::{
    fallback_question, HrQuestionBank, Question, QuestionSource, StandardQuestionSource,
    DEFAULT_CLOSING_QUESTION,
};
pub use scoring::{AnswerScorer, ChatScorer, Evaluation, ScoreRequest};
pub use session::{
    EndReason, Interaction, Session, SessionRecord, SessionSummary, Stage, StatusSnapshot,
};
pub use store::{
    MemorySessionStore, ResilientSessionStore, SessionStore, SledSessionStore, DEFAULT_STORE_PATH,
    HISTORY_LIMIT_MAX,
};
