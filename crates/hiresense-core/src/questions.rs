//! Question source: HR questions from a JSON bank, technical questions from the chat
//! generator (or a built-in bank), and the closing question.
//!
//! Bank format (`hr_questions.json`):
//!
//! ```json
//! { "categories": {
//!     "background": { "questions": ["Tell me about yourself.", "..."] },
//!     "salary_availability": { "questions": ["..."] },
//!     "final": { "questions": ["Do you have any questions for me?"] } } }
//! ```
//!
//! `salary_availability` and `final` never appear in the HR round; `final` supplies the
//! closing question.

use crate::context::{
    join_context, ContextSource, NoContext, DEFAULT_CONTEXT_TOP_K, GENERATION_CONTEXT_CHARS,
};
use crate::error::QuestionError;
use crate::llm::{extract_json_block, LlmChain};
use crate::session::Stage;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_CLOSING_QUESTION: &str =
    "Before we finish, do you have any questions for me or about this interview?";

const EXCLUDED_HR_CATEGORIES: [&str; 2] = ["salary_availability", "final"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(alias = "question")]
    pub text: String,
    /// Reference answer handed to the scorer for technical questions.
    #[serde(default)]
    pub ideal_answer: Option<String>,
}

impl Question {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ideal_answer: None,
        }
    }
}

/// Supplies stage-appropriate questions on demand.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Up to `count` questions for `stage`. `topic` is the candidate's skills summary.
    async fn questions(
        &self,
        stage: Stage,
        topic: &str,
        count: usize,
    ) -> Result<Vec<Question>, QuestionError>;

    fn closing_question(&self) -> String {
        DEFAULT_CLOSING_QUESTION.to_string()
    }
}

/// Used when the source errors or comes back empty.
pub fn fallback_question(stage: Stage, topic: &str) -> Question {
    match stage {
        Stage::Technical => Question::plain(format!(
            "Explain the following concept in detail: {}",
            topic
        )),
        Stage::Closing | Stage::Done => Question::plain(DEFAULT_CLOSING_QUESTION),
        Stage::Intake | Stage::Hr => {
            Question::plain("Tell me about yourself and what motivates you in your work.")
        }
    }
}

#[derive(Deserialize)]
struct BankFile {
    #[serde(default)]
    categories: BTreeMap<String, BankCategory>,
}

#[derive(Deserialize)]
struct BankCategory {
    #[serde(default)]
    questions: Vec<BankEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BankEntry {
    Text(String),
    Object { question: String },
}

impl BankEntry {
    fn into_text(self) -> String {
        match self {
            BankEntry::Text(t) => t,
            BankEntry::Object { question } => question,
        }
    }
}

/// HR questions plus the closing question, loaded once.
#[derive(Debug, Clone)]
pub struct HrQuestionBank {
    questions: Vec<String>,
    closing: Option<String>,
}

impl HrQuestionBank {
    pub fn from_json_str(raw: &str) -> Result<Self, QuestionError> {
        let file: BankFile = serde_json::from_str(raw)?;
        let mut questions = Vec::new();
        let mut closing = None;
        for (name, category) in file.categories {
            let texts: Vec<String> = category
                .questions
                .into_iter()
                .map(BankEntry::into_text)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if name == "final" {
                closing = texts.into_iter().next();
            } else if !EXCLUDED_HR_CATEGORIES.contains(&name.as_str()) {
                questions.extend(texts);
            }
        }
        if questions.is_empty() {
            return Err(QuestionError::Bank(
                "no HR questions left after filtering".to_string(),
            ));
        }
        Ok(Self { questions, closing })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuestionError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Load `path` if it exists and parses; otherwise the built-in bank.
    pub fn load_or_builtin(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };
        match Self::load(path) {
            Ok(bank) => {
                info!(target: "hiresense::questions", path = %path.display(), count = bank.len(), "HR question bank loaded");
                bank
            }
            Err(e) => {
                warn!(target: "hiresense::questions", path = %path.display(), "HR question bank unavailable ({}); using built-in questions", e);
                Self::builtin()
            }
        }
    }

    pub fn builtin() -> Self {
        Self {
            questions: [
                "Tell me about yourself.",
                "Why are you interested in this role?",
                "Describe a challenging project you worked on and how you handled it.",
                "Tell me about a time you disagreed with a teammate. How did you resolve it?",
                "What are your greatest strengths?",
                "What is one weakness you are actively working on?",
                "Where do you see yourself in five years?",
                "Describe a situation where you had to learn something new quickly.",
                "How do you prioritise when you have several deadlines at once?",
                "Tell me about a mistake you made and what you learned from it.",
                "What motivates you to do your best work?",
                "How do you handle feedback or criticism?",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            closing: None,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Shuffled selection of up to `n` questions.
    pub fn pick(&self, n: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        self.questions
            .choose_multiple(&mut rng, n.min(self.questions.len()))
            .cloned()
            .collect()
    }

    pub fn closing_question(&self) -> String {
        self.closing
            .clone()
            .unwrap_or_else(|| DEFAULT_CLOSING_QUESTION.to_string())
    }
}

/// Built-in technical questions keyed by the canonical skill labels from `answers::extract_skills`.
fn builtin_technical() -> Vec<(&'static str, Question)> {
    let q = |skill: &'static str, text: &str, ideal: &str| {
        (
            skill,
            Question {
                text: text.to_string(),
                ideal_answer: Some(ideal.to_string()),
            },
        )
    };
    vec![
        q("C", "What is the difference between a pointer and an array in C?",
          "An array is a contiguous block with fixed size whose name decays to a pointer to its first element; a pointer is a variable holding an address that can be reassigned and supports arithmetic. sizeof differs: array gives total bytes, pointer gives pointer size."),
        q("C++", "Explain RAII in C++ and why it matters.",
          "Resource Acquisition Is Initialization ties resource lifetime to object lifetime: acquire in the constructor, release in the destructor, so resources are freed deterministically even when exceptions unwind the stack."),
        q("Java", "How does garbage collection work in Java?",
          "The JVM tracks reachability from GC roots; unreachable objects are reclaimed. Generational collectors split heap into young and old generations, running frequent minor collections on the young generation and rarer major collections."),
        q("Python", "What is the Global Interpreter Lock in Python?",
          "The GIL is a mutex in CPython that allows only one thread to execute Python bytecode at a time, simplifying memory management but limiting CPU-bound multithreading; multiprocessing or native extensions work around it."),
        q("JavaScript", "Explain the JavaScript event loop.",
          "JavaScript runs on a single thread with a call stack; asynchronous callbacks are queued as tasks and microtasks. When the stack is empty the event loop drains microtasks (promises) first, then takes the next task."),
        q("MERN", "How do React, Express, Node and MongoDB fit together in a MERN application?",
          "React renders the client UI and calls HTTP APIs; Express on Node handles routing and business logic on the server; MongoDB stores JSON-like documents accessed through a driver or Mongoose."),
        q("Data Structures and Algorithms", "Compare a hash table with a balanced binary search tree.",
          "Hash tables give average O(1) insert and lookup but no ordering and O(n) worst case; balanced BSTs give O(log n) operations with sorted order and range queries."),
        q("Operating Systems", "What is the difference between a process and a thread?",
          "A process has its own address space and resources; threads are execution units within a process that share its memory and resources, making them cheaper to create and switch but requiring synchronization."),
        q("Operating Systems", "What is a deadlock and what conditions cause it?",
          "A deadlock is a set of processes each waiting for a resource held by another. It requires mutual exclusion, hold and wait, no preemption, and circular wait; breaking any one prevents it."),
        q("Machine Learning", "What is overfitting and how can you prevent it?",
          "Overfitting is when a model learns noise in the training data and generalizes poorly. Prevent it with more data, regularization, simpler models, cross-validation, early stopping, or dropout."),
        q("Deep Learning", "What problem does backpropagation solve?",
          "Backpropagation efficiently computes gradients of the loss with respect to every weight by applying the chain rule layer by layer from output to input, enabling gradient descent training."),
        q("Databases", "What is database normalization?",
          "Normalization organizes tables to reduce redundancy and update anomalies by splitting data into related tables following normal forms such as 1NF, 2NF and 3NF."),
        q("Databases", "Explain the ACID properties of a transaction.",
          "Atomicity: all or nothing. Consistency: constraints hold before and after. Isolation: concurrent transactions do not interfere. Durability: committed changes survive failures."),
        q("general computer science", "What happens when you type a URL into a browser and press enter?",
          "DNS resolves the host, the browser opens a TCP (and TLS) connection, sends an HTTP request, the server responds, and the browser parses HTML, fetches subresources and renders the page."),
        q("general computer science", "What is the difference between compiled and interpreted languages?",
          "Compiled languages are translated ahead of time to machine code; interpreted languages are executed by an interpreter at runtime, often via bytecode, trading startup and speed for portability and flexibility."),
        q("general computer science", "Explain Big-O notation with an example.",
          "Big-O describes how running time or space grows with input size in the worst case, ignoring constants. Linear search is O(n); binary search on a sorted array is O(log n)."),
    ]
}

/// HR from the bank, Technical from the generator with the built-in bank behind it.
pub struct StandardQuestionSource {
    hr: HrQuestionBank,
    generator: Option<Arc<LlmChain>>,
    context: Arc<dyn ContextSource>,
    context_top_k: usize,
}

impl StandardQuestionSource {
    pub fn new(hr: HrQuestionBank) -> Self {
        Self {
            hr,
            generator: None,
            context: Arc::new(NoContext),
            context_top_k: DEFAULT_CONTEXT_TOP_K,
        }
    }

    /// Ground generated technical questions in passages relevant to the topic.
    pub fn with_context(mut self, context: Arc<dyn ContextSource>, top_k: usize) -> Self {
        self.context = context;
        self.context_top_k = top_k.max(1);
        self
    }

    pub fn with_generator(mut self, generator: Arc<LlmChain>) -> Self {
        if !generator.is_empty() {
            self.generator = Some(generator);
        }
        self
    }

    fn builtin_for(topic: &str, count: usize) -> Vec<Question> {
        let topic_lc = topic.to_lowercase();
        let all = builtin_technical();
        let mut matching: Vec<Question> = all
            .iter()
            .filter(|(skill, _)| {
                topic_lc
                    .split(',')
                    .map(str::trim)
                    .any(|t| t == skill.to_lowercase())
            })
            .map(|(_, q)| q.clone())
            .collect();
        if matching.is_empty() {
            matching = all
                .into_iter()
                .filter(|(skill, _)| *skill == "general computer science")
                .map(|(_, q)| q)
                .collect();
        }
        let mut rng = rand::thread_rng();
        matching.shuffle(&mut rng);
        matching.truncate(count);
        matching
    }

    async fn generate(
        &self,
        chain: &LlmChain,
        topic: &str,
        count: usize,
    ) -> Result<Vec<Question>, QuestionError> {
        let system = "You are a technical interviewer. Respond ONLY with a JSON array. \
            Each element is an object with keys \"question\" and \"ideal_answer\". \
            Questions must be answerable verbally in under a minute.";
        let passages = self.context.relevant(topic, self.context_top_k).await;
        let user = generation_prompt(topic, count, &join_context(&passages, GENERATION_CONTEXT_CHARS));
        let done = chain
            .first_success(|endpoint| {
                let user = user.clone();
                async move { endpoint.complete(system, &user).await }
            })
            .await
            .map_err(|e| QuestionError::Generation(e.to_string()))?;
        parse_generated(&done.value)
    }
}

fn generation_prompt(topic: &str, count: usize, context: &str) -> String {
    let mut prompt = format!(
        "Generate {} distinct technical interview questions for a candidate comfortable with: {}.",
        count, topic
    );
    if !context.trim().is_empty() {
        prompt.push_str(&format!(
            "\nUse ONLY the reference material below; do not introduce topics it does not cover.\n\
             Reference material:\n\"\"\"{}\"\"\"",
            context
        ));
    }
    prompt
}

/// Parse a generated JSON array of `{question, ideal_answer}`.
pub fn parse_generated(raw: &str) -> Result<Vec<Question>, QuestionError> {
    let block = extract_json_block(raw, '[', ']')
        .ok_or_else(|| QuestionError::Generation("no JSON array in completion".to_string()))?;
    let questions: Vec<Question> = serde_json::from_str(block)?;
    let questions: Vec<Question> = questions
        .into_iter()
        .filter(|q| !q.text.trim().is_empty())
        .collect();
    if questions.is_empty() {
        return Err(QuestionError::Generation("generator returned no questions".to_string()));
    }
    Ok(questions)
}

#[async_trait]
impl QuestionSource for StandardQuestionSource {
    async fn questions(
        &self,
        stage: Stage,
        topic: &str,
        count: usize,
    ) -> Result<Vec<Question>, QuestionError> {
        match stage {
            Stage::Hr => Ok(self.hr.pick(count).into_iter().map(Question::plain).collect()),
            Stage::Technical => {
                if let Some(chain) = &self.generator {
                    match self.generate(chain, topic, count).await {
                        Ok(qs) => return Ok(qs),
                        Err(e) => {
                            warn!(target: "hiresense::questions", "technical question generation failed ({}); using built-in bank", e)
                        }
                    }
                }
                Ok(Self::builtin_for(topic, count))
            }
            other => Err(QuestionError::Bank(format!(
                "stage {} has no question pool",
                other
            ))),
        }
    }

    fn closing_question(&self) -> String {
        self.hr.closing_question()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
        "categories": {
            "background": { "questions": ["Tell me about yourself.", {"question": "Why this field?"}] },
            "teamwork": { "questions": ["Describe a conflict."] },
            "salary_availability": { "questions": ["What salary do you expect?"] },
            "final": { "questions": ["Any questions for us?"] }
        }
    }"#;

    #[test]
    fn bank_excludes_salary_and_final() {
        let bank = HrQuestionBank::from_json_str(BANK).unwrap();
        assert_eq!(bank.len(), 3);
        let picked = bank.pick(10);
        assert_eq!(picked.len(), 3);
        assert!(!picked.iter().any(|q| q.contains("salary")));
        assert!(!picked.iter().any(|q| q.contains("Any questions")));
        assert_eq!(bank.closing_question(), "Any questions for us?");
    }

    #[test]
    fn bank_with_only_excluded_categories_is_an_error() {
        let raw = r#"{"categories": {"final": {"questions": ["Questions?"]}}}"#;
        assert!(HrQuestionBank::from_json_str(raw).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let bank = HrQuestionBank::load_or_builtin(Some(Path::new("/definitely/not/here.json")));
        assert!(bank.len() >= 10);
        assert_eq!(bank.closing_question(), DEFAULT_CLOSING_QUESTION);
    }

    #[test]
    fn generated_questions_parse_from_fenced_output() {
        let raw = "```json\n[{\"question\": \"What is a mutex?\", \"ideal_answer\": \"A lock.\"}, {\"question\": \" \"}]\n```";
        let qs = parse_generated(raw).unwrap();
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].text, "What is a mutex?");
        assert_eq!(qs[0].ideal_answer.as_deref(), Some("A lock."));
        assert!(parse_generated("sorry, cannot help").is_err());
    }

    #[test]
    fn fallback_questions_per_stage() {
        assert_eq!(
            fallback_question(Stage::Technical, "Operating Systems").text,
            "Explain the following concept in detail: Operating Systems"
        );
        assert_eq!(fallback_question(Stage::Closing, "").text, DEFAULT_CLOSING_QUESTION);
    }

    #[tokio::test]
    async fn technical_questions_follow_topic_without_generator() {
        let source = StandardQuestionSource::new(HrQuestionBank::builtin());
        let qs = source
            .questions(Stage::Technical, "Operating Systems, Databases", 10)
            .await
            .unwrap();
        assert_eq!(qs.len(), 4);
        assert!(qs.iter().all(|q| q.ideal_answer.is_some()));

        let general = source.questions(Stage::Technical, "knitting", 2).await.unwrap();
        assert_eq!(general.len(), 2);
    }

    #[test]
    fn generation_prompt_carries_reference_material() {
        let plain = generation_prompt("Operating Systems", 5, "");
        assert!(plain.starts_with("Generate 5 distinct"));
        assert!(!plain.contains("Reference material"));

        let grounded = generation_prompt("Operating Systems", 5, "Paging uses a TLB.");
        assert!(grounded.contains("Use ONLY the reference material"));
        assert!(grounded.ends_with("\"\"\"Paging uses a TLB.\"\"\""));
    }

    #[tokio::test]
    async fn context_without_generator_keeps_builtin_questions() {
        let corpus = crate::context::ChunkIndex::from_chunks(vec![crate::context::ContextChunk {
            text: "Paging splits memory into pages.".into(),
            source: "os.pdf".into(),
        }]);
        let source = StandardQuestionSource::new(HrQuestionBank::builtin())
            .with_context(Arc::new(corpus), 4);
        let qs = source.questions(Stage::Technical, "Operating Systems", 2).await.unwrap();
        assert_eq!(qs.len(), 2);
    }

    #[tokio::test]
    async fn intake_has_no_pool() {
        let source = StandardQuestionSource::new(HrQuestionBank::builtin());
        assert!(source.questions(Stage::Intake, "", 3).await.is_err());
        let hr = source.questions(Stage::Hr, "", 3).await.unwrap();
        assert_eq!(hr.len(), 3);
    }
}
