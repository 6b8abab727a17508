//! Session orchestrator: owns the single interview slot, runs the interview loop on a tokio
//! task, and publishes a status snapshot after every step.
//!
//! The slot lives behind a `std::sync::Mutex` that is only ever held for a copy or a swap,
//! never across `.await`. Each `start` bumps a generation counter; a loop may only publish
//! while its generation is current, so a loop that is still unwinding after `end` cannot
//! touch the next session's snapshot.

use crate::error::InterviewResult;
use crate::machine::{
    farewell, introduction, stage_intro, InterviewMachine, MachineConfig, NextPrompt, Prompt,
};
use crate::questions::{fallback_question, Question, QuestionSource};
use crate::scoring::{AnswerScorer, Evaluation, ScoreRequest};
use crate::session::{EndReason, Session, SessionSummary, Stage, StatusSnapshot};
use crate::store::SessionStore;
use futures::FutureExt;
use hiresense_voice::SpeechPipeline;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HR_BATCH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { session_id: Uuid },
    AlreadyRunning,
}

/// Everything the loop talks to.
pub struct Components {
    pub speech: Arc<SpeechPipeline>,
    pub scorer: Arc<dyn AnswerScorer>,
    pub questions: Arc<dyn QuestionSource>,
    pub store: Arc<dyn SessionStore>,
}

struct Slot {
    snapshot: StatusSnapshot,
    running: bool,
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    slot: Mutex<Slot>,
    components: Components,
    machine: MachineConfig,
    default_topic: String,
}

/// How the loop body ended when it did not fail.
enum Flow {
    Finished,
    Cancelled,
}

#[derive(Clone)]
pub struct InterviewOrchestrator {
    inner: Arc<Inner>,
}

impl InterviewOrchestrator {
    pub fn new(
        components: Components,
        machine: MachineConfig,
        default_topic: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    snapshot: StatusSnapshot::idle(),
                    running: false,
                    generation: 0,
                    cancel: None,
                    task: None,
                }),
                components,
                machine,
                default_topic: default_topic.into(),
            }),
        }
    }

    /// Start a session unless one is running. Returns at once; the interview runs in the
    /// background. Must be called inside a tokio runtime.
    pub fn start(&self) -> StartOutcome {
        let mut slot = self.inner.lock_slot();
        if slot.running {
            return StartOutcome::AlreadyRunning;
        }
        let session = Session::new();
        let session_id = session.id;
        slot.generation += 1;
        let generation = slot.generation;
        let token = CancellationToken::new();
        slot.running = true;
        slot.snapshot = session.snapshot(true);
        slot.cancel = Some(token.clone());
        slot.task = Some(tokio::spawn(run_session(
            Arc::clone(&self.inner),
            session,
            generation,
            token,
        )));
        info!(target: "hiresense::orchestrator", %session_id, generation, "interview session started");
        StartOutcome::Started { session_id }
    }

    pub fn get_status(&self) -> StatusSnapshot {
        self.inner.lock_slot().snapshot.clone()
    }

    /// Stop the running session. Safe to call any number of times; returns whether a
    /// session was running.
    pub fn end(&self) -> bool {
        let mut slot = self.inner.lock_slot();
        if let Some(token) = slot.cancel.take() {
            token.cancel();
        }
        if !slot.running {
            return false;
        }
        slot.running = false;
        slot.snapshot.is_running = false;
        slot.snapshot.completed = true;
        info!(target: "hiresense::orchestrator", session_id = ?slot.snapshot.session_id, "interview session ended by request");
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_slot().running
    }

    /// Most recent sessions first. Store failures are logged and read as empty history.
    pub async fn get_history(&self, limit: usize) -> Vec<SessionSummary> {
        let store = Arc::clone(&self.inner.components.store);
        match tokio::task::spawn_blocking(move || store.read_recent(limit)).await {
            Ok(Ok(records)) => records.iter().map(|r| r.summary()).collect(),
            Ok(Err(e)) => {
                warn!(target: "hiresense::orchestrator", "history read failed: {}", e);
                Vec::new()
            }
            Err(e) => {
                error!(target: "hiresense::orchestrator", "history task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Wait for the current background task (if any) to finish, including persistence.
    pub async fn wait_idle(&self) {
        let task = self.inner.lock_slot().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(target: "hiresense::orchestrator", "session task failed to join: {}", e);
            }
        }
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the snapshot if `generation` still owns a running slot.
    fn publish(&self, generation: u64, session: &Session) {
        let mut slot = self.lock_slot();
        if slot.generation == generation && slot.running {
            slot.snapshot = session.snapshot(true);
        } else {
            debug!(target: "hiresense::orchestrator", generation, current = slot.generation, "stale snapshot publish ignored");
        }
    }

    /// Mark the session completed and release the slot in one locked step, then persist.
    async fn finish(&self, session: &mut Session, generation: u64, reason: EndReason) {
        let record = {
            let mut slot = self.lock_slot();
            session.completed = true;
            if slot.generation == generation {
                slot.snapshot = session.snapshot(false);
                slot.running = false;
                slot.cancel = None;
            }
            session.to_record(reason)
        };
        let store = Arc::clone(&self.components.store);
        let session_id = record.session_id;
        match tokio::task::spawn_blocking(move || store.append(&record)).await {
            Ok(Ok(())) => {
                info!(target: "hiresense::orchestrator", %session_id, ?reason, "session record saved")
            }
            Ok(Err(e)) => {
                warn!(target: "hiresense::orchestrator", %session_id, "session record not saved: {}", e)
            }
            Err(e) => {
                error!(target: "hiresense::orchestrator", %session_id, "persistence task failed: {}", e)
            }
        }
    }

    fn topic(&self, session: &Session) -> String {
        if session.skills.is_empty() {
            self.default_topic.clone()
        } else {
            session.skills.join(", ")
        }
    }

    async fn fetch_questions(&self, stage: Stage, session: &Session) -> Vec<Question> {
        let source = &self.components.questions;
        if stage == Stage::Closing {
            return vec![Question::plain(source.closing_question())];
        }
        let topic = self.topic(session);
        let count = match stage {
            Stage::Technical => (self.machine.tech_required as usize).max(1) + 2,
            _ => HR_BATCH,
        };
        match source.questions(stage, &topic, count).await {
            Ok(qs) if !qs.is_empty() => qs,
            Ok(_) => {
                warn!(target: "hiresense::orchestrator", %stage, "question source returned nothing; using fallback question");
                vec![fallback_question(stage, &topic)]
            }
            Err(e) => {
                warn!(target: "hiresense::orchestrator", %stage, "question source failed ({}); using fallback question", e);
                vec![fallback_question(stage, &topic)]
            }
        }
    }

    async fn evaluate(&self, prompt: &Prompt, answer: &str) -> Option<Evaluation> {
        let request = ScoreRequest {
            question: prompt.text.clone(),
            ideal_answer: prompt.ideal_answer.clone(),
            answer: answer.to_string(),
        };
        match self.components.scorer.score(&request).await {
            Ok(evaluation) => {
                debug!(
                    target: "hiresense::orchestrator",
                    score = evaluation.score,
                    grounded = evaluation.grounded_in_context,
                    reasoning = %evaluation.reasoning,
                    "answer scored"
                );
                Some(evaluation)
            }
            Err(e) => {
                warn!(target: "hiresense::orchestrator", "scoring failed, answer left unscored: {}", e);
                None
            }
        }
    }
}

/// Resolve `fut` unless the token fires first.
async fn until_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

macro_rules! or_cancelled {
    ($token:expr, $fut:expr) => {
        match until_cancelled($token, $fut).await {
            Some(v) => v,
            None => return Ok(Flow::Cancelled),
        }
    };
}

async fn drive(
    inner: &Inner,
    session: &mut Session,
    generation: u64,
    token: &CancellationToken,
) -> InterviewResult<Flow> {
    let speech = &inner.components.speech;
    let mut machine = InterviewMachine::new(inner.machine.clone());

    or_cancelled!(token, speech.say(&introduction()));

    loop {
        if token.is_cancelled() {
            return Ok(Flow::Cancelled);
        }
        match machine.next_prompt(session) {
            NextPrompt::StageComplete => {
                let next = machine.advance(session)?;
                info!(target: "hiresense::orchestrator", session_id = %session.id, stage = %next, "stage advanced");
                if next.is_terminal() {
                    or_cancelled!(token, speech.say(&farewell(session)));
                    return Ok(Flow::Finished);
                }
                inner.publish(generation, session);
                if let Some(line) = stage_intro(next, session) {
                    or_cancelled!(token, speech.say(&line));
                }
            }
            NextPrompt::NeedQuestions(stage) => {
                let questions = or_cancelled!(token, inner.fetch_questions(stage, session));
                debug!(target: "hiresense::orchestrator", %stage, count = questions.len(), "questions supplied");
                machine.supply(session, stage, questions)?;
            }
            NextPrompt::Ask(prompt) => {
                session.current_question = Some(prompt.text.clone());
                inner.publish(generation, session);

                or_cancelled!(token, speech.say(&prompt.text));
                let audio = or_cancelled!(token, speech.record(prompt.listen_for));
                let answer = match audio {
                    Some(audio) => or_cancelled!(token, speech.stt().transcribe_or_empty(&audio)),
                    None => String::new(),
                };

                let evaluation = if InterviewMachine::needs_scoring(&prompt, &answer) {
                    or_cancelled!(token, inner.evaluate(&prompt, &answer))
                } else {
                    None
                };

                let outcome = machine.record_answer(session, &prompt, &answer, evaluation.as_ref())?;
                debug!(
                    target: "hiresense::orchestrator",
                    stage = %prompt.stage,
                    counted = outcome.counted,
                    skipped = outcome.skipped,
                    score = ?outcome.score,
                    "answer recorded"
                );
                inner.publish(generation, session);

                if let Some(ack) = outcome.acknowledgement {
                    or_cancelled!(token, speech.say(&ack));
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn run_session(
    inner: Arc<Inner>,
    mut session: Session,
    generation: u64,
    token: CancellationToken,
) {
    let session_id = session.id;
    let outcome = AssertUnwindSafe(drive(&inner, &mut session, generation, &token))
        .catch_unwind()
        .await;

    let reason = match outcome {
        Ok(Ok(Flow::Finished)) => {
            info!(target: "hiresense::orchestrator", %session_id, avg_score = ?session.avg_score, "interview completed");
            EndReason::Completed
        }
        Ok(Ok(Flow::Cancelled)) => {
            info!(target: "hiresense::orchestrator", %session_id, stage = %session.stage, "interview cancelled");
            EndReason::Cancelled
        }
        Ok(Err(e)) => {
            log_defect(&session, &e.to_string());
            EndReason::Defect
        }
        Err(payload) => {
            log_defect(&session, &format!("panic: {}", panic_message(payload.as_ref())));
            EndReason::Defect
        }
    };
    inner.finish(&mut session, generation, reason).await;
}

fn log_defect(session: &Session, detail: &str) {
    error!(
        target: "hiresense::orchestrator",
        session_id = %session.id,
        stage = %session.stage,
        interactions = session.interactions.len(),
        question = ?session.current_question,
        "interview loop failed, saving partial session: {}",
        detail
    );
}
