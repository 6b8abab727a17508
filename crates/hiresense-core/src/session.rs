//! Session data model: stages, interactions, the live session, and its projections
//! (status snapshot for pollers, record/summary for the store).

use crate::error::{InterviewError, InterviewResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Interview phases in their fixed order. Ordering is derived, so `a < b` means `a` comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Intake,
    Hr,
    Technical,
    Closing,
    Done,
}

impl Stage {
    /// The stage after this one. `Done` is terminal and maps to itself.
    pub fn next(self) -> Stage {
        match self {
            Stage::Intake => Stage::Hr,
            Stage::Hr => Stage::Technical,
            Stage::Technical => Stage::Closing,
            Stage::Closing => Stage::Done,
            Stage::Done => Stage::Done,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Done
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Hr => "hr",
            Stage::Technical => "technical",
            Stage::Closing => "closing",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved question. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub stage: Stage,
    pub question: String,
    pub answer: String,
    /// `None` for unscored stages, skipped answers, and scorer failures.
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Candidate said "pass"; recorded but not counted toward the stage quota.
    #[serde(default)]
    pub skipped: bool,
    pub timestamp: DateTime<Utc>,
}

/// The live interview. Owned by the background loop; everyone else sees a `StatusSnapshot`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub candidate_name: Option<String>,
    pub skills: Vec<String>,
    pub interactions: Vec<Interaction>,
    pub stage: Stage,
    pub current_question: Option<String>,
    pub last_score: Option<f64>,
    pub avg_score: Option<f64>,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_name: None,
            skills: Vec::new(),
            interactions: Vec::new(),
            stage: Stage::Intake,
            current_question: None,
            last_score: None,
            avg_score: None,
            completed: false,
            started_at: Utc::now(),
        }
    }

    /// Move to `to`. Moving backwards is a defect.
    pub fn set_stage(&mut self, to: Stage) -> InterviewResult<()> {
        if to < self.stage {
            return Err(InterviewError::StageRegression {
                from: self.stage,
                to,
            });
        }
        self.stage = to;
        Ok(())
    }

    /// Append an interaction and refresh `last_score` / `avg_score` if it carries a score.
    pub fn push_interaction(&mut self, interaction: Interaction) {
        let score = interaction.score;
        self.interactions.push(interaction);
        if let Some(s) = score {
            self.last_score = Some(s);
            self.recompute_average();
        }
    }

    /// Mean over scored interactions only; `None` when nothing has been scored.
    pub fn recompute_average(&mut self) {
        let scores: Vec<f64> = self.interactions.iter().filter_map(|i| i.score).collect();
        self.avg_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };
    }

    pub fn display_name(&self) -> &str {
        self.candidate_name.as_deref().unwrap_or("Candidate")
    }

    pub fn snapshot(&self, is_running: bool) -> StatusSnapshot {
        StatusSnapshot {
            is_running,
            session_id: Some(self.id),
            name: self.candidate_name.clone(),
            stage: Some(self.stage),
            question: self.current_question.clone(),
            last_score: self.last_score,
            avg_score: self.avg_score,
            completed: self.completed,
            interactions_count: self.interactions.len(),
        }
    }

    pub fn to_record(&self, end_reason: EndReason) -> SessionRecord {
        SessionRecord {
            session_id: self.id,
            name: self.display_name().to_string(),
            skills: self.skills.clone(),
            interactions: self.interactions.clone(),
            avg_score: self.avg_score,
            final_stage: self.stage,
            end_reason,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// What pollers see. Copied out under the orchestrator lock; never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub session_id: Option<Uuid>,
    pub name: Option<String>,
    /// `None` before any session has started.
    pub stage: Option<Stage>,
    pub question: Option<String>,
    pub last_score: Option<f64>,
    pub avg_score: Option<f64>,
    pub completed: bool,
    pub interactions_count: usize,
}

impl StatusSnapshot {
    /// Snapshot reported before the first session.
    pub fn idle() -> Self {
        Self {
            is_running: false,
            session_id: None,
            name: None,
            stage: None,
            question: None,
            last_score: None,
            avg_score: None,
            completed: false,
            interactions_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Walked every stage to `Done`.
    Completed,
    /// Ended through `end()`.
    Cancelled,
    /// Terminated by an unexpected failure inside the loop.
    Defect,
}

/// Persisted form of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub interactions: Vec<Interaction>,
    pub avg_score: Option<f64>,
    pub final_stage: Stage,
    pub end_reason: EndReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            name: self.name.clone(),
            avg_score: self.avg_score,
            interactions_count: self.interactions.len(),
            timestamp: self.finished_at,
        }
    }
}

/// One history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub name: String,
    pub avg_score: Option<f64>,
    pub interactions_count: usize,
    pub timestamp: DateTime<Utc>,
}
