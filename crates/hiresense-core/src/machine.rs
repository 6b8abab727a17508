//! Interview state machine: which prompt comes next, what an answer does to the session,
//! and when a stage is over. No I/O; the orchestrator does the speaking, listening and scoring.

use crate::answers::{
    extract_name, extract_skills, has_no_more_questions, is_pass_answer, FALLBACK_NAME,
};
use crate::error::{InterviewError, InterviewResult};
use crate::questions::Question;
use crate::scoring::Evaluation;
use crate::session::{Interaction, Session, Stage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

pub const FOLLOW_UP_QUESTION: &str = "Anything else you'd like to ask?";
pub const HR_ACKNOWLEDGEMENT: &str = "Thank you for sharing that.";

/// Recording windows per prompt kind, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordWindows {
    pub name_secs: u64,
    pub skills_secs: u64,
    pub answer_secs: u64,
    pub closing_secs: u64,
}

impl Default for RecordWindows {
    fn default() -> Self {
        Self {
            name_secs: 5,
            skills_secs: 8,
            answer_secs: 25,
            closing_secs: 15,
        }
    }
}

/// Quotas and caps. Loaded as the `interview` section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub hr_required: u32,
    pub tech_required: u32,
    pub hr_max_attempts: u32,
    pub tech_max_attempts: u32,
    pub closing_max_rounds: u32,
    pub ask_skills: bool,
    pub record: RecordWindows,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            hr_required: 3,
            tech_required: 3,
            hr_max_attempts: 30,
            tech_max_attempts: 50,
            closing_max_rounds: 3,
            ask_skills: false,
            record: RecordWindows::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    Name,
    Skills,
    Hr,
    Technical,
    Closing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub stage: Stage,
    pub kind: PromptKind,
    pub text: String,
    pub ideal_answer: Option<String>,
    /// How long to record the reply.
    pub listen_for: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextPrompt {
    Ask(Prompt),
    /// The question buffer for this stage is empty; call `supply`.
    NeedQuestions(Stage),
    StageComplete,
}

/// What `record_answer` did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnswerOutcome {
    /// Counted toward the stage quota.
    pub counted: bool,
    pub skipped: bool,
    pub score: Option<f64>,
    /// Line to speak back to the candidate, if any.
    pub acknowledgement: Option<String>,
}

#[derive(Debug, Default)]
struct StageProgress {
    counted: u32,
    attempts: u32,
    buffer: VecDeque<Question>,
    closing_question: Option<String>,
    closing_done: bool,
}

pub struct InterviewMachine {
    config: MachineConfig,
    progress: StageProgress,
}

impl InterviewMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            progress: StageProgress::default(),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Answers counted toward the current stage's quota.
    pub fn counted(&self) -> u32 {
        self.progress.counted
    }

    /// Prompts answered in the current stage, passes included.
    pub fn attempts(&self) -> u32 {
        self.progress.attempts
    }

    fn window(&self, kind: PromptKind) -> Duration {
        let r = &self.config.record;
        Duration::from_secs(match kind {
            PromptKind::Name => r.name_secs,
            PromptKind::Skills => r.skills_secs,
            PromptKind::Hr | PromptKind::Technical => r.answer_secs,
            PromptKind::Closing => r.closing_secs,
        })
    }

    fn intake_quota(&self) -> u32 {
        if self.config.ask_skills {
            2
        } else {
            1
        }
    }

    fn prompt(&self, stage: Stage, kind: PromptKind, text: String, ideal: Option<String>) -> Prompt {
        Prompt {
            stage,
            kind,
            text,
            ideal_answer: ideal,
            listen_for: self.window(kind),
        }
    }

    fn buffered(&self, stage: Stage, kind: PromptKind, required: u32, cap: u32) -> NextPrompt {
        let p = &self.progress;
        if p.counted >= required || p.attempts >= cap {
            return NextPrompt::StageComplete;
        }
        match p.buffer.front() {
            Some(q) => NextPrompt::Ask(self.prompt(stage, kind, q.text.clone(), q.ideal_answer.clone())),
            None => NextPrompt::NeedQuestions(stage),
        }
    }

    pub fn next_prompt(&self, session: &Session) -> NextPrompt {
        match session.stage {
            Stage::Intake => match self.progress.counted {
                0 => NextPrompt::Ask(self.prompt(
                    Stage::Intake,
                    PromptKind::Name,
                    "To get started, could you please tell me your name?".to_string(),
                    None,
                )),
                1 if self.intake_quota() > 1 => NextPrompt::Ask(self.prompt(
                    Stage::Intake,
                    PromptKind::Skills,
                    "Which programming languages or technical subjects are you most comfortable with?"
                        .to_string(),
                    None,
                )),
                _ => NextPrompt::StageComplete,
            },
            Stage::Hr => self.buffered(
                Stage::Hr,
                PromptKind::Hr,
                self.config.hr_required,
                self.config.hr_max_attempts,
            ),
            Stage::Technical => self.buffered(
                Stage::Technical,
                PromptKind::Technical,
                self.config.tech_required,
                self.config.tech_max_attempts,
            ),
            Stage::Closing => {
                let p = &self.progress;
                if p.closing_done || p.attempts >= self.config.closing_max_rounds {
                    return NextPrompt::StageComplete;
                }
                if p.attempts > 0 {
                    return NextPrompt::Ask(self.prompt(
                        Stage::Closing,
                        PromptKind::Closing,
                        FOLLOW_UP_QUESTION.to_string(),
                        None,
                    ));
                }
                match &p.closing_question {
                    Some(q) => NextPrompt::Ask(self.prompt(
                        Stage::Closing,
                        PromptKind::Closing,
                        q.clone(),
                        None,
                    )),
                    None => NextPrompt::NeedQuestions(Stage::Closing),
                }
            }
            Stage::Done => NextPrompt::StageComplete,
        }
    }

    /// Refill the question buffer for `stage`. For Closing, the first question supplied
    /// becomes the closing question.
    pub fn supply(&mut self, session: &Session, stage: Stage, questions: Vec<Question>) -> InterviewResult<()> {
        if stage != session.stage {
            return Err(InterviewError::Invariant {
                stage: session.stage,
                detail: format!("questions supplied for {}", stage),
            });
        }
        if questions.is_empty() {
            return Err(InterviewError::Invariant {
                stage,
                detail: "empty question supply".to_string(),
            });
        }
        match stage {
            Stage::Hr | Stage::Technical => self.progress.buffer.extend(questions),
            Stage::Closing => {
                self.progress.closing_question = questions.into_iter().next().map(|q| q.text)
            }
            Stage::Intake | Stage::Done => {
                return Err(InterviewError::Invariant {
                    stage,
                    detail: "stage takes no supplied questions".to_string(),
                })
            }
        }
        Ok(())
    }

    /// Whether the orchestrator should call the scorer for this answer. Passes and empty
    /// answers are resolved here without it.
    pub fn needs_scoring(prompt: &Prompt, answer: &str) -> bool {
        prompt.kind == PromptKind::Technical && !answer.trim().is_empty() && !is_pass_answer(answer)
    }

    pub fn record_answer(
        &mut self,
        session: &mut Session,
        prompt: &Prompt,
        answer: &str,
        evaluation: Option<&Evaluation>,
    ) -> InterviewResult<AnswerOutcome> {
        if session.stage.is_terminal() {
            return Err(InterviewError::Invariant {
                stage: session.stage,
                detail: "record_answer on a finished session".to_string(),
            });
        }
        if prompt.stage != session.stage {
            return Err(InterviewError::Invariant {
                stage: session.stage,
                detail: format!("answer to a {} prompt", prompt.stage),
            });
        }
        let answer = answer.trim();
        let mut interaction = Interaction {
            stage: session.stage,
            question: prompt.text.clone(),
            answer: answer.to_string(),
            score: None,
            feedback: None,
            skipped: false,
            timestamp: Utc::now(),
        };
        let mut outcome = AnswerOutcome::default();

        match prompt.kind {
            PromptKind::Name => {
                let name = extract_name(answer).unwrap_or_else(|| FALLBACK_NAME.to_string());
                outcome.acknowledgement = Some(format!("Nice to meet you, {}.", name));
                session.candidate_name = Some(name);
                outcome.counted = true;
            }
            PromptKind::Skills => {
                let skills = extract_skills(answer);
                outcome.acknowledgement = Some(format!(
                    "Great. We'll cover {} in the technical round.",
                    skills.join(", ")
                ));
                session.skills = skills;
                outcome.counted = true;
            }
            PromptKind::Hr | PromptKind::Technical => {
                self.progress.attempts += 1;
                self.progress.buffer.pop_front();
                if is_pass_answer(answer) {
                    interaction.skipped = true;
                    outcome.skipped = true;
                    outcome.acknowledgement = Some("No problem, let's move on.".to_string());
                } else if prompt.kind == PromptKind::Hr {
                    outcome.counted = true;
                    outcome.acknowledgement = Some(HR_ACKNOWLEDGEMENT.to_string());
                } else {
                    outcome.counted = true;
                    let empty = Evaluation::no_answer();
                    let verdict = if answer.is_empty() { Some(&empty) } else { evaluation };
                    match verdict {
                        Some(e) => {
                            interaction.score = Some(e.score);
                            interaction.feedback = Some(e.feedback.clone());
                            outcome.score = Some(e.score);
                            outcome.acknowledgement = Some(score_line(e));
                        }
                        None => {
                            outcome.acknowledgement =
                                Some("Thank you. Let's continue with the next question.".to_string());
                        }
                    }
                }
            }
            PromptKind::Closing => {
                self.progress.attempts += 1;
                outcome.counted = true;
                if has_no_more_questions(answer) {
                    self.progress.closing_done = true;
                } else {
                    outcome.acknowledgement = Some(
                        "Thanks for asking. The hiring team will follow up with you on that."
                            .to_string(),
                    );
                }
            }
        }

        if outcome.counted {
            self.progress.counted += 1;
        }
        session.push_interaction(interaction);
        Ok(outcome)
    }

    /// Move to the next stage. Leaving Closing lands on Done and marks the session completed.
    pub fn advance(&mut self, session: &mut Session) -> InterviewResult<Stage> {
        if session.stage.is_terminal() {
            return Err(InterviewError::Invariant {
                stage: session.stage,
                detail: "advance on a finished session".to_string(),
            });
        }
        let next = session.stage.next();
        session.set_stage(next)?;
        session.current_question = None;
        self.progress = StageProgress::default();
        if next.is_terminal() {
            session.completed = true;
        }
        Ok(next)
    }
}

/// "For this question, your score is 72 out of 100. Good outline."
pub fn score_line(e: &Evaluation) -> String {
    let line = format!("For this question, your score is {} out of 100.", e.score as i64);
    if e.feedback.is_empty() {
        line
    } else {
        format!("{} {}", line, e.feedback)
    }
}

/// Opening line of the interview.
pub fn introduction() -> String {
    "Hello, and welcome to your HireSense interview. I'll ask you a few questions in \
     several short rounds. Please answer after each question; you can say pass to skip one."
        .to_string()
}

/// Spoken when a stage begins.
pub fn stage_intro(stage: Stage, session: &Session) -> Option<String> {
    match stage {
        Stage::Intake => None,
        Stage::Hr => Some(format!(
            "Thank you, {}. Let's begin with a few general questions about you.",
            session.display_name()
        )),
        Stage::Technical => Some("Now let's move on to the technical round.".to_string()),
        Stage::Closing => Some(summary_line(session)),
        Stage::Done => None,
    }
}

/// Technical round summary, spoken before Closing.
pub fn summary_line(session: &Session) -> String {
    match session.avg_score {
        Some(avg) => format!(
            "That concludes the technical round, {}. Your average score is {} out of 100.",
            session.display_name(),
            avg as i64
        ),
        None => format!(
            "That concludes the technical round, {}. I wasn't able to score your answers this time.",
            session.display_name()
        ),
    }
}

pub fn farewell(session: &Session) -> String {
    format!(
        "Thank you for your time, {}. This interview is now complete. Goodbye!",
        session.display_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(score: f64) -> Evaluation {
        Evaluation {
            score,
            feedback: "ok".into(),
            missing_points: vec![],
            reliability: None,
            grounded_in_context: false,
            reasoning: String::new(),
        }
    }

    fn ask(m: &InterviewMachine, s: &Session) -> Prompt {
        match m.next_prompt(s) {
            NextPrompt::Ask(p) => p,
            other => panic!("expected a prompt, got {:?}", other),
        }
    }

    fn qs(n: usize) -> Vec<Question> {
        (0..n).map(|i| Question::plain(format!("question {}", i))).collect()
    }

    #[test]
    fn intake_captures_name_then_completes() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        let p = ask(&m, &s);
        assert_eq!(p.kind, PromptKind::Name);
        assert_eq!(p.listen_for, Duration::from_secs(5));
        let out = m.record_answer(&mut s, &p, "my name is rahul", None).unwrap();
        assert_eq!(s.candidate_name.as_deref(), Some("Rahul"));
        assert_eq!(out.acknowledgement.as_deref(), Some("Nice to meet you, Rahul."));
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);
    }

    #[test]
    fn empty_name_falls_back_to_friend() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        let p = ask(&m, &s);
        m.record_answer(&mut s, &p, "", None).unwrap();
        assert_eq!(s.candidate_name.as_deref(), Some(FALLBACK_NAME));
    }

    #[test]
    fn intake_asks_skills_when_enabled() {
        let mut m = InterviewMachine::new(MachineConfig {
            ask_skills: true,
            ..MachineConfig::default()
        });
        let mut s = Session::new();
        let p = ask(&m, &s);
        m.record_answer(&mut s, &p, "I am Asha", None).unwrap();
        let p = ask(&m, &s);
        assert_eq!(p.kind, PromptKind::Skills);
        m.record_answer(&mut s, &p, "python and sql", None).unwrap();
        assert_eq!(s.skills, vec!["Python", "Databases"]);
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);
    }

    #[test]
    fn hr_needs_questions_and_pass_does_not_count() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        s.set_stage(Stage::Hr).unwrap();
        assert_eq!(m.next_prompt(&s), NextPrompt::NeedQuestions(Stage::Hr));
        m.supply(&s, Stage::Hr, qs(10)).unwrap();

        let p = ask(&m, &s);
        let out = m.record_answer(&mut s, &p, "pass", None).unwrap();
        assert!(out.skipped && !out.counted);
        assert!(s.interactions[0].skipped);

        for _ in 0..3 {
            let p = ask(&m, &s);
            let out = m.record_answer(&mut s, &p, "I enjoy teamwork", None).unwrap();
            assert_eq!(out.acknowledgement.as_deref(), Some(HR_ACKNOWLEDGEMENT));
        }
        assert_eq!(m.counted(), 3);
        assert_eq!(m.attempts(), 4);
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);
        assert!(s.interactions.iter().all(|i| i.score.is_none()));
    }

    #[test]
    fn empty_hr_answer_counts_unscored() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        s.set_stage(Stage::Hr).unwrap();
        m.supply(&s, Stage::Hr, qs(3)).unwrap();
        let p = ask(&m, &s);
        let out = m.record_answer(&mut s, &p, "   ", None).unwrap();
        assert!(out.counted);
        assert_eq!(s.interactions[0].score, None);
    }

    #[test]
    fn attempt_cap_ends_stage_with_quota_unmet() {
        let mut m = InterviewMachine::new(MachineConfig {
            hr_max_attempts: 2,
            ..MachineConfig::default()
        });
        let mut s = Session::new();
        s.set_stage(Stage::Hr).unwrap();
        m.supply(&s, Stage::Hr, qs(5)).unwrap();
        for _ in 0..2 {
            let p = ask(&m, &s);
            m.record_answer(&mut s, &p, "pass", None).unwrap();
        }
        assert_eq!(m.counted(), 0);
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);
    }

    #[test]
    fn technical_scores_average_and_failures() {
        let mut m = InterviewMachine::new(MachineConfig {
            tech_required: 4,
            ..MachineConfig::default()
        });
        let mut s = Session::new();
        s.set_stage(Stage::Technical).unwrap();
        m.supply(&s, Stage::Technical, qs(4)).unwrap();

        for score in [60.0, 80.0, 100.0] {
            let p = ask(&m, &s);
            assert!(InterviewMachine::needs_scoring(&p, "an answer"));
            let out = m.record_answer(&mut s, &p, "an answer", Some(&eval(score))).unwrap();
            assert_eq!(out.score, Some(score));
        }
        let p = ask(&m, &s);
        let out = m.record_answer(&mut s, &p, "an answer", None).unwrap();
        assert!(out.counted);
        assert_eq!(out.score, None);
        assert_eq!(s.avg_score, Some(80.0));
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);
    }

    #[test]
    fn empty_technical_answer_scores_zero_without_scorer() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        s.set_stage(Stage::Technical).unwrap();
        m.supply(&s, Stage::Technical, qs(3)).unwrap();
        let p = ask(&m, &s);
        assert!(!InterviewMachine::needs_scoring(&p, ""));
        let out = m.record_answer(&mut s, &p, "", Some(&eval(90.0))).unwrap();
        assert_eq!(out.score, Some(0.0));
        assert_eq!(s.avg_score, Some(0.0));
    }

    #[test]
    fn score_line_truncates() {
        let line = score_line(&Evaluation {
            score: 72.9,
            feedback: "Mention paging.".into(),
            missing_points: vec![],
            reliability: None,
            grounded_in_context: false,
            reasoning: String::new(),
        });
        assert_eq!(line, "For this question, your score is 72 out of 100. Mention paging.");
    }

    #[test]
    fn closing_follows_up_until_candidate_is_done() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        s.set_stage(Stage::Closing).unwrap();
        assert_eq!(m.next_prompt(&s), NextPrompt::NeedQuestions(Stage::Closing));
        m.supply(&s, Stage::Closing, vec![Question::plain("Any questions?")]).unwrap();

        let p = ask(&m, &s);
        assert_eq!(p.text, "Any questions?");
        m.record_answer(&mut s, &p, "What does the team build?", None).unwrap();
        let p = ask(&m, &s);
        assert_eq!(p.text, FOLLOW_UP_QUESTION);
        m.record_answer(&mut s, &p, "No, that's all", None).unwrap();
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);
    }

    #[test]
    fn closing_round_cap_and_silence() {
        let mut m = InterviewMachine::new(MachineConfig {
            closing_max_rounds: 2,
            ..MachineConfig::default()
        });
        let mut s = Session::new();
        s.set_stage(Stage::Closing).unwrap();
        m.supply(&s, Stage::Closing, vec![Question::plain("Any questions?")]).unwrap();
        for _ in 0..2 {
            let p = ask(&m, &s);
            m.record_answer(&mut s, &p, "What is the salary band?", None).unwrap();
        }
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);

        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        s.set_stage(Stage::Closing).unwrap();
        m.supply(&s, Stage::Closing, vec![Question::plain("Any questions?")]).unwrap();
        let p = ask(&m, &s);
        m.record_answer(&mut s, &p, "", None).unwrap();
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);
    }

    #[test]
    fn advance_walks_forward_and_done_is_terminal() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let mut s = Session::new();
        let mut seen = vec![s.stage];
        while !s.stage.is_terminal() {
            seen.push(m.advance(&mut s).unwrap());
        }
        assert_eq!(
            seen,
            vec![Stage::Intake, Stage::Hr, Stage::Technical, Stage::Closing, Stage::Done]
        );
        assert!(s.completed);
        assert!(matches!(m.advance(&mut s), Err(InterviewError::Invariant { .. })));
        assert_eq!(m.next_prompt(&s), NextPrompt::StageComplete);

        let p = Prompt {
            stage: Stage::Closing,
            kind: PromptKind::Closing,
            text: "x".into(),
            ideal_answer: None,
            listen_for: Duration::from_secs(1),
        };
        assert!(m.record_answer(&mut s, &p, "hi", None).is_err());
    }

    #[test]
    fn supply_for_wrong_stage_is_rejected() {
        let mut m = InterviewMachine::new(MachineConfig::default());
        let s = Session::new();
        assert!(m.supply(&s, Stage::Technical, qs(1)).is_err());
    }

    #[test]
    fn summary_mentions_integer_average() {
        let mut s = Session::new();
        s.candidate_name = Some("Asha".into());
        s.avg_score = Some(79.6);
        assert!(summary_line(&s).contains("average score is 79 out of 100"));
        s.avg_score = None;
        assert!(!summary_line(&s).contains("average score"));
    }
}
