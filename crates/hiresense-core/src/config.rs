//! Service configuration. Precedence: env `HIRESENSE__*` > file at `HIRESENSE_CONFIG`
//! (default `config/interview`, any format the `config` crate recognises) > defaults.

use crate::llm::{ChatEndpoint, LlmChain, GEMINI_OPENAI_BASE};
use crate::machine::{MachineConfig, RecordWindows};
use hiresense_voice::{env_key, non_empty_key, SpeechSettings, GROQ_OPENAI_BASE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewSettings {
    pub hr_required: u32,
    pub tech_required: u32,
    pub hr_max_attempts: u32,
    pub tech_max_attempts: u32,
    pub closing_max_rounds: u32,
    /// Ask for skills after the name (Intake quota becomes 2).
    pub ask_skills: bool,
    pub hr_questions_path: Option<String>,
    /// Pre-chunked reference corpus (JSON) for grounding questions and scoring. Unset: none.
    pub context_path: Option<String>,
    /// Passages retrieved per question or topic.
    pub context_top_k: usize,
    /// Technical topic when skills were not asked for.
    pub default_topic: String,
    pub name_record_secs: u64,
    pub skills_record_secs: u64,
    pub answer_record_secs: u64,
    pub closing_record_secs: u64,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        let machine = MachineConfig::default();
        Self {
            hr_required: machine.hr_required,
            tech_required: machine.tech_required,
            hr_max_attempts: machine.hr_max_attempts,
            tech_max_attempts: machine.tech_max_attempts,
            closing_max_rounds: machine.closing_max_rounds,
            ask_skills: machine.ask_skills,
            hr_questions_path: Some("data/hr_questions.json".to_string()),
            context_path: None,
            context_top_k: crate::context::DEFAULT_CONTEXT_TOP_K,
            default_topic: crate::answers::FALLBACK_SKILL.to_string(),
            name_record_secs: machine.record.name_secs,
            skills_record_secs: machine.record.skills_secs,
            answer_record_secs: machine.record.answer_secs,
            closing_record_secs: machine.record.closing_secs,
        }
    }
}

impl InterviewSettings {
    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            hr_required: self.hr_required,
            tech_required: self.tech_required,
            hr_max_attempts: self.hr_max_attempts.max(1),
            tech_max_attempts: self.tech_max_attempts.max(1),
            closing_max_rounds: self.closing_max_rounds.max(1),
            ask_skills: self.ask_skills,
            record: RecordWindows {
                name_secs: self.name_record_secs,
                skills_secs: self.skills_record_secs,
                answer_secs: self.answer_record_secs,
                closing_secs: self.closing_record_secs,
            },
        }
    }

    pub fn hr_questions_path(&self) -> Option<PathBuf> {
        configured_path(&self.hr_questions_path)
    }

    pub fn context_path(&self) -> Option<PathBuf> {
        configured_path(&self.context_path)
    }
}

fn configured_path(value: &Option<String>) -> Option<PathBuf> {
    value
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

/// Chat endpoints for the scorer and the technical question generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub timeout_secs: u64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            groq_model: "llama-3.3-70b-versatile".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ScoringSettings {
    pub fn with_env_fallbacks(mut self) -> Self {
        if non_empty_key(&self.groq_api_key).is_none() {
            self.groq_api_key = env_key(&["GROQ_API_KEY"]);
        }
        if non_empty_key(&self.gemini_api_key).is_none() {
            self.gemini_api_key = env_key(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
        }
        self
    }

    /// Groq → Gemini. Empty when neither key is set.
    pub fn build_chain(&self, label: &'static str) -> LlmChain {
        let timeout = Duration::from_secs(self.timeout_secs.max(1));
        let mut chain = LlmChain::new(label).with_timeout(timeout);
        let endpoints = [
            ("groq", GROQ_OPENAI_BASE, &self.groq_api_key, &self.groq_model),
            ("gemini", GEMINI_OPENAI_BASE, &self.gemini_api_key, &self.gemini_model),
        ];
        for (name, base, api_key, model) in endpoints {
            let Some(k) = non_empty_key(api_key) else {
                continue;
            };
            match ChatEndpoint::new(name, base, k, model.as_str(), timeout) {
                Ok(endpoint) => chain.push(Arc::new(endpoint), false),
                Err(e) => {
                    warn!(target: "hiresense::scoring", chain = label, endpoint = name, "chat endpoint skipped: {}", e)
                }
            }
        }
        info!(target: "hiresense::scoring", chain = label, endpoints = ?chain.names(), "chat chain ready");
        chain
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    pub host: String,
    pub port: u16,
    /// Sled directory for session history. Unset: `./data/hiresense/sessions`.
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Directory for the daily rolling log file. Unset: stdout only.
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub interview: InterviewSettings,
    #[serde(default)]
    pub speech: SpeechSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage_path: None,
            log_dir: None,
            interview: InterviewSettings::default(),
            speech: SpeechSettings::default(),
            scoring: ScoringSettings::default(),
        }
    }
}

impl InterviewConfig {
    /// Load from file and environment, then fill provider keys from their conventional
    /// variables (`GROQ_API_KEY`, `GEMINI_API_KEY`, `ELEVENLABS_API_KEY`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("HIRESENSE_CONFIG").unwrap_or_else(|_| "config/interview".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000_i64)?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("HIRESENSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: InterviewConfig = built.try_deserialize()?;
        cfg.speech = cfg.speech.with_env_fallbacks();
        cfg.scoring = cfg.scoring.with_env_fallbacks();
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
