//! Reading meaning out of transcripts: pass/skip requests, the candidate's name, their
//! skills, and whether they have anything left to ask at the end.

use regex::Regex;
use std::sync::OnceLock;

/// Name used when nothing usable was heard.
pub const FALLBACK_NAME: &str = "Friend";
/// Skill reported when no known keyword was heard.
pub const FALLBACK_SKILL: &str = "general computer science";

fn pass_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*pass\b").expect("static regex"))
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:my name is|i am|i'm|this is)\s+([A-Za-z]+)").expect("static regex")
    })
}

fn done_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(no|nope|nothing|none|not really|that'?s (all|it)|i'?m good)\b")
            .expect("static regex")
    })
}

/// Candidate asked to skip: "pass this question", a leading "pass", or "sorry".
pub fn is_pass_answer(transcript: &str) -> bool {
    let t = transcript.to_lowercase();
    if t.trim().is_empty() {
        return false;
    }
    t.contains("pass this question") || pass_re().is_match(&t) || t.contains("sorry")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// "My name is rahul" → "Rahul". Falls back to the last purely alphabetic word, then `None`.
pub fn extract_name(transcript: &str) -> Option<String> {
    let t = transcript.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(caps) = name_re().captures(t) {
        return Some(title_case(&caps[1]));
    }
    t.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && w.chars().all(|c| c.is_alphabetic()))
        .last()
        .map(title_case)
}

/// Keyword table: (pattern over the lowercased transcript, canonical label).
fn skill_table() -> &'static [(Regex, &'static str)] {
    static TABLE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            (r"c\+\+|\bcpp\b", "C++"),
            (r"\bc\b", "C"),
            (r"\bjava\b", "Java"),
            (r"\bpython\b", "Python"),
            (r"\bjavascript\b|\bjs\b", "JavaScript"),
            (r"\bmern\b", "MERN"),
            (r"data structure|\bdsa\b|algorithm", "Data Structures and Algorithms"),
            (r"operating system|\bos\b", "Operating Systems"),
            (r"machine learning|\bml\b", "Machine Learning"),
            (r"deep learning|\bdl\b", "Deep Learning"),
            (r"database|\bsql\b|\bdbms\b", "Databases"),
        ]
        .into_iter()
        .map(|(p, label)| (Regex::new(p).expect("static regex"), label))
        .collect()
    })
}

/// Map spoken skills to canonical labels, in table order, without duplicates.
pub fn extract_skills(transcript: &str) -> Vec<String> {
    // "c++" would otherwise also satisfy the bare "c" pattern.
    let lowered = transcript.to_lowercase();
    let without_cpp = lowered.replace("c++", " cpp ");
    let mut skills: Vec<String> = Vec::new();
    for (re, label) in skill_table() {
        if re.is_match(&without_cpp) && !skills.iter().any(|s| s == label) {
            skills.push((*label).to_string());
        }
    }
    if skills.is_empty() {
        skills.push(FALLBACK_SKILL.to_string());
    }
    skills
}

/// End of the closing round: silence, or an explicit "no, that's all".
pub fn has_no_more_questions(transcript: &str) -> bool {
    let t = transcript.trim().to_lowercase();
    t.is_empty()
        || done_re().is_match(&t)
        || t.contains("no questions")
        || t.contains("no more questions")
}
