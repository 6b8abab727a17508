//! Shared HTTP plumbing for the cloud speech providers.

use crate::error::{VoiceError, VoiceResult};
use serde::Deserialize;
use std::time::Duration;

pub(crate) const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";
pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GROQ_OPENAI_BASE: &str = "https://api.groq.com/openai/v1";

/// Client with a hard request timeout. The chain adds its own per-attempt timeout on top.
pub(crate) fn client(timeout: Duration) -> VoiceResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Turn a non-2xx response into an error carrying status and body; `wrap` picks the variant.
pub(crate) async fn check_status(
    res: reqwest::Response,
    wrap: fn(String) -> VoiceError,
) -> VoiceResult<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(wrap(format!("API error {}: {}", status, truncate(&body, 300))))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `models/{model}:generateContent` URL for the Gemini REST API.
pub(crate) fn gemini_generate_url(model: &str) -> String {
    format!("{}/models/{}:generateContent", GEMINI_API_BASE, model)
}

// Minimal view of a Gemini generateContent response.
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPart {
    pub text: Option<String>,
    pub inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiInlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

impl GeminiResponse {
    pub fn parts(&self) -> impl Iterator<Item = &GeminiPart> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated text parts, trimmed.
    pub fn text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string()
    }

    /// First inline audio payload (base64) and its mime type.
    pub fn first_inline(&self) -> Option<&GeminiInlineData> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":" hello "},{"text":"world "}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text(), "hello world");
        assert!(parsed.first_inline().is_none());
    }

    #[test]
    fn gemini_inline_audio_is_found() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"audio/L16;codec=pcm;rate=24000","data":"AAA="}}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        let inline = parsed.first_inline().unwrap();
        assert_eq!(inline.data, "AAA=");
        assert!(inline.mime_type.as_deref().unwrap().contains("pcm"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
