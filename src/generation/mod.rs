//! Text-generation dependency used by nightly consolidation.
//!
//! The consolidator only needs "generate text given a prompt", so the model
//! runtime sits behind the [`TextGenerator`] trait. The provider is created
//! via [`create_generator`] from configuration.

pub mod ollama;

use anyhow::Result;

use crate::error::GenerationError;

/// Synchronous text generation.
///
/// Implementations must bound every call with a timeout. Callers in async
/// contexts should use `tokio::task::spawn_blocking`.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, context: Option<&str>) -> Result<String, GenerationError>;

    /// Model identifier, for logs and run records.
    fn model(&self) -> &str;
}

/// Create a text generator from config.
///
/// Must be called from inside a tokio runtime; the generator keeps a handle to it.
pub fn create_generator(config: &crate::config::GenerationConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "ollama" => {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|e| anyhow::anyhow!("text generation needs a tokio runtime: {e}"))?;
            let generator = ollama::OllamaGenerator::new(config, handle)?;
            Ok(Box::new(generator))
        }
        other => anyhow::bail!("unknown generation provider: {other}. Supported: ollama"),
    }
}

/// Remove `<think>...</think>` reasoning blocks from model output.
///
/// An unterminated `<think>` drops everything after it.
pub fn strip_think(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        match rest[start..].find(CLOSE) {
            Some(end) => rest = &rest[start + end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_think_removes_blocks() {
        assert_eq!(strip_think("<think>hmm</think>Answer"), "Answer");
        assert_eq!(strip_think("a <think>x</think> b <think>y</think> c"), "a  b  c");
        assert_eq!(strip_think("plain"), "plain");
    }

    #[test]
    fn strip_think_drops_unterminated_block() {
        assert_eq!(strip_think("Summary here.<think>still going"), "Summary here.");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = crate::config::GenerationConfig {
            provider: "openai".into(),
            ..Default::default()
        };
        let err = create_generator(&config).err().unwrap();
        assert!(err.to_string().contains("unknown generation provider"));
    }
}
