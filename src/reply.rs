//! Reply generation: tone classification and completion prompt assembly.

use regex::Regex;
use std::sync::Arc;
use tracing::warn;

use crate::openai::{ChatMessage, CompletionApi};

/// Sent when the completion API gives back nothing usable.
pub const FALLBACK_REPLY: &str = "我在這裡喔～";

const MAX_REPLY_CHARS: usize = 4000;

/// Substring match, deliberately loose: "debugging" should read as
/// technical just like "bug" does.
const TECH_PATTERN: &str = r"(?i)code|bug|error|linux|python|ipmi|api|docker|sql";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Technical,
    Companionable,
}

impl Tone {
    /// Role-framing system message for this profile.
    fn framing(&self) -> &'static str {
        match self {
            Tone::Technical => "你是溫柔但專業的工程師女友，精簡清楚地解決技術問題。",
            Tone::Companionable => "你是使用者的女友，溫柔、有溫度、黏黏的，不做作。",
        }
    }

    /// Style directive appended after the user's text.
    fn directive(&self) -> &'static str {
        match self {
            Tone::Technical => "回應要有具體指令或範例。",
            Tone::Companionable => "讓對方有被陪伴的感覺，像在耳邊輕聲說話。",
        }
    }
}

pub struct ReplyGenerator {
    completion: Arc<dyn CompletionApi>,
    tech_pattern: Regex,
}

impl ReplyGenerator {
    pub fn new(completion: Arc<dyn CompletionApi>) -> Self {
        Self {
            completion,
            tech_pattern: Regex::new(TECH_PATTERN).unwrap(),
        }
    }

    pub fn tone(&self, text: &str) -> Tone {
        if self.tech_pattern.is_match(text) {
            Tone::Technical
        } else {
            Tone::Companionable
        }
    }

    /// Produce a reply for `text`. Completion failures and empty results
    /// collapse into the fallback phrase; this never errors.
    pub async fn generate(&self, text: &str) -> String {
        let tone = self.tone(text);
        let messages = [
            ChatMessage::system(tone.framing()),
            ChatMessage::user(text),
            ChatMessage::system(tone.directive()),
        ];

        match self.completion.complete(&messages).await {
            Ok(Some(content)) => finalize(&content),
            Ok(None) => FALLBACK_REPLY.to_string(),
            Err(e) => {
                warn!("Completion request failed: {e}");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

/// Trim surrounding whitespace and cap the length; an effectively empty
/// completion falls back like a missing one.
fn finalize(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return FALLBACK_REPLY.to_string();
    }
    trimmed.chars().take(MAX_REPLY_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::{Error, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubCompletion {
        reply: Option<String>,
        fail: bool,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl StubCompletion {
        fn replying(reply: &str) -> Self {
            Self { reply: Some(reply.to_string()), fail: false, seen: Mutex::new(Vec::new()) }
        }

        fn empty() -> Self {
            Self { reply: None, fail: false, seen: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { reply: None, fail: true, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl CompletionApi for StubCompletion {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, Error> {
            self.seen.lock().unwrap().extend(messages.iter().cloned());
            if self.fail {
                return Err(Error::Api("503: overloaded".into()));
            }
            Ok(self.reply.clone())
        }
    }

    fn generator(stub: StubCompletion) -> (ReplyGenerator, Arc<StubCompletion>) {
        let stub = Arc::new(stub);
        (ReplyGenerator::new(stub.clone()), stub)
    }

    #[test]
    fn test_technical_keywords_select_technical_tone() {
        let (generator, _) = generator(StubCompletion::empty());
        assert_eq!(generator.tone("please fix this bug"), Tone::Technical);
        assert_eq!(generator.tone("my docker container died"), Tone::Technical);
        assert_eq!(generator.tone("SQL query is slow"), Tone::Technical);
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let (generator, _) = generator(StubCompletion::empty());
        assert_eq!(generator.tone("PYTHON won't start"), Tone::Technical);
        assert_eq!(generator.tone("Debugging all night"), Tone::Technical);
    }

    #[test]
    fn test_plain_text_selects_companionable_tone() {
        let (generator, _) = generator(StubCompletion::empty());
        assert_eq!(generator.tone("good morning"), Tone::Companionable);
        assert_eq!(generator.tone("我今天好累"), Tone::Companionable);
    }

    #[tokio::test]
    async fn test_generate_builds_three_part_prompt() {
        let (generator, stub) = generator(StubCompletion::replying("ok"));
        generator.generate("fix this bug").await;

        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].role, Role::System);
        assert_eq!(seen[0].content, Tone::Technical.framing());
        assert_eq!(seen[1].role, Role::User);
        assert_eq!(seen[1].content, "fix this bug");
        assert_eq!(seen[2].role, Role::System);
        assert_eq!(seen[2].content, Tone::Technical.directive());
    }

    #[tokio::test]
    async fn test_generate_trims_completion_text() {
        let (generator, _) = generator(StubCompletion::replying("  hello there \n"));
        assert_eq!(generator.generate("good morning").await, "hello there");
    }

    #[tokio::test]
    async fn test_generate_truncates_long_completions() {
        let (generator, _) = generator(StubCompletion::replying(&"雨".repeat(4200)));
        let reply = generator.generate("hi").await;
        assert_eq!(reply.chars().count(), 4000);
    }

    #[tokio::test]
    async fn test_empty_completion_falls_back() {
        let (generator, _) = generator(StubCompletion::empty());
        assert_eq!(generator.generate("hi").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_whitespace_completion_falls_back() {
        let (generator, _) = generator(StubCompletion::replying("   \n  "));
        assert_eq!(generator.generate("hi").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_completion_error_falls_back() {
        let (generator, _) = generator(StubCompletion::failing());
        assert_eq!(generator.generate("hi").await, FALLBACK_REPLY);
    }
}
