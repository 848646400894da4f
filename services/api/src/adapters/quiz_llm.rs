//! services/api/src/adapters/quiz_llm.rs
//!
//! This module contains the adapter for the quiz-writing LLM.
//! It implements the `QuizSynthesisService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"あなたは子供向けのクイズを作成する先生です。
以下の形式でクイズを作成してください：

クイズ：「[質問]」
A) [選択肢1]
B) [選択肢2]
C) [選択肢3]

正解は必ずA)にしてください。質問は子供が理解しやすい内容にしてください。"#;

const QUESTION_MARKERS: [&str; 3] = ["クイズ：", "クイズ:", "Quiz:"];

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use sugoroku_core::domain::QuizSpec;
use sugoroku_core::ports::{PortError, PortResult, QuizSynthesisService};
use tracing::{info, warn};

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z])[)）]\s*(.*)$").expect("option pattern is a valid regex")
});

/// Why a model reply could not be turned into a quiz.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QuizParseError {
    #[error("the reply has no lettered options")]
    NoOptions,
}

/// Parses a reply written in the instructed format.
///
/// Lines starting with a question marker give the question; lines such as
/// `A) ...` give the options in encounter order. The first option is the
/// correct one. Anything else is ignored. A reply without a question line
/// still yields a quiz, with an empty question.
pub fn parse_quiz_reply(reply: &str) -> Result<QuizSpec, QuizParseError> {
    let mut question = String::new();
    let mut options = Vec::new();

    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = QUESTION_MARKERS.iter().find_map(|m| line.strip_prefix(m)) {
            if question.is_empty() {
                question = rest.trim().to_string();
            }
        } else if let Some(caps) = OPTION_LINE.captures(line) {
            let text = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if !text.is_empty() {
                options.push(text.to_string());
            }
        }
    }

    if options.is_empty() {
        return Err(QuizParseError::NoOptions);
    }

    let correct_answer = options[0].clone();
    Ok(QuizSpec {
        question,
        options,
        correct_answer,
    })
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QuizSynthesisService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQuizAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiQuizAdapter {
    /// Creates a new `OpenAiQuizAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }
}

//=========================================================================================
// `QuizSynthesisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuizSynthesisService for OpenAiQuizAdapter {
    async fn synthesize(&self, topic: &str) -> PortResult<QuizSpec> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("「{}」についてのクイズを作成してください。", topic))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .max_tokens(200u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                PortError::Timeout(format!("Quiz generation exceeded {:?}", self.timeout))
            })?
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Quiz LLM response contained no text content.".to_string())
            })?;

        match parse_quiz_reply(&reply) {
            Ok(quiz) => {
                info!("Generated a {}-option quiz for '{}'", quiz.options.len(), topic);
                Ok(quiz)
            }
            Err(e) => {
                warn!("Quiz reply for '{}' was unusable ({}): {:?}", topic, e, reply);
                Ok(QuizSpec::empty())
            }
        }
    }
}
