// completion providers - one system prompt + one user message in, text out

use crate::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anything that can turn a prompt into a reply.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    #[default]
    #[value(name = "openai")]
    OpenAI,
    Claude,
}

impl Provider {
    // env vars checked for the api key, in order
    fn key_vars(self) -> &'static [&'static str] {
        match self {
            Provider::OpenAI => &["OPENAI_API_KEY"],
            Provider::Claude => &["ANTHROPIC_API_KEY", "CLAUDE_API_KEY", "CLAUDE_KEY"],
        }
    }

    fn key_hint(self) -> String {
        match self.key_vars() {
            [only] => only.to_string(),
            vars => format!("one of: {}", vars.join(", ")),
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-3.5-turbo",
            Provider::Claude => "claude-sonnet-4-20250514",
        }
    }
}

/// The configured provider, picked once at startup.
pub enum Ai {
    OpenAI(OpenAI),
    Claude(Claude),
}

impl Ai {
    pub fn new(
        provider: Provider,
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, Error> {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .or_else(|| {
                provider
                    .key_vars()
                    .iter()
                    .filter_map(|var| std::env::var(var).ok())
                    .find(|k| !k.is_empty())
            })
            .ok_or_else(|| Error::MissingApiKey(provider.key_hint()))?;

        let model = model.unwrap_or_else(|| provider.default_model().to_string());

        Ok(match provider {
            Provider::OpenAI => Ai::OpenAI(OpenAI {
                client: reqwest::Client::new(),
                api_key,
                model,
                base_url: base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            }),
            Provider::Claude => Ai::Claude(Claude {
                client: reqwest::Client::new(),
                api_key,
                model,
            }),
        })
    }

    pub fn model(&self) -> &str {
        match self {
            Ai::OpenAI(ai) => &ai.model,
            Ai::Claude(ai) => &ai.model,
        }
    }
}

#[async_trait]
impl Completion for Ai {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error> {
        match self {
            Ai::OpenAI(ai) => ai.complete(system, user).await,
            Ai::Claude(ai) => ai.complete(system, user).await,
        }
    }
}

// openai chat completions

pub struct OpenAI {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl Completion for OpenAI {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(Error::Completion(error));
        }

        openai_text(&response.text().await?)
    }
}

fn openai_text(body: &str) -> Result<String, Error> {
    let response: ChatResponse = serde_json::from_str(body)?;
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    Ok(text)
}

// anthropic messages api

pub struct Claude {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Completion for Claude {
    async fn complete(&self, system: &str, user: &str) -> Result<String, Error> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 1024,
            system,
            messages: [ChatMessage {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(CLAUDE_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await?;
            return Err(Error::Completion(error));
        }

        claude_text(&response.text().await?)
    }
}

fn claude_text(body: &str) -> Result<String, Error> {
    let response: MessagesResponse = serde_json::from_str(body)?;
    let text = response
        .content
        .into_iter()
        .next()
        .map(|c| c.text)
        .unwrap_or_default();

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_openai_reply() {
        let body = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hi there!"}, "finish_reason": "stop"}
            ]
        }"#;
        assert_eq!(openai_text(body).unwrap(), "Hi there!");
    }

    #[test]
    fn openai_missing_content_reads_as_empty() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        assert_eq!(openai_text(body).unwrap(), "");
        assert_eq!(openai_text(r#"{"choices": []}"#).unwrap(), "");
    }

    #[test]
    fn malformed_reply_is_a_json_error() {
        assert!(matches!(openai_text("<html>"), Err(Error::Json(_))));
        assert!(matches!(claude_text(r#"{"nope": 1}"#), Err(Error::Json(_))));
    }

    #[test]
    fn reads_claude_reply() {
        let body = r#"{"content": [{"type": "text", "text": "Hello!"}], "stop_reason": "end_turn"}"#;
        assert_eq!(claude_text(body).unwrap(), "Hello!");
    }

    #[test]
    fn chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: "hello",
                },
            ],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant."},
                    {"role": "user", "content": "hello"}
                ]
            })
        );
    }

    #[test]
    fn key_hint_names_every_key_var() {
        assert_eq!(Provider::OpenAI.key_hint(), "OPENAI_API_KEY");

        let hint = Provider::Claude.key_hint();
        assert!(hint.starts_with("one of: "));
        for var in Provider::Claude.key_vars() {
            assert!(hint.contains(var), "{hint} is missing {var}");
        }
    }

    #[test]
    fn explicit_key_and_model_win() {
        let ai = Ai::new(
            Provider::OpenAI,
            Some("sk-test".into()),
            Some("gpt-4o-mini".into()),
            None,
        )
        .unwrap();
        assert_eq!(ai.model(), "gpt-4o-mini");

        let ai = Ai::new(Provider::Claude, Some("key".into()), None, None).unwrap();
        assert_eq!(ai.model(), "claude-sonnet-4-20250514");
    }
}
