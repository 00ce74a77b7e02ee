use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Which pipeline stage a completion belongs to. Stage 1 needs a
/// vision-capable model; stage 2 only reformats text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analysis,
    Classification,
}

/// User turn content: plain text, or text plus an image reference.
#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    Text(String),
    TextWithImage { text: String, image_url: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
}

impl GenerationParams {
    pub fn analysis() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 1.0,
            stream: false,
        }
    }

    /// Low temperature: this stage only restates, so literal
    /// instruction-following matters more than variety.
    pub fn classification() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 100,
            top_p: 1.0,
            stream: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub stage: Stage,
    pub system_prompt: &'a str,
    pub user: &'a UserContent,
    pub params: GenerationParams,
}

/// A generative text backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, BackendError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    analysis_model: String,
    classification_model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageRef<'a> },
}

#[derive(Serialize)]
struct ImageRef<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
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

impl ChatCompletionsClient {
    pub fn new(
        base_url: String,
        api_key: String,
        analysis_model: String,
        classification_model: String,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            analysis_model,
            classification_model,
            client: reqwest::Client::new(),
        }
    }

    fn model_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::Analysis => &self.analysis_model,
            Stage::Classification => &self.classification_model,
        }
    }

    fn build_body<'a>(&'a self, request: &CompletionRequest<'a>) -> ChatRequest<'a> {
        let user_content = match request.user {
            UserContent::Text(text) => MessageContent::Text(text),
            UserContent::TextWithImage { text, image_url } => MessageContent::Parts(vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageRef { url: image_url },
                },
            ]),
        };

        ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(request.system_prompt),
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            model: self.model_for(request.stage),
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            top_p: request.params.top_p,
            stream: request.params.stream,
        }
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(BackendError::Unavailable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Protocol(format!("invalid response body: {}", e)))?;

        first_choice_content(chat_response)
    }
}

fn first_choice_content(response: ChatResponse) -> Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| BackendError::Protocol("missing choices[0].message.content".to_string()))
}
