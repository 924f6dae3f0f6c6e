use crate::domain::models::{validate_plan_set, DailyPlan, Flashcard};
use crate::infrastructure::config::BackendConfig;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

const CHAT_ENDPOINT: &str = "chat";
const WORKFLOW_ENDPOINT: &str = "workflow";
const STEP_FLASHCARD: &str = "flashcard";
const STEP_STUDY_PLANNER: &str = "study planner";
const SCHEMA_HEADER: &str = "X-Studyaid-Schema";
const FLASHCARD_SCHEMA_VERSION: &str = "1";
const TEXT_UPLOAD_NAME: &str = "notes.txt";
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashcardSource {
    File {
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
    Topic(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub conversation_id: Option<String>,
    pub answer: String,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn chat(&self, message: &str, conversation_id: Option<&str>) -> Result<ChatReply, InfraError>;

    async fn generate_flashcards(&self, source: FlashcardSource) -> Result<Vec<Flashcard>, InfraError>;

    async fn generate_study_plan(&self, prompt: &str) -> Result<Vec<DailyPlan>, InfraError>;
}

pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => DEFAULT_MIME_TYPE,
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestInferenceClient {
    client: Client,
    base_url: Url,
}

impl ReqwestInferenceClient {
    pub fn new(config: &BackendConfig) -> Result<Self, InfraError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| InfraError::Http(format!("failed building http client: {error}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("inference backend error: http {}", status.as_u16())
        } else {
            format!("inference backend error: http {}; body={body}", status.as_u16())
        };
        InfraError::Http(message)
    }

    fn endpoint(&self, path: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(path)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid endpoint '{path}': {error}")))
    }

    fn text_part(value: &str) -> Result<Part, InfraError> {
        Part::text(value.to_string())
            .mime_str("text/plain")
            .map_err(|error| InfraError::Http(format!("invalid multipart text part: {error}")))
    }

    fn file_part(file_name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<Part, InfraError> {
        Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|error| InfraError::Http(format!("invalid mime type '{mime_type}': {error}")))
    }

    async fn post_workflow(&self, form: Form, operation: &str) -> Result<String, InfraError> {
        let response = self
            .client
            .post(self.endpoint(WORKFLOW_ENDPOINT)?)
            .header(SCHEMA_HEADER, FLASHCARD_SCHEMA_VERSION)
            .multipart(form)
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while {operation}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading {operation} response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(body)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    user_message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    conversation_id: Option<String>,
    #[serde(default)]
    answer: String,
}

#[derive(Debug, Deserialize)]
struct FlashcardResponse {
    flashcards: Vec<Flashcard>,
}

#[derive(Debug, Deserialize)]
struct StudyPlanResponse {
    study_plan: Vec<DailyPlan>,
}

pub fn decode_chat_reply(body: &str) -> Result<ChatReply, InfraError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::MalformedResponse(format!("invalid chat payload: {error}; body={body}"))
    })?;
    Ok(ChatReply {
        conversation_id: parsed
            .conversation_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        answer: parsed.answer,
    })
}

pub fn decode_flashcards(body: &str) -> Result<Vec<Flashcard>, InfraError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|error| {
        InfraError::MalformedResponse(format!("invalid flashcard payload: {error}; body={body}"))
    })?;
    if value.get("flashcards").is_none() && value.get("cards").is_some() {
        return Err(InfraError::MalformedResponse(format!(
            "flashcard payload uses the retired 'cards' schema; expected schema {FLASHCARD_SCHEMA_VERSION}"
        )));
    }
    let parsed: FlashcardResponse = serde_json::from_value(value).map_err(|error| {
        InfraError::MalformedResponse(format!("invalid flashcard payload: {error}; body={body}"))
    })?;
    Ok(parsed
        .flashcards
        .into_iter()
        .filter(|card| !card.question.trim().is_empty())
        .collect())
}

pub fn decode_study_plan(body: &str) -> Result<Vec<DailyPlan>, InfraError> {
    let parsed: StudyPlanResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::MalformedResponse(format!("invalid study plan payload: {error}; body={body}"))
    })?;
    validate_plan_set(&parsed.study_plan)
        .map_err(|error| InfraError::MalformedResponse(format!("invalid study plan: {error}")))?;
    Ok(parsed.study_plan)
}

#[async_trait]
impl InferenceClient for ReqwestInferenceClient {
    async fn chat(&self, message: &str, conversation_id: Option<&str>) -> Result<ChatReply, InfraError> {
        Self::ensure_non_empty(message, "chat message")?;

        let request = ChatRequest {
            user_message: message.trim(),
            conversation_id: conversation_id.map(str::trim).filter(|value| !value.is_empty()),
        };
        let response = self
            .client
            .post(self.endpoint(CHAT_ENDPOINT)?)
            .json(&request)
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while chatting: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading chat response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        decode_chat_reply(&body)
    }

    async fn generate_flashcards(&self, source: FlashcardSource) -> Result<Vec<Flashcard>, InfraError> {
        let form = Form::new().part("step", Self::text_part(STEP_FLASHCARD)?);
        let form = match source {
            FlashcardSource::File {
                file_name,
                mime_type,
                bytes,
            } => {
                Self::ensure_non_empty(&file_name, "file name")?;
                if bytes.is_empty() {
                    return Err(InfraError::InvalidInput(format!("file '{file_name}' is empty")));
                }
                form.part("file", Self::file_part(&file_name, &mime_type, bytes)?)
            }
            FlashcardSource::Topic(topic) => {
                Self::ensure_non_empty(&topic, "flashcard topic")?;
                form.part("flashcard_type", Self::text_part(topic.trim())?)
            }
            FlashcardSource::Text(text) => {
                Self::ensure_non_empty(&text, "flashcard text")?;
                form.part(
                    "file",
                    Self::file_part(TEXT_UPLOAD_NAME, "text/plain", text.into_bytes())?,
                )
            }
        };

        let body = self.post_workflow(form, "generating flashcards").await?;
        decode_flashcards(&body)
    }

    async fn generate_study_plan(&self, prompt: &str) -> Result<Vec<DailyPlan>, InfraError> {
        Self::ensure_non_empty(prompt, "planner prompt")?;

        let form = Form::new()
            .part("step", Self::text_part(STEP_STUDY_PLANNER)?)
            .part("planner_prompt", Self::text_part(prompt.trim())?);
        let body = self.post_workflow(form, "generating study plan").await?;
        decode_study_plan(&body)
    }
}
