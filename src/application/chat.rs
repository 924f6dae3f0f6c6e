use crate::infrastructure::error::InfraError;
use crate::infrastructure::inference_client::{ChatReply, InferenceClient};
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct ChatService<I>
where
    I: InferenceClient + ?Sized,
{
    inference_client: Arc<I>,
    conversation_id: Mutex<Option<String>>,
}

impl<I> ChatService<I>
where
    I: InferenceClient + ?Sized,
{
    pub fn new(inference_client: Arc<I>) -> Self {
        Self {
            inference_client,
            conversation_id: Mutex::new(None),
        }
    }

    pub fn with_conversation(self, conversation_id: Option<String>) -> Self {
        let conversation_id = conversation_id.filter(|value| !value.trim().is_empty());
        Self {
            conversation_id: Mutex::new(conversation_id),
            ..self
        }
    }

    pub fn conversation_id(&self) -> Result<Option<String>, InfraError> {
        Ok(self.lock_conversation()?.clone())
    }

    pub async fn send_message(&self, text: &str) -> Result<ChatReply, InfraError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(InfraError::InvalidInput("message must not be empty".to_string()));
        }

        let current = self.conversation_id()?;
        let reply = self.inference_client.chat(message, current.as_deref()).await?;

        // A reply without an id keeps the conversation we already had.
        if let Some(conversation_id) = reply.conversation_id.as_ref() {
            *self.lock_conversation()? = Some(conversation_id.clone());
        }
        info!(
            conversation_id = reply.conversation_id.as_deref().unwrap_or("-"),
            answer_chars = reply.answer.chars().count(),
            "chat reply received"
        );
        Ok(ChatReply {
            conversation_id: self.conversation_id()?,
            answer: reply.answer,
        })
    }

    pub fn reset_conversation(&self) -> Result<(), InfraError> {
        *self.lock_conversation()? = None;
        Ok(())
    }

    fn lock_conversation(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, InfraError> {
        self.conversation_id
            .lock()
            .map_err(|_| InfraError::Store("conversation lock poisoned".to_string()))
    }
}
