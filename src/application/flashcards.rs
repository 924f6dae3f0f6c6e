use crate::application::clock::Clock;
use crate::domain::models::FlashcardSet;
use crate::infrastructure::document_mapper::{
    assemble_flashcard_set, card_index, card_path, cards_collection, decode_card,
    decode_flashcard_set_summary, encode_card, encode_flashcard_set, flashcard_set_path,
    flashcard_sets_collection, new_user_fields, user_path, FIELD_FLASHCARDS_CREATED,
};
use crate::infrastructure::document_store::{DocumentStore, FieldUpdate};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::inference_client::{mime_type_for, FlashcardSource, InferenceClient};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

const DOCUMENT_TITLE: &str = "Document Flashcards";
const NOTES_TITLE: &str = "Notes Flashcards";
const DOCUMENT_KIND: &str = "document";
const TEXT_KIND: &str = "text";

pub struct FlashcardService<D, I>
where
    D: DocumentStore + ?Sized,
    I: InferenceClient + ?Sized,
{
    document_store: Arc<D>,
    inference_client: Arc<I>,
    user_id: String,
    clock: Clock,
    sets: Mutex<Vec<FlashcardSet>>,
}

impl<D, I> FlashcardService<D, I>
where
    D: DocumentStore + ?Sized,
    I: InferenceClient + ?Sized,
{
    pub fn new(document_store: Arc<D>, inference_client: Arc<I>, user_id: impl Into<String>) -> Self {
        Self {
            document_store,
            inference_client,
            user_id: user_id.into(),
            clock: Clock::default(),
            sets: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn sets(&self) -> Result<Vec<FlashcardSet>, InfraError> {
        Ok(self.lock_sets()?.clone())
    }

    pub async fn generate_from_file(
        &self,
        path: &Path,
        title: Option<&str>,
    ) -> Result<Option<FlashcardSet>, InfraError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .ok_or_else(|| InfraError::InvalidInput(format!("invalid file path '{}'", path.display())))?;
        let bytes = tokio::fs::read(path).await?;
        let source = FlashcardSource::File {
            file_name,
            mime_type: mime_type_for(path).to_string(),
            bytes,
        };
        self.generate(source, resolve_title(title, DOCUMENT_TITLE), DOCUMENT_KIND.to_string())
            .await
    }

    pub async fn generate_from_topic(
        &self,
        topic: &str,
        title: Option<&str>,
    ) -> Result<Option<FlashcardSet>, InfraError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(InfraError::InvalidInput("flashcard topic must not be empty".to_string()));
        }
        let default_title = format!("{} Flashcards", capitalize(topic));
        self.generate(
            FlashcardSource::Topic(topic.to_string()),
            resolve_title(title, &default_title),
            topic.to_string(),
        )
        .await
    }

    pub async fn generate_from_text(
        &self,
        text: &str,
        title: Option<&str>,
    ) -> Result<Option<FlashcardSet>, InfraError> {
        if text.trim().is_empty() {
            return Err(InfraError::InvalidInput("flashcard text must not be empty".to_string()));
        }
        self.generate(
            FlashcardSource::Text(text.to_string()),
            resolve_title(title, NOTES_TITLE),
            TEXT_KIND.to_string(),
        )
        .await
    }

    async fn generate(
        &self,
        source: FlashcardSource,
        title: String,
        kind: String,
    ) -> Result<Option<FlashcardSet>, InfraError> {
        let cards = self.inference_client.generate_flashcards(source).await?;
        if cards.is_empty() {
            info!(title = %title, "backend returned no flashcards; nothing stored");
            return Ok(None);
        }

        let set = FlashcardSet {
            id: Uuid::new_v4().to_string(),
            title,
            kind,
            cards,
            created_at: self.clock.now(),
        };
        set.validate()
            .map_err(|error| InfraError::MalformedResponse(format!("invalid flashcards: {error}")))?;

        self.document_store
            .set(&flashcard_set_path(&self.user_id, &set.id), encode_flashcard_set(&set)?)
            .await?;
        for (index, card) in set.cards.iter().enumerate() {
            self.document_store
                .set(&card_path(&self.user_id, &set.id, index), encode_card(card)?)
                .await?;
        }
        self.increment_created_counter().await?;

        info!(set_id = %set.id, cards = set.cards.len(), "flashcard set created");
        self.lock_sets()?.insert(0, set.clone());
        Ok(Some(set))
    }

    async fn increment_created_counter(&self) -> Result<(), InfraError> {
        let path = user_path(&self.user_id);
        let increment = vec![FieldUpdate::increment(FIELD_FLASHCARDS_CREATED, 1)];
        match self.document_store.update(&path, increment.clone()).await {
            Err(InfraError::NotFound(_)) => {
                warn!(user_id = %self.user_id, "user record missing; creating it before counting flashcards");
                self.document_store.set(&path, new_user_fields(&self.user_id)?).await?;
                self.document_store.update(&path, increment).await
            }
            other => other,
        }
    }

    /// Newest first. Sets or cards that fail to decode are skipped.
    pub async fn list_sets(&self) -> Result<Vec<FlashcardSet>, InfraError> {
        let documents = self
            .document_store
            .query(&flashcard_sets_collection(&self.user_id), Vec::new())
            .await?;

        let mut sets = Vec::with_capacity(documents.len());
        for document in &documents {
            let summary = match decode_flashcard_set_summary(document) {
                Ok(summary) => summary,
                Err(error) => {
                    warn!(path = %document.path, %error, "skipping malformed flashcard set");
                    continue;
                }
            };

            let card_documents = self
                .document_store
                .query(&cards_collection(&self.user_id, &summary.id), Vec::new())
                .await?;
            let mut indexed = Vec::with_capacity(card_documents.len());
            for card_document in &card_documents {
                match decode_card(card_document) {
                    Ok(card) => indexed.push((card_index(card_document).unwrap_or(usize::MAX), card)),
                    Err(error) => warn!(path = %card_document.path, %error, "skipping malformed flashcard"),
                }
            }
            indexed.sort_by_key(|(index, _)| *index);

            let cards = indexed.into_iter().map(|(_, card)| card).collect();
            sets.push(assemble_flashcard_set(summary, cards));
        }
        sets.sort_by(|left, right| right.created_at.cmp(&left.created_at));

        *self.lock_sets()? = sets.clone();
        Ok(sets)
    }

    /// Optimistic: the set leaves the visible list first and is restored at its
    /// old position when any delete fails.
    pub async fn delete_set(&self, set_id: &str) -> Result<(), InfraError> {
        let (position, removed) = {
            let mut sets = self.lock_sets()?;
            let position = sets
                .iter()
                .position(|set| set.id == set_id)
                .ok_or_else(|| InfraError::NotFound(format!("flashcard set {set_id}")))?;
            (position, sets.remove(position))
        };

        if let Err(error) = self.delete_documents(set_id).await {
            error!(set_id, %error, "deleting flashcard set failed; restoring it");
            let mut sets = self.lock_sets()?;
            let position = position.min(sets.len());
            sets.insert(position, removed);
            return Err(error);
        }
        info!(set_id, "flashcard set deleted");
        Ok(())
    }

    async fn delete_documents(&self, set_id: &str) -> Result<(), InfraError> {
        let cards = self
            .document_store
            .query(&cards_collection(&self.user_id, set_id), Vec::new())
            .await?;
        for card in cards {
            self.document_store.delete(&card.path).await?;
        }
        self.document_store
            .delete(&flashcard_set_path(&self.user_id, set_id))
            .await
    }

    fn lock_sets(&self) -> Result<MutexGuard<'_, Vec<FlashcardSet>>, InfraError> {
        self.sets
            .lock()
            .map_err(|error| InfraError::Store(format!("flashcard set lock poisoned: {error}")))
    }
}

fn resolve_title(title: Option<&str>, default_title: &str) -> String {
    title
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default_title)
        .to_string()
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
