use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub fields: Fields,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        lookup_field(&self.fields, name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(String, Value),
    Increment(String, i64),
    ArrayUnion(String, Value),
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Set(field.into(), value.into())
    }

    pub fn increment(field: impl Into<String>, delta: i64) -> Self {
        Self::Increment(field.into(), delta)
    }

    pub fn array_union(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::ArrayUnion(field.into(), value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Numbers compare numerically, strings lexically. Mixed types never match.
    Gte(String, Value),
}

impl Filter {
    fn matches(&self, fields: &Fields) -> bool {
        match self {
            Self::Eq(field, expected) => lookup_field(fields, field) == Some(expected),
            Self::Gte(field, bound) => lookup_field(fields, field)
                .and_then(|actual| compare_values(actual, bound))
                .is_some_and(|ordering| ordering != Ordering::Less),
        }
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Document>, InfraError>;
    async fn set(&self, path: &str, fields: Fields) -> Result<(), InfraError>;
    /// Fails with `NotFound` when the document does not exist.
    async fn update(&self, path: &str, updates: Vec<FieldUpdate>) -> Result<(), InfraError>;
    async fn delete(&self, path: &str) -> Result<(), InfraError>;
    /// Documents directly inside `collection`, ordered by path.
    async fn query(&self, collection: &str, filters: Vec<Filter>) -> Result<Vec<Document>, InfraError>;
}

pub fn join_path(segments: &[&str]) -> String {
    segments.join("/")
}

fn normalize_path(path: &str) -> Result<String, InfraError> {
    let segments: Vec<&str> = path.trim().trim_matches('/').split('/').collect();
    if segments.iter().any(|segment| segment.trim().is_empty()) {
        return Err(InfraError::InvalidInput(format!("invalid document path '{path}'")));
    }
    if segments.len() % 2 != 0 {
        return Err(InfraError::InvalidInput(format!(
            "document path '{path}' must alternate collection and document segments"
        )));
    }
    Ok(segments.join("/"))
}

fn collection_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(collection, _)| collection).unwrap_or("")
}

fn normalize_collection(collection: &str) -> Result<String, InfraError> {
    let trimmed = collection.trim().trim_matches('/');
    if trimmed.is_empty() || trimmed.split('/').count() % 2 != 1 {
        return Err(InfraError::InvalidInput(format!("invalid collection path '{collection}'")));
    }
    Ok(trimmed.to_string())
}

fn lookup_field<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    let mut segments = name.split('.');
    let first = segments.next()?;
    let mut current = fields.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn field_slot<'a>(fields: &'a mut Fields, name: &str) -> Result<&'a mut Value, InfraError> {
    let segments: Vec<&str> = name.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(InfraError::InvalidInput(format!("invalid field name '{name}'")));
    }
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| InfraError::InvalidInput("field name must not be empty".to_string()))?;

    let mut current = fields;
    for parent in parents {
        let entry = current
            .entry(parent.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry
            .as_object_mut()
            .ok_or_else(|| InfraError::Store(format!("field '{parent}' is not an object")))?;
    }
    Ok(current.entry(last.to_string()).or_insert(Value::Null))
}

pub fn apply_updates(fields: &mut Fields, updates: Vec<FieldUpdate>) -> Result<(), InfraError> {
    for update in updates {
        match update {
            FieldUpdate::Set(name, value) => {
                *field_slot(fields, &name)? = value;
            }
            FieldUpdate::Increment(name, delta) => {
                let slot = field_slot(fields, &name)?;
                let next = match &*slot {
                    Value::Null => Value::from(delta),
                    Value::Number(number) => match number.as_i64() {
                        Some(current) => Value::from(current.saturating_add(delta)),
                        None => Value::from(number.as_f64().unwrap_or(0.0) + delta as f64),
                    },
                    other => {
                        return Err(InfraError::InvalidInput(format!(
                            "cannot increment non-numeric field '{name}': {other}"
                        )));
                    }
                };
                *slot = next;
            }
            FieldUpdate::ArrayUnion(name, value) => {
                let slot = field_slot(fields, &name)?;
                if slot.is_null() {
                    *slot = Value::Array(Vec::new());
                }
                let items = slot.as_array_mut().ok_or_else(|| {
                    InfraError::InvalidInput(format!("cannot union into non-array field '{name}'"))
                })?;
                if !items.contains(&value) {
                    items.push(value);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<BTreeMap<String, Fields>>,
}

impl InMemoryDocumentStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Fields>>, InfraError> {
        self.documents
            .lock()
            .map_err(|error| InfraError::Store(format!("document store lock poisoned: {error}")))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, InfraError> {
        let path = normalize_path(path)?;
        let documents = self.lock()?;
        Ok(documents.get(&path).map(|fields| Document {
            path: path.clone(),
            fields: fields.clone(),
        }))
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<(), InfraError> {
        let path = normalize_path(path)?;
        self.lock()?.insert(path, fields);
        Ok(())
    }

    async fn update(&self, path: &str, updates: Vec<FieldUpdate>) -> Result<(), InfraError> {
        let path = normalize_path(path)?;
        let mut documents = self.lock()?;
        let fields = documents
            .get_mut(&path)
            .ok_or_else(|| InfraError::NotFound(format!("document {path}")))?;
        // Apply to a copy so a failing update leaves the document untouched.
        let mut updated = fields.clone();
        apply_updates(&mut updated, updates)?;
        *fields = updated;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), InfraError> {
        let path = normalize_path(path)?;
        self.lock()?.remove(&path);
        Ok(())
    }

    async fn query(&self, collection: &str, filters: Vec<Filter>) -> Result<Vec<Document>, InfraError> {
        let collection = normalize_collection(collection)?;
        let documents = self.lock()?;
        Ok(documents
            .iter()
            .filter(|(path, fields)| {
                collection_of(path) == collection && filters.iter().all(|filter| filter.matches(fields))
            })
            .map(|(path, fields)| Document {
                path: path.clone(),
                fields: fields.clone(),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn decode_fields(path: &str, raw: &str) -> Result<Fields, InfraError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(fields) => Ok(fields),
            other => Err(InfraError::Store(format!(
                "document {path} does not hold an object: {other}"
            ))),
        }
    }

    fn write(connection: &Connection, path: &str, fields: &Fields) -> Result<(), InfraError> {
        connection.execute(
            "INSERT INTO documents (path, collection, fields, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
               fields = excluded.fields,
               updated_at = excluded.updated_at",
            params![
                path,
                collection_of(path),
                serde_json::to_string(fields)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, InfraError> {
        let path = normalize_path(path)?;
        let connection = self.connect()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT fields FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| {
            Ok(Document {
                fields: Self::decode_fields(&path, &raw)?,
                path: path.clone(),
            })
        })
        .transpose()
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<(), InfraError> {
        let path = normalize_path(path)?;
        let connection = self.connect()?;
        Self::write(&connection, &path, &fields)
    }

    async fn update(&self, path: &str, updates: Vec<FieldUpdate>) -> Result<(), InfraError> {
        let path = normalize_path(path)?;
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let raw: Option<String> = transaction
            .query_row(
                "SELECT fields FROM documents WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        let raw = raw.ok_or_else(|| InfraError::NotFound(format!("document {path}")))?;

        let mut fields = Self::decode_fields(&path, &raw)?;
        apply_updates(&mut fields, updates)?;
        Self::write(&transaction, &path, &fields)?;
        transaction.commit()?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), InfraError> {
        let path = normalize_path(path)?;
        let connection = self.connect()?;
        connection.execute("DELETE FROM documents WHERE path = ?1", params![path])?;
        Ok(())
    }

    async fn query(&self, collection: &str, filters: Vec<Filter>) -> Result<Vec<Document>, InfraError> {
        let collection = normalize_collection(collection)?;
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT path, fields FROM documents WHERE collection = ?1 ORDER BY path")?;
        let rows = statement.query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (path, raw) = row?;
            let fields = Self::decode_fields(&path, &raw)?;
            if filters.iter().all(|filter| filter.matches(&fields)) {
                documents.push(Document { path, fields });
            }
        }
        Ok(documents)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    async fn exercise_store(store: &dyn DocumentStore) {
        store
            .set("users/u1", fields(json!({"userId": "u1", "streak": 0})))
            .await
            .expect("set user");
        store
            .set(
                "users/u1/study_plans/2024-01-01",
                fields(json!({"date": "2024-01-01", "isCompleted": false})),
            )
            .await
            .expect("set plan");
        store
            .set(
                "users/u1/study_plans/2024-01-02",
                fields(json!({"date": "2024-01-02", "isCompleted": true})),
            )
            .await
            .expect("set plan");

        store
            .update(
                "users/u1",
                vec![
                    FieldUpdate::increment("streak", 2),
                    FieldUpdate::increment("stats.subjectMinutes.Math", 30),
                    FieldUpdate::array_union("badges", "starter"),
                    FieldUpdate::array_union("badges", "starter"),
                ],
            )
            .await
            .expect("update user");

        let user = store.get("users/u1").await.expect("get").expect("exists");
        assert_eq!(user.id(), "u1");
        assert_eq!(user.field("streak"), Some(&json!(2)));
        assert_eq!(user.field("stats.subjectMinutes.Math"), Some(&json!(30)));
        assert_eq!(user.field("badges"), Some(&json!(["starter"])));

        let all = store.query("users/u1/study_plans", Vec::new()).await.expect("query");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), "2024-01-01");

        let completed = store
            .query(
                "users/u1/study_plans",
                vec![Filter::Eq("isCompleted".to_string(), json!(true))],
            )
            .await
            .expect("query completed");
        assert_eq!(completed.len(), 1);

        let recent = store
            .query(
                "users/u1/study_plans",
                vec![Filter::Gte("date".to_string(), json!("2024-01-02"))],
            )
            .await
            .expect("query recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id(), "2024-01-02");

        // Parent collection queries do not see subcollection documents.
        let users = store.query("users", Vec::new()).await.expect("query users");
        assert_eq!(users.len(), 1);

        match store.update("users/missing", vec![FieldUpdate::set("streak", 1)]).await {
            Err(InfraError::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }

        store.delete("users/u1/study_plans/2024-01-01").await.expect("delete");
        assert!(store
            .get("users/u1/study_plans/2024-01-01")
            .await
            .expect("get deleted")
            .is_none());
    }

    #[tokio::test]
    async fn in_memory_store_supports_documented_operations() {
        exercise_store(&InMemoryDocumentStore::default()).await;
    }

    #[tokio::test]
    async fn sqlite_store_supports_documented_operations() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("studyaid.sqlite");
        initialize_database(&db_path).expect("init db");
        exercise_store(&SqliteDocumentStore::new(&db_path)).await;
    }

    #[tokio::test]
    async fn failed_update_leaves_document_untouched() {
        let store = InMemoryDocumentStore::default();
        store
            .set("users/u1", fields(json!({"streak": 3, "name": "Ada"})))
            .await
            .expect("set");

        let result = store
            .update(
                "users/u1",
                vec![FieldUpdate::set("streak", 4), FieldUpdate::increment("name", 1)],
            )
            .await;
        assert!(matches!(result, Err(InfraError::InvalidInput(_))));

        let user = store.get("users/u1").await.expect("get").expect("exists");
        assert_eq!(user.field("streak"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn rejects_malformed_paths() {
        let store = InMemoryDocumentStore::default();
        assert!(store.get("users").await.is_err());
        assert!(store.get("users//plans/x").await.is_err());
        assert!(store.query("users/u1", Vec::new()).await.is_err());
    }

    #[test]
    fn gte_filter_ignores_mixed_types() {
        let document = fields(json!({"createdAt": "2026-03-01T00:00:00Z", "count": 5}));
        assert!(Filter::Gte("count".to_string(), json!(5)).matches(&document));
        assert!(!Filter::Gte("count".to_string(), json!("5")).matches(&document));
        assert!(Filter::Gte("createdAt".to_string(), json!("2026-02-28T00:00:00Z")).matches(&document));
        assert!(!Filter::Gte("missing".to_string(), json!(0)).matches(&document));
    }
}
