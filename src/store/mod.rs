//! Users and answer history
//!
//! The quiz site owns the data; this crate only reads wrong answers for
//! reports and writes what the answer endpoint receives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, TutorError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Hex blake3 digest of `salt:password`
    pub password_hash: String,
    pub salt: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    pub fn new(username: &str, password: &str, is_admin: bool) -> Self {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        Self {
            username: username.to_string(),
            password_hash: digest(&salt, password),
            salt,
            is_admin,
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        digest(&self.salt, password) == self.password_hash
    }
}

fn digest(salt: &str, password: &str) -> String {
    blake3::hash(format!("{}:{}", salt, password).as_bytes())
        .to_hex()
        .to_string()
}

/// One recorded answer to a quiz question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrongAnswerRecord {
    pub knowledge_point: String,
    #[serde(default)]
    pub question: String,
    pub user_answer: String,
    pub std_answer: String,
    pub timestamp: DateTime<Utc>,
}

impl WrongAnswerRecord {
    /// Exact comparison after trimming both sides
    pub fn is_mismatch(&self) -> bool {
        self.user_answer.trim() != self.std_answer.trim()
    }
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_wrong_answers(&self, user_id: &str) -> Result<Vec<WrongAnswerRecord>>;
    async fn record_answer(&self, user_id: &str, record: WrongAnswerRecord) -> Result<()>;
    async fn get_user(&self, username: &str) -> Result<Option<User>>;
    async fn save_user(&self, user: User) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    users: HashMap<String, User>,
    answers: HashMap<String, Vec<WrongAnswerRecord>>,
}

/// Document store kept in memory and, when a path is given, mirrored to a JSON file
pub struct JsonDocumentStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
}

impl JsonDocumentStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoreData::default()),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            StoreData::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &StoreData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(data)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn get_wrong_answers(&self, user_id: &str) -> Result<Vec<WrongAnswerRecord>> {
        let data = self.data.read().await;
        Ok(data.answers.get(user_id).cloned().unwrap_or_default())
    }

    async fn record_answer(&self, user_id: &str, record: WrongAnswerRecord) -> Result<()> {
        let mut data = self.data.write().await;
        debug!(user = user_id, knowledge_point = %record.knowledge_point, "answer recorded");
        data.answers.entry(user_id.to_string()).or_default().push(record);
        self.persist(&data).await
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let data = self.data.read().await;
        Ok(data.users.get(username).cloned())
    }

    async fn save_user(&self, user: User) -> Result<()> {
        let mut data = self.data.write().await;
        if data.users.contains_key(&user.username) {
            return Err(TutorError::Auth(format!("username {} already exists", user.username)));
        }
        data.users.insert(user.username.clone(), user);
        self.persist(&data).await
    }
}
