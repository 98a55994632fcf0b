//! Application composition root

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chat::ChatAssistant;
use crate::config::Config;
use crate::error::Result;
use crate::intent::IntentClassifier;
use crate::llm::{create_provider, LanguageModel};
use crate::quiz::{LocalQuizLauncher, QuizLauncher};
use crate::report::ReportAnalyzer;
use crate::retrieval::{LexicalIndex, RetrievalAnswerer, VectorIndex};
use crate::router::RequestRouter;
use crate::session::{ComponentFactory, ComponentPool, SessionRegistry, UserComponents};
use crate::store::{DocumentStore, JsonDocumentStore};

/// Where the passage index comes from
pub enum IndexSource {
    /// JSON passage file, loaded on first use
    File(PathBuf),
    /// Already built
    Ready(Arc<dyn VectorIndex>),
}

impl IndexSource {
    /// Read the passage file now so the first request does not block on it.
    /// A file that cannot be read yet is retried on first use.
    pub fn preload(path: &Path) -> Self {
        match LexicalIndex::load(path) {
            Ok(index) => IndexSource::Ready(Arc::new(index)),
            Err(e) => {
                warn!(error = %e, "passage index not loaded at startup");
                IndexSource::File(path.to_path_buf())
            }
        }
    }

    fn open(&self) -> Result<Arc<dyn VectorIndex>> {
        match self {
            IndexSource::File(path) => Ok(Arc::new(LexicalIndex::load(path)?)),
            IndexSource::Ready(index) => Ok(index.clone()),
        }
    }
}

/// Builds per-user components around one process-wide retrieval answerer
pub struct SharedComponentFactory {
    config: Config,
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn DocumentStore>,
    index: IndexSource,
    retriever: OnceCell<Arc<RetrievalAnswerer>>,
}

impl SharedComponentFactory {
    pub fn new(config: Config, llm: Arc<dyn LanguageModel>, store: Arc<dyn DocumentStore>, index: IndexSource) -> Self {
        Self {
            config,
            llm,
            store,
            index,
            retriever: OnceCell::new(),
        }
    }

    /// The shared answerer, built on first call. A failed build is retried next time.
    pub fn retriever(&self) -> Result<Arc<RetrievalAnswerer>> {
        self.retriever
            .get_or_try_init(|| {
                let index = self.index.open()?;
                info!("shared retrieval answerer ready");
                Ok(Arc::new(RetrievalAnswerer::new(
                    index,
                    self.llm.clone(),
                    self.config.retrieval.clone(),
                )))
            })
            .cloned()
    }
}

impl ComponentFactory for SharedComponentFactory {
    fn build(&self, user_id: &str) -> Result<UserComponents> {
        let retriever = self.retriever()?;
        let model_timeout = Duration::from_secs(self.config.provider.timeout_secs);

        Ok(UserComponents {
            user_id: user_id.to_string(),
            classifier: Arc::new(IntentClassifier::new(
                self.llm.clone(),
                self.config.intent.clone(),
                model_timeout,
            )),
            retriever,
            analyzer: Arc::new(ReportAnalyzer::new(
                self.store.clone(),
                self.llm.clone(),
                self.config.report.clone(),
            )),
            chat: Arc::new(ChatAssistant::new(self.llm.clone())),
        })
    }
}

/// Collaborators the application is assembled from
pub struct AppParts {
    pub llm: Arc<dyn LanguageModel>,
    pub store: Arc<dyn DocumentStore>,
    pub index: IndexSource,
    pub quiz: Arc<dyn QuizLauncher>,
}

/// Application state shared by every request
pub struct App {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub sessions: Arc<SessionRegistry>,
    pub router: Arc<RequestRouter>,
    model_name: String,
}

impl App {
    /// Assemble from configuration: provider, document store, passage file, local quiz site
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config.resolve_api_key();
        let llm: Arc<dyn LanguageModel> = Arc::from(create_provider(config.provider.clone(), api_key)?);

        let store: Arc<dyn DocumentStore> = match &config.store.path {
            Some(path) => Arc::new(JsonDocumentStore::open(path)?),
            None => Arc::new(JsonDocumentStore::in_memory()),
        };

        let parts = AppParts {
            llm,
            store,
            index: IndexSource::preload(&config.retrieval.index_path),
            quiz: Arc::new(LocalQuizLauncher::new(config.quiz.clone())?),
        };
        Ok(Self::from_parts(config, parts))
    }

    pub fn from_parts(config: Config, parts: AppParts) -> Self {
        let model_name = parts.llm.name().to_string();
        let factory = Arc::new(SharedComponentFactory::new(
            config.clone(),
            parts.llm,
            parts.store.clone(),
            parts.index,
        ));
        let pool = Arc::new(ComponentPool::new(factory, config.sessions.pool_capacity));
        let sessions = Arc::new(SessionRegistry::new(pool, config.idle_timeout()));
        let router = Arc::new(RequestRouter::new(
            sessions.clone(),
            parts.quiz,
            config.request_timeout(),
        ));

        info!(
            model = %model_name,
            pool_capacity = config.sessions.pool_capacity,
            idle_timeout_secs = config.sessions.idle_timeout_secs,
            "application assembled"
        );

        Self {
            config,
            store: parts.store,
            sessions,
            router,
            model_name,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Start the background idle-session sweeper
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.sessions.clone().spawn_sweeper(self.config.sweep_interval())
    }
}
