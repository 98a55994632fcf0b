//! Refcounted cache of per-user components

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::chat::ChatAssistant;
use crate::error::{Result, TutorError};
use crate::intent::IntentClassifier;
use crate::report::ReportAnalyzer;
use crate::retrieval::RetrievalAnswerer;

/// The heavy objects one user's requests run through
pub struct UserComponents {
    pub user_id: String,
    pub classifier: Arc<IntentClassifier>,
    /// Usually one process-wide instance shared by every user
    pub retriever: Arc<RetrievalAnswerer>,
    pub analyzer: Arc<ReportAnalyzer>,
    pub chat: Arc<ChatAssistant>,
}

/// Builds a fresh component set for a user
pub trait ComponentFactory: Send + Sync {
    fn build(&self, user_id: &str) -> Result<UserComponents>;
}

struct PoolEntry {
    components: Arc<UserComponents>,
    refcount: usize,
    last_accessed: Instant,
}

pub struct ComponentPool {
    factory: Arc<dyn ComponentFactory>,
    capacity: usize,
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl ComponentPool {
    pub fn new(factory: Arc<dyn ComponentFactory>, capacity: usize) -> Self {
        Self {
            factory,
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, PoolEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a reference to the user's components, building them if absent.
    /// A failed build leaves the pool untouched.
    pub fn acquire(&self, user_id: &str) -> Result<Arc<UserComponents>> {
        let mut entries = self.entries();

        if !entries.contains_key(user_id) {
            let components = self.factory.build(user_id).map_err(|e| {
                warn!(user = user_id, error = %e, "component construction failed");
                match e {
                    e @ TutorError::ComponentInit { .. } => e,
                    other => TutorError::ComponentInit {
                        user: user_id.to_string(),
                        reason: other.to_string(),
                    },
                }
            })?;
            info!(user = user_id, "components built");
            entries.insert(
                user_id.to_string(),
                PoolEntry {
                    components: Arc::new(components),
                    refcount: 0,
                    last_accessed: Instant::now(),
                },
            );
        }

        let components = match entries.get_mut(user_id) {
            Some(entry) => {
                entry.refcount += 1;
                entry.last_accessed = entry.last_accessed.max(Instant::now());
                debug!(user = user_id, refcount = entry.refcount, "components acquired");
                entry.components.clone()
            }
            None => {
                return Err(TutorError::ComponentInit {
                    user: user_id.to_string(),
                    reason: "entry vanished during acquire".to_string(),
                })
            }
        };

        self.evict_idle(&mut entries);
        Ok(components)
    }

    /// Drop one reference. Entries at zero stay warm until capacity pressure evicts them.
    pub fn release(&self, user_id: &str) {
        let mut entries = self.entries();
        match entries.get_mut(user_id) {
            Some(entry) if entry.refcount > 0 => {
                entry.refcount -= 1;
                debug!(user = user_id, refcount = entry.refcount, "components released");
            }
            Some(_) => warn!(user = user_id, "release without matching acquire"),
            None => warn!(user = user_id, "release for unknown user"),
        }
        self.evict_idle(&mut entries);
    }

    /// Evict least recently used unreferenced entries until within capacity
    fn evict_idle(&self, entries: &mut HashMap<String, PoolEntry>) {
        while entries.len() > self.capacity {
            let victim = entries
                .iter()
                .filter(|(_, e)| e.refcount == 0)
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(user, _)| user.clone());

            match victim {
                Some(user) => {
                    entries.remove(&user);
                    debug!(user = %user, "components evicted");
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entries().contains_key(user_id)
    }

    pub fn refcount(&self, user_id: &str) -> Option<usize> {
        self.entries().get(user_id).map(|e| e.refcount)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::LanguageModel;
    use crate::retrieval::{ScoredPassage, VectorIndex};
    use crate::store::JsonDocumentStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SilentModel;

    #[async_trait::async_trait]
    impl LanguageModel for SilentModel {
        async fn complete(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
            Ok("NORMAL_CHAT".to_string())
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    struct EmptyIndex;

    #[async_trait::async_trait]
    impl VectorIndex for EmptyIndex {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredPassage>> {
            Ok(Vec::new())
        }
    }

    /// Counts builds; fails for users listed in `broken`
    pub(crate) struct CountingFactory {
        pub builds: AtomicUsize,
        pub broken: Vec<String>,
    }

    impl CountingFactory {
        pub(crate) fn new() -> Self {
            Self {
                builds: AtomicUsize::new(0),
                broken: Vec::new(),
            }
        }
    }

    impl ComponentFactory for CountingFactory {
        fn build(&self, user_id: &str) -> Result<UserComponents> {
            if self.broken.iter().any(|u| u == user_id) {
                return Err(TutorError::Index("passage index not found".to_string()));
            }
            self.builds.fetch_add(1, Ordering::SeqCst);

            let config = Config::default();
            let llm: Arc<dyn LanguageModel> = Arc::new(SilentModel);
            Ok(UserComponents {
                user_id: user_id.to_string(),
                classifier: Arc::new(IntentClassifier::new(llm.clone(), config.intent, Duration::from_secs(1))),
                retriever: Arc::new(RetrievalAnswerer::new(Arc::new(EmptyIndex), llm.clone(), config.retrieval)),
                analyzer: Arc::new(ReportAnalyzer::new(
                    Arc::new(JsonDocumentStore::in_memory()),
                    llm.clone(),
                    config.report,
                )),
                chat: Arc::new(ChatAssistant::new(llm)),
            })
        }
    }

    fn pool(capacity: usize) -> (ComponentPool, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory::new());
        (ComponentPool::new(factory.clone(), capacity), factory)
    }

    #[test]
    fn test_acquire_twice_shares_instance() {
        let (pool, factory) = pool(4);
        let a = pool.acquire("alice").unwrap();
        let b = pool.acquire("alice").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.refcount("alice"), Some(2));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_keeps_entry_warm() {
        let (pool, factory) = pool(4);
        let first = pool.acquire("alice").unwrap();
        pool.release("alice");
        assert_eq!(pool.refcount("alice"), Some(0));

        let again = pool.acquire("alice").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eviction_pressure_rebuilds() {
        let (pool, factory) = pool(1);
        let first = pool.acquire("alice").unwrap();
        pool.release("alice");

        pool.acquire("bob").unwrap();
        assert!(!pool.contains("alice"));

        let rebuilt = pool.acquire("alice").unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_capacity_invariant() {
        let (pool, _) = pool(2);
        let users = ["u1", "u2", "u3", "u4"];

        let check = |pool: &ComponentPool| {
            let entries = pool.entries();
            assert!(entries.len() <= pool.capacity() || entries.values().all(|e| e.refcount > 0));
        };

        for user in users {
            pool.acquire(user).unwrap();
            check(&pool);
        }
        assert_eq!(pool.len(), 4);

        for user in users {
            pool.release(user);
            check(&pool);
        }
        assert_eq!(pool.len(), 2);

        for user in users.iter().rev() {
            pool.acquire(user).unwrap();
            pool.release(user);
            check(&pool);
        }
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let (pool, _) = pool(2);
        pool.acquire("old").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        pool.acquire("new").unwrap();
        pool.release("old");
        pool.release("new");

        pool.acquire("third").unwrap();
        assert!(!pool.contains("old"));
        assert!(pool.contains("new"));
    }

    #[test]
    fn test_failed_build_leaves_no_entry() {
        let factory = Arc::new(CountingFactory {
            builds: AtomicUsize::new(0),
            broken: vec!["alice".to_string()],
        });
        let pool = ComponentPool::new(factory, 4);

        let result = pool.acquire("alice");
        assert!(matches!(result, Err(TutorError::ComponentInit { .. })));
        assert!(pool.is_empty());

        pool.acquire("bob").unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_acquire_builds_once() {
        let (pool, factory) = pool(4);
        let pool = Arc::new(pool);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || pool.acquire("alice").unwrap())
            })
            .collect();
        let acquired: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert!(acquired.iter().all(|c| Arc::ptr_eq(c, &acquired[0])));
        assert_eq!(pool.refcount("alice"), Some(8));
    }
}
