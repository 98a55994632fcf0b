//! Session id to session state, with idle sweeping

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::pool::{ComponentPool, UserComponents};
use crate::chat::{ChatTurn, HISTORY_TURNS};
use crate::error::{Result, TutorError};

/// Pool key shared by sessions nobody has logged into
pub const GUEST_USER: &str = "guest";

struct SessionState {
    last_accessed: Instant,
    components: Option<Arc<UserComponents>>,
    history: Vec<ChatTurn>,
    closed: bool,
}

/// One browser session. Components are acquired on first use, not on creation.
pub struct SessionHandle {
    id: String,
    user: Option<String>,
    pool: Arc<ComponentPool>,
    state: Mutex<SessionState>,
}

impl SessionHandle {
    fn new(user: Option<String>, pool: Arc<ComponentPool>, now: Instant) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            pool,
            state: Mutex::new(SessionState {
                last_accessed: now,
                components: None,
                history: Vec::new(),
                closed: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Authenticated username, if any
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn pool_key(&self) -> &str {
        self.user.as_deref().unwrap_or(GUEST_USER)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn last_accessed(&self) -> Instant {
        self.state().last_accessed
    }

    pub fn has_components(&self) -> bool {
        self.state().components.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn touch_at(&self, now: Instant) {
        let mut state = self.state();
        state.last_accessed = state.last_accessed.max(now);
    }

    /// Components for this session's user, acquired from the pool on first call
    pub fn components(&self) -> Result<Arc<UserComponents>> {
        let mut state = self.state();
        if state.closed {
            return Err(TutorError::SessionClosed(self.id.clone()));
        }
        if let Some(components) = &state.components {
            return Ok(components.clone());
        }

        let components = self.pool.acquire(self.pool_key())?;
        state.components = Some(components.clone());
        Ok(components)
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.state().history.clone()
    }

    /// Append turns, keeping only the window the chat prompt uses
    pub fn push_history(&self, turns: impl IntoIterator<Item = ChatTurn>) {
        let mut state = self.state();
        state.history.extend(turns);
        let excess = state.history.len().saturating_sub(HISTORY_TURNS);
        state.history.drain(..excess);
    }

    /// Close the session and hand its components back to the pool
    fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.history.clear();
        if state.components.take().is_some() {
            self.pool.release(self.pool_key());
        }
    }
}

pub struct SessionRegistry {
    pool: Arc<ComponentPool>,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(pool: Arc<ComponentPool>, idle_timeout: Duration) -> Self {
        Self {
            pool,
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<SessionHandle>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pool(&self) -> &Arc<ComponentPool> {
        &self.pool
    }

    /// Return the live session for `id`, or a new anonymous one when the id is
    /// missing, unknown or expired
    pub fn touch(&self, id: Option<&str>) -> Arc<SessionHandle> {
        self.touch_as_of(id, Instant::now())
    }

    fn touch_as_of(&self, id: Option<&str>, now: Instant) -> Arc<SessionHandle> {
        let mut sessions = self.sessions();

        if let Some(handle) = id.and_then(|id| sessions.get(id)).cloned() {
            if !self.is_expired(&handle, now) {
                handle.touch_at(now);
                return handle;
            }
            sessions.remove(handle.id());
            handle.close();
            debug!(session = %handle.id, "expired session replaced");
        }

        let handle = Arc::new(SessionHandle::new(None, self.pool.clone(), now));
        debug!(session = %handle.id, "session created");
        sessions.insert(handle.id.clone(), handle.clone());
        handle
    }

    /// Look up without creating or touching
    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions().get(id).cloned()
    }

    /// Drop `old` and mint a fresh session bound to `user`
    pub fn login(&self, old: Option<&str>, user: &str) -> Arc<SessionHandle> {
        if let Some(old) = old {
            self.invalidate(old);
        }

        let handle = Arc::new(SessionHandle::new(Some(user.to_string()), self.pool.clone(), Instant::now()));
        info!(user, session = %handle.id, "session bound to user");
        self.sessions().insert(handle.id.clone(), handle.clone());
        handle
    }

    /// Remove the session and release its components. Returns whether it existed.
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self.sessions().remove(id);
        match removed {
            Some(handle) => {
                handle.close();
                debug!(session = id, "session invalidated");
                true
            }
            None => false,
        }
    }

    fn is_expired(&self, handle: &SessionHandle, now: Instant) -> bool {
        now.saturating_duration_since(handle.last_accessed()) > self.idle_timeout
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Release every session idle for longer than the timeout as of `now`
    pub fn sweep_at(&self, now: Instant) -> usize {
        let expired: Vec<Arc<SessionHandle>> = {
            let mut sessions = self.sessions();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, h)| self.is_expired(h, now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for handle in &expired {
            handle.close();
        }

        if !expired.is_empty() {
            info!(expired = expired.len(), remaining = self.len(), "idle sessions swept");
        }
        expired.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the task is aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
