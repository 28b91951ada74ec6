//! Application state management

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::pipeline::{AnalysisPipeline, ModelBundle};
use crate::profiling::DatasetProfile;
use crate::training::TrainingResult;

use super::ServerConfig;

/// One upload's profile, results and fitted models
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub profile: DatasetProfile,
    pub results: TrainingResult,
    pub bundle: Mutex<ModelBundle>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct SessionMap {
    /// Insertion order, oldest first
    order: VecDeque<String>,
    sessions: HashMap<String, Arc<Session>>,
}

/// Bounded session storage; the oldest session is evicted when full
pub struct SessionStore {
    inner: RwLock<SessionMap>,
    capacity: usize,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(SessionMap::default()),
            capacity: capacity.max(1),
        }
    }

    /// Store a new session and return its id
    pub fn insert(&self, profile: DatasetProfile, results: TrainingResult, bundle: ModelBundle) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session {
            id: id.clone(),
            profile,
            results,
            bundle: Mutex::new(bundle),
            created_at: Utc::now(),
        });

        let mut inner = self.inner.write();
        while inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.sessions.remove(&oldest);
                debug!(session_id = %oldest, "Evicted session");
            }
        }
        inner.order.push_back(id.clone());
        inner.sessions.insert(id.clone(), session);
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.read().sessions.get(id).cloned()
    }

    /// Most recently stored session
    pub fn latest(&self) -> Option<Arc<Session>> {
        let inner = self.inner.read();
        inner.order.back().and_then(|id| inner.sessions.get(id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: AnalysisPipeline,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let pipeline = AnalysisPipeline::new(config.pipeline_config());
        let sessions = SessionStore::new(config.max_sessions);
        Self {
            config,
            pipeline,
            sessions,
        }
    }
}
