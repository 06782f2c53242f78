//! File-based store — persistent JSON-lines storage.
//!
//! Each line is one tagged, structured record (`{"kind":"branch",...}` or
//! `{"kind":"knowledge","scope":...}`). Records are loaded into memory on
//! creation. A mutation is applied to a copy of the state, the whole file is
//! rewritten from that copy while the write lock is still held, and the copy
//! replaces the live state only once the file is on disk. A failed write
//! leaves both the file and the in-memory view untouched.
//!
//! Storage location: `~/.sidechat/knowledge.jsonl`

use crate::state::{StoreState, StoredRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sidechat_core::branch::SubChatBranch;
use sidechat_core::error::StoreError;
use sidechat_core::knowledge::MergedKnowledge;
use sidechat_core::message::{BranchId, ConversationId, KnowledgeId, UserId};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::store::{BranchStore, SweepReport, WriteReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A file-backed store using JSONL (one JSON object per line).
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
}

impl FileStore {
    /// Open the store at the given path.
    ///
    /// If the file exists, records are loaded from it.
    /// If the file does not exist, starts empty (file created on first write).
    pub fn new(path: PathBuf) -> Self {
        let state = Self::load_from_disk(&path);
        debug!(path = %path.display(), "File store loaded");
        Self {
            path,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> StoreState {
        let mut state = StoreState::default();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return state, // not written yet
        };

        let mut loaded = 0usize;
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<StoredRecord>(line) {
                Ok(record) => {
                    state.apply(record);
                    loaded += 1;
                }
                Err(e) => warn!(error = %e, "Skipping corrupted store record"),
            }
        }
        debug!(records = loaded, "Loaded records from disk");
        state
    }

    /// Rewrite the file from `state`. Called with the write lock held.
    fn flush(&self, state: &StoreState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("Failed to create store directory: {e}"))
                })?;
            }
        }

        let mut content = String::new();
        for record in state.records() {
            let line = serde_json::to_string(&record).map_err(|e| {
                StoreError::Serialization(format!("Failed to serialize store record: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, &content)
            .map_err(|e| StoreError::Unavailable(format!("Failed to write store file: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Unavailable(format!("Failed to replace store file: {e}")))?;

        Ok(())
    }

    /// Apply `mutate` to a copy of `state`, persist the copy, then swap it in.
    fn commit<T>(
        &self,
        state: &mut StoreState,
        mutate: impl FnOnce(&mut StoreState) -> T,
    ) -> Result<T, StoreError> {
        let mut next = state.clone();
        let out = mutate(&mut next);
        self.flush(&next)?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl BranchStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_branch(
        &self,
        user: &UserId,
        id: &BranchId,
    ) -> Result<Option<SubChatBranch>, StoreError> {
        Ok(self.state.read().await.get_branch(user, id))
    }

    async fn put_branch(&self, user: &UserId, branch: SubChatBranch) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.commit(&mut state, |next| next.put_branch(user, branch))
    }

    async fn list_branches(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<SubChatBranch>, StoreError> {
        Ok(self.state.read().await.list_branches(user, conversation))
    }

    async fn get_knowledge(
        &self,
        user: &UserId,
        id: &KnowledgeId,
    ) -> Result<Option<MergedKnowledge>, StoreError> {
        Ok(self.state.read().await.get_knowledge(user, id))
    }

    async fn put_knowledge(
        &self,
        user: &UserId,
        knowledge: MergedKnowledge,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<WriteReport, StoreError> {
        let mut state = self.state.write().await;
        self.commit(&mut state, |next| next.put_knowledge(user, knowledge, policy, now))
    }

    async fn list_by_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        Ok(self.state.read().await.list_by_conversation(user, conversation))
    }

    async fn list_cross_conversation(
        &self,
        user: &UserId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        Ok(self.state.read().await.list_cross_conversation(user))
    }

    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let report = next.delete_expired(policy, now);
        if report.total() > 0 {
            self.flush(&next)?;
            *state = next;
        }
        Ok(report)
    }
}
