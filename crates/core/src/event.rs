//! Session-scoped branch events.
//!
//! Each user session owns one [`SessionEvents`] and passes it to the engine.
//! Listeners (UI badges, transcript writers) call [`SessionEvents::subscribe`]
//! and [`SessionEvents::unsubscribe`] explicitly; nothing here is global.

use crate::branch::BranchState;
use crate::message::{BranchId, ConversationId, KnowledgeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Everything that can happen to a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BranchEvent {
    StateChanged {
        branch_id: BranchId,
        conversation_id: ConversationId,
        from: BranchState,
        to: BranchState,
        timestamp: DateTime<Utc>,
    },

    TurnAppended {
        branch_id: BranchId,
        turn_count: usize,
        timestamp: DateTime<Utc>,
    },

    KnowledgeMerged {
        knowledge_id: KnowledgeId,
        conversation_id: ConversationId,
        used_fallback: bool,
        timestamp: DateTime<Utc>,
    },

    KnowledgeEvicted {
        knowledge_ids: Vec<KnowledgeId>,
        timestamp: DateTime<Utc>,
    },
}

/// Handle returned by [`SessionEvents::subscribe`].
pub type SubscriptionId = u64;

/// A live subscription: its id (for unsubscribing) and its receiver.
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<Arc<BranchEvent>>,
}

/// Fan-out of branch events to the listeners of one session.
#[derive(Default)]
pub struct SessionEvents {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<Arc<BranchEvent>>>>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        Subscription { id, receiver: rx }
    }

    /// Stop delivering to a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver to every listener; listeners whose receiver was dropped are
    /// forgotten.
    pub fn publish(&self, event: BranchEvent) {
        let event = Arc::new(event);
        self.lock()
            .retain(|_, tx| tx.send(Arc::clone(&event)).is_ok());
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, mpsc::UnboundedSender<Arc<BranchEvent>>>>
    {
        // a poisoned map is still a valid map
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
