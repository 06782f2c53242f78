//! Retention policy — how long merged knowledge stays usable.
//!
//! Two rules, applied to both storage scopes:
//! - **Age**: a record older than `max_age_days` is expired. Expired records
//!   are never composed into context.
//! - **Count**: the cross-conversation index is physically capped at
//!   `max_cross_conversation` (oldest dropped first). The conversation scope is
//!   only truncated at read time to `max_per_conversation`.

use crate::knowledge::MergedKnowledge;
use crate::message::KnowledgeId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    #[serde(default = "default_max_cross_conversation")]
    pub max_cross_conversation: usize,

    #[serde(default = "default_max_per_conversation")]
    pub max_per_conversation: usize,

    /// Also delete expired records from conversation scope during sweeps
    #[serde(default)]
    pub purge_conversation_scope: bool,
}

fn default_max_age_days() -> u32 {
    30
}
fn default_max_cross_conversation() -> usize {
    50
}
fn default_max_per_conversation() -> usize {
    20
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            max_cross_conversation: default_max_cross_conversation(),
            max_per_conversation: default_max_per_conversation(),
            purge_conversation_scope: false,
        }
    }
}

impl RetentionPolicy {
    pub fn max_age(&self) -> Duration {
        Duration::days(i64::from(self.max_age_days))
    }

    /// `now - merged_at > max_age`.
    pub fn is_expired(&self, record: &MergedKnowledge, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(record.merged_at) > self.max_age()
    }

    /// Unexpired records, newest first, at most `cap` of them.
    pub fn eligible(
        &self,
        records: Vec<MergedKnowledge>,
        now: DateTime<Utc>,
        cap: usize,
    ) -> Vec<MergedKnowledge> {
        let mut fresh: Vec<MergedKnowledge> = records
            .into_iter()
            .filter(|r| !self.is_expired(r, now))
            .collect();
        sort_newest_first(&mut fresh);
        fresh.truncate(cap);
        fresh
    }

    /// Ids that must be evicted from the cross-conversation index so that
    /// exactly `max_cross_conversation` remain. Oldest by `merged_at` go first.
    pub fn cross_conversation_overflow(&self, records: &[MergedKnowledge]) -> Vec<KnowledgeId> {
        if records.len() <= self.max_cross_conversation {
            return Vec::new();
        }
        let mut ordered: Vec<&MergedKnowledge> = records.iter().collect();
        ordered.sort_by(|a, b| newest_first(a, b));
        ordered[self.max_cross_conversation..]
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }
}

/// Ordering used everywhere records are ranked: `merged_at` descending, then
/// id ascending so equal timestamps stay deterministic.
pub fn newest_first(a: &MergedKnowledge, b: &MergedKnowledge) -> Ordering {
    b.merged_at
        .cmp(&a.merged_at)
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_newest_first(records: &mut [MergedKnowledge]) {
    records.sort_by(newest_first);
}
