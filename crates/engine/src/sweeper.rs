//! Retention sweeper — periodic removal of expired merged knowledge.
//!
//! Stores also sweep on every knowledge write; this task covers users who
//! stop merging.

use chrono::{DateTime, Utc};
use sidechat_core::error::StoreError;
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::store::{BranchStore, SweepReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run one sweep against `store`.
pub async fn sweep_once(
    store: &dyn BranchStore,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<SweepReport, StoreError> {
    let report = store.delete_expired(policy, now).await?;
    if report.total() > 0 {
        info!(
            store = store.name(),
            cross_conversation = report.cross_conversation_removed,
            conversation = report.conversation_removed,
            "Expired knowledge swept"
        );
    } else {
        debug!(store = store.name(), "Sweep found nothing expired");
    }
    Ok(report)
}

/// Start the background sweep loop. The first sweep runs immediately.
///
/// Failures are logged and retried on the next tick. Abort the returned
/// handle to stop the loop.
pub fn spawn(
    store: Arc<dyn BranchStore>,
    policy: RetentionPolicy,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = sweep_once(store.as_ref(), &policy, Utc::now()).await {
                warn!(error = %e, "Retention sweep failed, retrying next tick");
            }
        }
    })
}
