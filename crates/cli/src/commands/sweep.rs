//! `sidechat sweep` — Remove expired merged knowledge.

use super::open_configured_store;
use chrono::Utc;
use sidechat_core::store::SweepReport;
use sidechat_engine::sweeper;
use std::time::Duration;
use tracing::info;

pub async fn run(watch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (config, store) = open_configured_store().await?;

    if watch {
        let every = Duration::from_secs(config.store.sweep_interval_secs);
        println!(
            "🧹 Sweeping {} store every {}s (Ctrl+C to stop)",
            store.name(),
            every.as_secs()
        );
        let handle = sweeper::spawn(store, config.retention.clone(), every);
        tokio::signal::ctrl_c().await?;
        handle.abort();
        info!("Sweeper stopped");
        println!("   Stopped.");
        return Ok(());
    }

    println!("🧹 Sweeping expired knowledge...");
    let report = sweeper::sweep_once(store.as_ref(), &config.retention, Utc::now()).await?;
    println!("{}", summarize(&report, config.retention.max_age_days));
    Ok(())
}

fn summarize(report: &SweepReport, max_age_days: u32) -> String {
    if report.total() == 0 {
        return format!("   Nothing older than {max_age_days} days.");
    }
    format!(
        "   Removed {} cross-conversation and {} conversation record(s) older than {max_age_days} days.",
        report.cross_conversation_removed, report.conversation_removed
    )
}
