//! `sidechat knowledge` — Inspect merged knowledge.

use super::open_configured_store;
use chrono::{DateTime, Utc};
use sidechat_core::error::StoreError;
use sidechat_core::knowledge::MergedKnowledge;
use sidechat_core::message::{ConversationId, KnowledgeId, UserId};
use sidechat_core::retention::{RetentionPolicy, sort_newest_first};
use sidechat_core::store::BranchStore;

/// One conversation's records, or the user's cross-conversation index when
/// no conversation is given. Newest first.
pub async fn collect(
    store: &dyn BranchStore,
    user: &UserId,
    conversation: Option<&ConversationId>,
) -> Result<Vec<MergedKnowledge>, StoreError> {
    let mut records = match conversation {
        Some(conversation) => store.list_by_conversation(user, conversation).await?,
        None => store.list_cross_conversation(user).await?,
    };
    sort_newest_first(&mut records);
    Ok(records)
}

pub async fn list(
    user: &str,
    conversation: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, store) = open_configured_store().await?;
    let user = UserId::from(user);
    let conversation = conversation.map(ConversationId::from);
    let records = collect(store.as_ref(), &user, conversation.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    match &conversation {
        Some(c) => println!("🧠 Merged knowledge in {c} ({} records)", records.len()),
        None => println!(
            "🧠 Cross-conversation knowledge for {user} ({}/{} records)",
            records.len(),
            config.retention.max_cross_conversation
        ),
    }
    println!();
    print!("{}", format_table(&records, &config.retention, Utc::now()));
    Ok(())
}

pub async fn show(user: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, store) = open_configured_store().await?;
    let record = store
        .get_knowledge(&UserId::from(user), &KnowledgeId::from(id))
        .await?
        .ok_or_else(|| format!("Merged knowledge not found: {id}"))?;
    println!("{}", record.to_transcript_block());
    Ok(())
}

/// One line per record: id, age, topic, short summary.
fn format_table(
    records: &[MergedKnowledge],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> String {
    if records.is_empty() {
        return "   (none)\n".to_string();
    }

    let mut out = String::new();
    for k in records {
        let age_days = now.signed_duration_since(k.merged_at).num_days();
        let mut flags = String::new();
        if policy.is_expired(k, now) {
            flags.push_str(" [expired]");
        }
        if k.fallback {
            flags.push_str(" [extractive]");
        }
        let summary: String = k.short_summary.chars().take(60).collect();
        out.push_str(&format!(
            "  {:<40} {:>3}d  {:<20} {}{}\n",
            k.id.as_str(),
            age_days,
            k.topic,
            summary,
            flags
        ));
    }
    out
}
