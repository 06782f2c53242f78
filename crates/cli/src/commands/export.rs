//! `sidechat export` — Render a conversation's merged knowledge as markdown.

use super::knowledge::collect;
use super::open_configured_store;
use sidechat_core::knowledge::MergedKnowledge;
use sidechat_core::message::{ConversationId, UserId};
use std::path::Path;

pub async fn run(
    user: &str,
    conversation: &str,
    output: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, store) = open_configured_store().await?;
    let conversation = ConversationId::from(conversation);
    let records = collect(store.as_ref(), &UserId::from(user), Some(&conversation)).await?;
    let markdown = render(&conversation, &records);

    match output {
        Some(path) => {
            write_markdown(Path::new(path), &markdown)?;
            println!("📤 Exported {} side discussions to {path}", records.len());
        }
        None => print!("{markdown}"),
    }
    Ok(())
}

/// Write the export, creating missing parent directories.
fn write_markdown(path: &Path, markdown: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, markdown)
}

/// Transcript blocks in the order they were merged.
fn render(conversation: &ConversationId, records: &[MergedKnowledge]) -> String {
    let mut out = format!("# Side discussions in {conversation}\n\n");
    if records.is_empty() {
        out.push_str("_No merged side discussions._\n");
        return out;
    }
    for k in records.iter().rev() {
        out.push_str(&k.to_transcript_block());
        out.push('\n');
    }
    out
}
