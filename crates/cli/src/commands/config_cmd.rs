//! `sidechat config` — Configuration management commands.

use sidechat_config::AppConfig;
use std::path::{Path, PathBuf};

fn config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!(
                "   Store:       {} ({})",
                config.store.backend,
                config.store.resolved_path().display()
            );
            println!(
                "   Retention:   {} days, {} cross-conversation, {} per conversation",
                config.retention.max_age_days,
                config.retention.max_cross_conversation,
                config.retention.max_per_conversation
            );
            println!(
                "   Summarizer:  {} ({}s timeout)",
                config.summarizer.mode, config.summarizer.timeout_secs
            );
            println!(
                "   Composer:    {} tokens, top {} documents",
                config.composer.default_token_budget, config.composer.document_top_k
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Settings that are valid but probably not what the operator wants.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.store.backend == "memory" {
        warnings.push("store.backend = \"memory\" keeps nothing across restarts");
    }
    if config.retention.max_per_conversation == 0 {
        warnings.push("retention.max_per_conversation = 0 hides all branch knowledge");
    }
    if config.composer.min_fragment_tokens >= config.composer.default_token_budget {
        warnings.push(
            "composer.min_fragment_tokens >= default_token_budget: nothing is ever truncated",
        );
    }
    if config.retention.purge_conversation_scope {
        warnings.push(
            "retention.purge_conversation_scope deletes expired records from conversations",
        );
    }
    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path().display());
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if write_default(&path, force)? {
        println!("✅ Wrote {}", path.display());
    } else {
        println!("⚠️  {} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}

/// Write the default config to `path`, refusing to overwrite unless `force`.
/// Returns whether the file was written.
fn write_default(path: &Path, force: bool) -> std::io::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
