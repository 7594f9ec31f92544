use super::Snapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

const SESSION_FILE: &str = "session.toml";
const SESSION_TTL_DAYS: i64 = 7;

#[derive(Serialize, Deserialize)]
struct PersistedSession {
    bot_id: Option<String>,
    chat_id: Option<String>,
    saved_at: DateTime<Utc>,
}

/// Writes the store snapshot so a restart re-enters the same bot/chat.
/// Called only on backend-confirmed transitions, never optimistically.
pub async fn save_snapshot(data_dir: &Path, snapshot: &Snapshot) -> Result<()> {
    fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;

    let persisted = PersistedSession {
        bot_id: snapshot.bot_id.clone(),
        chat_id: snapshot.chat_id.clone(),
        saved_at: Utc::now(),
    };
    let content = toml::to_string(&persisted).context("Failed to serialize session snapshot")?;

    fs::write(data_dir.join(SESSION_FILE), content)
        .await
        .context("Failed to write session snapshot")?;
    Ok(())
}

/// Reads the snapshot back, discarding it past the 7-day expiry. Read once on
/// page entry; later external mutations of the file are advisory only.
pub async fn load_snapshot(data_dir: &Path) -> Option<Snapshot> {
    let path = data_dir.join(SESSION_FILE);
    let content = fs::read_to_string(&path).await.ok()?;
    let persisted: PersistedSession = toml::from_str(&content).ok()?;

    if Utc::now() - persisted.saved_at > Duration::days(SESSION_TTL_DAYS) {
        info!("Persisted session expired, starting fresh");
        let _ = fs::remove_file(&path).await;
        return None;
    }

    Some(Snapshot {
        bot_id: persisted.bot_id,
        chat_id: persisted.chat_id,
    })
}

pub async fn clear_snapshot(data_dir: &Path) -> Result<()> {
    let path = data_dir.join(SESSION_FILE);
    if path.exists() {
        fs::remove_file(&path)
            .await
            .context("Failed to remove session snapshot")?;
    }
    Ok(())
}
