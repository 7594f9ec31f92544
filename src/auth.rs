use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

const CREDENTIALS_FILE: &str = "credentials.toml";
const CREDENTIALS_TTL_DAYS: i64 = 7;

/// Login state handed to the orchestrator. Read-only there: only the login
/// and logout paths create or destroy it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub access_token: String,
    pub refresh_token: String,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(flatten)]
    auth: AuthContext,
    saved_at: DateTime<Utc>,
}

/// Loads persisted credentials, discarding them past the 7-day expiry.
pub async fn load(data_dir: &Path) -> Option<AuthContext> {
    let path = data_dir.join(CREDENTIALS_FILE);
    let content = fs::read_to_string(&path).await.ok()?;
    let stored: StoredCredentials = toml::from_str(&content).ok()?;

    if Utc::now() - stored.saved_at > Duration::days(CREDENTIALS_TTL_DAYS) {
        info!("Stored credentials expired, login required");
        let _ = fs::remove_file(&path).await;
        return None;
    }

    Some(stored.auth)
}

pub async fn save(data_dir: &Path, auth: &AuthContext) -> Result<()> {
    fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;

    let stored = StoredCredentials {
        auth: auth.clone(),
        saved_at: Utc::now(),
    };
    let content = toml::to_string(&stored).context("Failed to serialize credentials")?;

    fs::write(data_dir.join(CREDENTIALS_FILE), content)
        .await
        .context("Failed to write credentials file")?;
    Ok(())
}

pub async fn clear(data_dir: &Path) -> Result<()> {
    let path = data_dir.join(CREDENTIALS_FILE);
    if path.exists() {
        fs::remove_file(&path)
            .await
            .context("Failed to remove credentials file")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuthContext {
        AuthContext {
            access_token: "tok-abc".into(),
            refresh_token: "ref-abc".into(),
            name: "Test User".into(),
            avatar: None,
        }
    }

    #[tokio::test]
    async fn round_trips_credentials() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &sample()).await.unwrap();

        let loaded = load(dir.path()).await.unwrap();
        assert_eq!(loaded.access_token, "tok-abc");
        assert_eq!(loaded.name, "Test User");
    }

    #[tokio::test]
    async fn expired_credentials_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let stored = StoredCredentials {
            auth: sample(),
            saved_at: Utc::now() - Duration::days(CREDENTIALS_TTL_DAYS + 1),
        };
        fs::write(
            dir.path().join(CREDENTIALS_FILE),
            toml::to_string(&stored).unwrap(),
        )
        .await
        .unwrap();

        assert!(load(dir.path()).await.is_none());
        assert!(!dir.path().join(CREDENTIALS_FILE).exists());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &sample()).await.unwrap();
        clear(dir.path()).await.unwrap();
        clear(dir.path()).await.unwrap();
        assert!(load(dir.path()).await.is_none());
    }
}
