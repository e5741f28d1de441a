use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::{fs, sync::RwLock};

/// Credentials of the signed-in user as persisted on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub auth_token: String,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Holds the Catalog API token for the current user
///
/// Every credential change bumps [`SessionStore::epoch`]. Anything keyed to the
/// signed-in user (the membership cache) compares epochs to detect a session
/// switch without being notified.
pub struct SessionStore {
    path: Option<PathBuf>,
    current: RwLock<Option<StoredSession>>,
    epoch: AtomicU64,
}

impl SessionStore {
    /// Session that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Opens a file-backed session, restoring credentials saved by a previous run
    pub async fn load(path: PathBuf) -> anyhow::Result<Self> {
        let current = match fs::read_to_string(&path).await {
            Ok(json) => match serde_json::from_str::<StoredSession>(&json) {
                Ok(session) => {
                    tracing::info!(path = %path.display(), "Restored saved session");
                    Some(session)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(current),
            epoch: AtomicU64::new(0),
        })
    }

    /// Current session generation
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub async fn token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.auth_token.clone())
    }

    pub async fn user_email(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .and_then(|s| s.user_email.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Stores new credentials, replacing any previous session
    ///
    /// The file is written before the in-memory session changes; on error the
    /// previous session and epoch stay in place.
    pub async fn set(&self, auth_token: String, user_email: Option<String>) -> anyhow::Result<()> {
        let session = StoredSession {
            auth_token,
            user_email,
        };

        let mut current = self.current.write().await;

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, serde_json::to_vec_pretty(&session)?).await?;
        }

        *current = Some(session);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Drops stored credentials. Returns false when there was nothing to clear.
    pub async fn clear(&self) -> bool {
        self.clear_where(|_, _| true).await
    }

    /// Clears only while `token` is still the stored one
    pub async fn clear_if_token(&self, token: &str) -> bool {
        self.clear_where(|session, _| session.auth_token == token).await
    }

    /// Clears only while the session is still at `epoch`
    pub async fn clear_if_epoch(&self, epoch: u64) -> bool {
        self.clear_where(|_, current_epoch| current_epoch == epoch).await
    }

    async fn clear_where(&self, matches: impl FnOnce(&StoredSession, u64) -> bool) -> bool {
        let mut current = self.current.write().await;
        let Some(session) = current.as_ref() else {
            return false;
        };
        if !matches(session, self.epoch()) {
            tracing::debug!("Credentials changed since the request, keeping session");
            return false;
        }

        *current = None;
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(path) = &self.path {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to delete session file");
                }
            }
        }

        tracing::info!("Session credentials cleared");
        true
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_clear_bump_epoch() {
        let session = SessionStore::in_memory();
        assert_eq!(session.epoch(), 0);
        assert_eq!(session.token().await, None);

        session
            .set("abc".to_string(), Some("ana@example.com".to_string()))
            .await
            .unwrap();
        assert_eq!(session.epoch(), 1);
        assert_eq!(session.token().await.as_deref(), Some("abc"));
        assert_eq!(session.user_email().await.as_deref(), Some("ana@example.com"));

        assert!(session.clear().await);
        assert_eq!(session.epoch(), 2);
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_clear_without_session_keeps_epoch() {
        let session = SessionStore::in_memory();
        assert!(!session.clear().await);
        assert_eq!(session.epoch(), 0);
    }

    #[tokio::test]
    async fn test_file_session_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let session = SessionStore::load(path.clone()).await.unwrap();
        assert_eq!(session.token().await, None);
        session.set("tok-1".to_string(), None).await.unwrap();

        let reloaded = SessionStore::load(path.clone()).await.unwrap();
        assert_eq!(reloaded.token().await.as_deref(), Some("tok-1"));

        assert!(reloaded.clear().await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_session_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let session = SessionStore::load(path).await.unwrap();
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_stale_token_does_not_clear_newer_session() {
        let session = SessionStore::in_memory();
        session.set("old".to_string(), None).await.unwrap();
        let old_epoch = session.epoch();
        session.set("new".to_string(), None).await.unwrap();

        assert!(!session.clear_if_token("old").await);
        assert!(!session.clear_if_epoch(old_epoch).await);
        assert_eq!(session.token().await.as_deref(), Some("new"));
        assert_eq!(session.epoch(), old_epoch + 1);

        assert!(session.clear_if_token("new").await);
        assert_eq!(session.token().await, None);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        let path = blocker.join("session.json");

        let session = SessionStore::load(path).await.unwrap();
        session.set("tok-1".to_string(), None).await.unwrap();
        let epoch = session.epoch();

        // A regular file where the session directory should be
        std::fs::remove_dir_all(&blocker).unwrap();
        std::fs::write(&blocker, "").unwrap();

        assert!(session.set("tok-2".to_string(), None).await.is_err());
        assert_eq!(session.token().await.as_deref(), Some("tok-1"));
        assert_eq!(session.epoch(), epoch);
    }
}
