use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::unix_ms;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SecretsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    login_password: Option<String>,
    /// Session token -> expiry (unix ms).
    #[serde(default)]
    sessions: BTreeMap<String, u64>,
}

/// Login password and issued session tokens, kept in `secrets.json` next to the config.
#[derive(Clone)]
pub struct SecretStore {
    path: PathBuf,
    inner: Arc<Mutex<SecretsFile>>,
}

impl SecretStore {
    pub fn new(path: PathBuf) -> Self {
        let inner = Self::load_from_disk(&path).unwrap_or_default();
        Self {
            path,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn load_from_disk(path: &PathBuf) -> Option<SecretsFile> {
        let txt = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&txt).ok()
    }

    fn persist(&self, data: &SecretsFile) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let txt = serde_json::to_string_pretty(data).map_err(|e| e.to_string())?;
        std::fs::write(&self.path, txt).map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn has_login_password(&self) -> bool {
        self.inner
            .lock()
            .login_password
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }

    pub fn set_login_password(&self, password: &str) -> Result<(), String> {
        let mut data = self.inner.lock();
        if data.login_password.as_deref() == Some(password) {
            return Ok(());
        }
        data.login_password = Some(password.to_string());
        // A new password invalidates every outstanding session.
        data.sessions.clear();
        self.persist(&data)
    }

    pub fn check_login_password(&self, password: &str) -> bool {
        match self.inner.lock().login_password.as_deref() {
            Some(expected) if !expected.is_empty() => expected == password,
            _ => false,
        }
    }

    /// Issues a session token valid for `ttl_ms`, pruning expired ones.
    pub fn issue_session(&self, ttl_ms: u64) -> Result<String, String> {
        let now = unix_ms();
        let token = format!("st_{}", Uuid::new_v4().simple());
        let mut data = self.inner.lock();
        data.sessions.retain(|_, expires| *expires > now);
        data.sessions
            .insert(token.clone(), now.saturating_add(ttl_ms));
        self.persist(&data)?;
        Ok(token)
    }

    pub fn is_session_valid(&self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() {
            return false;
        }
        self.inner
            .lock()
            .sessions
            .get(token)
            .is_some_and(|expires| *expires > unix_ms())
    }

    pub fn revoke_session(&self, token: &str) -> Result<bool, String> {
        let mut data = self.inner.lock();
        let removed = data.sessions.remove(token.trim()).is_some();
        if removed {
            self.persist(&data)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_fails_without_password() {
        let tmp = tempfile::tempdir().unwrap();
        let secrets = SecretStore::new(tmp.path().join("secrets.json"));
        assert!(!secrets.has_login_password());
        assert!(!secrets.check_login_password(""));
        assert!(!secrets.check_login_password("anything"));
    }

    #[test]
    fn sessions_persist_and_expire() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("secrets.json");
        let secrets = SecretStore::new(path.clone());
        secrets.set_login_password("pw").unwrap();
        assert!(secrets.check_login_password("pw"));
        assert!(!secrets.check_login_password("PW"));

        let live = secrets.issue_session(60_000).unwrap();
        let dead = secrets.issue_session(0).unwrap();
        assert!(live.starts_with("st_"));
        assert!(secrets.is_session_valid(&live));
        assert!(!secrets.is_session_valid(&dead));
        assert!(!secrets.is_session_valid(""));

        let reopened = SecretStore::new(path);
        assert!(reopened.is_session_valid(&live));
        assert!(reopened.check_login_password("pw"));
    }

    #[test]
    fn changing_password_revokes_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let secrets = SecretStore::new(tmp.path().join("secrets.json"));
        secrets.set_login_password("old").unwrap();
        let token = secrets.issue_session(60_000).unwrap();

        secrets.set_login_password("old").unwrap();
        assert!(secrets.is_session_valid(&token));

        secrets.set_login_password("new").unwrap();
        assert!(!secrets.is_session_valid(&token));
    }

    #[test]
    fn revoke_removes_a_single_session() {
        let tmp = tempfile::tempdir().unwrap();
        let secrets = SecretStore::new(tmp.path().join("secrets.json"));
        let a = secrets.issue_session(60_000).unwrap();
        let b = secrets.issue_session(60_000).unwrap();
        assert!(secrets.revoke_session(&a).unwrap());
        assert!(!secrets.revoke_session(&a).unwrap());
        assert!(!secrets.is_session_valid(&a));
        assert!(secrets.is_session_valid(&b));
    }
}
