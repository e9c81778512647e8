use crate::bank::QuizBank;
use crate::recorder::ResultRecorder;
use crate::session::SessionRegistry;
use argon2::{password_hash::SaltString, Argon2, PasswordHasher};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One browser login, keyed by the value of the session cookie. The same key
/// also addresses the quiz session in the registry.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub username: String,
    pub student_name: Option<String>,
    pub csrf_token: String,
}

#[derive(Clone)]
pub struct AppState {
    pub bank: Arc<QuizBank>,
    pub registry: Arc<SessionRegistry>,
    pub logins: Arc<RwLock<HashMap<String, UserSession>>>,
    /// login -> argon2 hash, fixed at startup.
    pub credentials: Arc<HashMap<String, String>>,
    pub recorder: Arc<dyn ResultRecorder>,
}

impl AppState {
    pub fn new(
        bank: QuizBank,
        credentials: HashMap<String, String>,
        recorder: Arc<dyn ResultRecorder>,
    ) -> Self {
        Self {
            bank: Arc::new(bank),
            registry: Arc::new(SessionRegistry::new()),
            logins: Arc::new(RwLock::new(HashMap::new())),
            credentials: Arc::new(credentials),
            recorder,
        }
    }
}

/// Parses `login:password;login:password` and hashes each password. The
/// credential table is static for the process lifetime.
pub fn build_credentials(spec: &str) -> anyhow::Result<HashMap<String, String>> {
    let mut table = HashMap::new();
    for entry in spec.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (login, password) = entry
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("malformed credential entry '{entry}'"))?;
        let login = login.trim();
        if login.is_empty() || password.is_empty() {
            anyhow::bail!("malformed credential entry '{entry}'");
        }
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hash failed: {e}"))?
            .to_string();
        table.insert(login.to_string(), hash);
    }
    if table.is_empty() {
        anyhow::bail!("no login credentials configured");
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{PasswordHash, PasswordVerifier};

    #[test]
    fn build_credentials_parses_and_hashes() {
        let table = build_credentials("admin:secret123; jeremy:melbourne").unwrap();
        assert_eq!(table.len(), 2);

        let parsed = PasswordHash::new(&table["admin"]).unwrap();
        assert!(Argon2::default()
            .verify_password(b"secret123", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong", &parsed)
            .is_err());
    }

    #[test]
    fn build_credentials_rejects_malformed_entries() {
        assert!(build_credentials("").is_err());
        assert!(build_credentials("no-colon-here").is_err());
        assert!(build_credentials(":empty-login").is_err());
    }
}
