//! Provider credentials
//!
//! Credential vending is owned by an external collaborator. This module
//! defines the seam ([`CredentialSource`]), an environment-backed source and a
//! caching wrapper that refreshes sessions shortly before they expire.

use crate::config::DatabaseSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Refresh sessions this much before they actually expire
const SESSION_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Session TTL used when the source does not report an expiry
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Short-lived credentials for one account
#[derive(Debug, Clone)]
pub struct Session {
    pub account_id: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Vends short-lived sessions
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Acquire a session for an account
    async fn session(&self, account_id: &str) -> Result<Session>;

    /// Acquire a short-lived password for the persistence store
    async fn database_token(&self, settings: &DatabaseSettings) -> Result<String> {
        let _ = settings;
        anyhow::bail!("This credential source cannot vend database credentials")
    }
}

/// Reads session tokens from the environment
///
/// `TAGSWEEP_SESSION_TOKEN_<ACCOUNT>` takes precedence over
/// `TAGSWEEP_SESSION_TOKEN`. The database token comes from `DB_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn session(&self, account_id: &str) -> Result<Session> {
        let token = std::env::var(format!("TAGSWEEP_SESSION_TOKEN_{}", account_id))
            .or_else(|_| std::env::var("TAGSWEEP_SESSION_TOKEN"))
            .with_context(|| {
                format!(
                    "No session token for account {}. Set TAGSWEEP_SESSION_TOKEN",
                    account_id
                )
            })?;

        Ok(Session {
            account_id: account_id.to_string(),
            token,
            expires_at: None,
        })
    }

    async fn database_token(&self, settings: &DatabaseSettings) -> Result<String> {
        std::env::var("DB_TOKEN")
            .with_context(|| format!("No database token for {}@{}", settings.user, settings.endpoint))
    }
}

#[derive(Clone)]
struct CachedSession {
    session: Session,
    /// When this session must be refreshed (with buffer applied)
    refresh_at: Instant,
}

impl CachedSession {
    fn is_valid(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

/// Per-account session cache in front of another source
#[derive(Clone)]
pub struct CachedCredentials {
    source: Arc<dyn CredentialSource>,
    cache: Arc<RwLock<HashMap<String, CachedSession>>>,
}

impl CachedCredentials {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop the cached session for an account
    pub async fn invalidate(&self, account_id: &str) {
        self.cache.write().await.remove(account_id);
    }
}

/// Compute when a session should be refreshed
fn refresh_deadline(expires_at: Option<DateTime<Utc>>) -> Instant {
    let ttl = expires_at
        .and_then(|at| (at - Utc::now()).to_std().ok())
        .unwrap_or(DEFAULT_SESSION_TTL);

    Instant::now() + ttl.saturating_sub(SESSION_EXPIRY_BUFFER)
}

#[async_trait]
impl CredentialSource for CachedCredentials {
    async fn session(&self, account_id: &str) -> Result<Session> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(account_id) {
                if cached.is_valid() {
                    return Ok(cached.session.clone());
                }
                tracing::debug!("Cached session for {} expired, refreshing", account_id);
            }
        }

        let session = self.source.session(account_id).await?;
        let refresh_at = refresh_deadline(session.expires_at);

        self.cache.write().await.insert(
            account_id.to_string(),
            CachedSession {
                session: session.clone(),
                refresh_at,
            },
        );

        Ok(session)
    }

    async fn database_token(&self, settings: &DatabaseSettings) -> Result<String> {
        self.source.database_token(settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        expires_at: Option<DateTime<Utc>>,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn session(&self, account_id: &str) -> Result<Session> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                account_id: account_id.to_string(),
                token: format!("token-{}", n),
                expires_at: self.expires_at,
            })
        }
    }

    #[tokio::test]
    async fn test_cache_reuses_valid_session() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            expires_at: None,
        });
        let cached = CachedCredentials::new(source.clone());

        let first = cached.session("111111111111").await.unwrap();
        let second = cached.session("111111111111").await.unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_refreshes_nearly_expired_session() {
        // Expires inside the refresh buffer, so it is never considered valid
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(10)),
        });
        let cached = CachedCredentials::new(source.clone());

        cached.session("111111111111").await.unwrap();
        cached.session("111111111111").await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            expires_at: None,
        });
        let cached = CachedCredentials::new(source.clone());

        cached.session("222222222222").await.unwrap();
        cached.invalidate("222222222222").await;
        let session = cached.session("222222222222").await.unwrap();

        assert_eq!(session.token, "token-1");
    }
}
