//! Per-identity submission rate limiting
//!
//! One accepted submission per identity per rolling window, computed as
//! time since the last recorded submission. Two identity strategies sit
//! behind the same gate: the salted hash of the client network address
//! (server-enforced, default) or of the client session token (dev and
//! legacy fallback). Raw identities are never stored.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::net::IpAddr;
use sticky_common::config::{RateLimitConfig, RateLimitStrategy};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Proxy headers checked for the client address, most trusted first
const IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Anonymous identity of a submitter
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Opaque session token, minted server-side when the client has none
    pub session_token: String,
    /// Syntactically validated client address, when one could be extracted
    pub remote_ip: Option<String>,
}

/// Outcome of an eligibility check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eligibility {
    Allowed,
    Limited {
        /// Milliseconds until the identity may post again
        remaining_ms: i64,
    },
}

/// The rate-limit gate.
///
/// Durable records are the source of truth. When the store is
/// unreachable the gate degrades to an in-process map rather than
/// failing open to unlimited submissions or failing the whole request.
/// The map is an approximation that is not correct across multiple
/// server instances, and degraded checks are logged as such.
pub struct RateLimitGate {
    pool: SqlitePool,
    config: RateLimitConfig,
    fallback: Mutex<HashMap<String, i64>>,
}

impl RateLimitGate {
    pub fn new(pool: SqlitePool, config: RateLimitConfig) -> Self {
        Self {
            pool,
            config,
            fallback: Mutex::new(HashMap::new()),
        }
    }

    fn window_ms(&self) -> i64 {
        self.config.window_secs as i64 * 1000
    }

    /// Salted one-way hash of a raw identity
    pub fn hash_identity(&self, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.config.salt.as_bytes());
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Resolve the identifier hash the configured strategy keys on.
    ///
    /// The hashed-ip strategy degrades to the session token when no
    /// plausible address was extracted, so a request never bypasses the
    /// gate just by arriving without usable address headers.
    pub fn identity_key(&self, identity: &ClientIdentity) -> String {
        match self.config.strategy {
            RateLimitStrategy::HashedIp => match &identity.remote_ip {
                Some(ip) => self.hash_identity(ip),
                None => {
                    debug!("no client address available; keying on session token");
                    self.hash_identity(&identity.session_token)
                }
            },
            RateLimitStrategy::Session => self.hash_identity(&identity.session_token),
        }
    }

    /// May this identity submit right now?
    pub async fn check(&self, identity: &ClientIdentity, now_ms: i64) -> Eligibility {
        let key = self.identity_key(identity);

        let last_ms = match crate::db::rate_limits::most_recent_ms(&self.pool, &key).await {
            Ok(last) => last,
            Err(e) => {
                warn!(error = %e, "rate-limit store unreachable; using in-process fallback");
                self.fallback.lock().await.get(&key).copied()
            }
        };

        match last_ms {
            Some(last_ms) => {
                let elapsed = now_ms - last_ms;
                if elapsed < self.window_ms() {
                    Eligibility::Limited {
                        remaining_ms: self.window_ms() - elapsed,
                    }
                } else {
                    Eligibility::Allowed
                }
            }
            None => Eligibility::Allowed,
        }
    }

    /// Record an accepted submission. Called only after the note write
    /// succeeded, so a failed pipeline never consumes the allowance.
    /// Store failures are logged, never surfaced.
    pub async fn record(&self, identity: &ClientIdentity, note_id: Uuid, now_ms: i64) {
        let key = self.identity_key(identity);

        // Keep the in-process approximation warm so degraded checks
        // still see recent submissions. Entries past the window can
        // never influence a check again, so evict them here to keep the
        // map bounded by identities active within one window.
        {
            let mut fallback = self.fallback.lock().await;
            let window_ms = self.window_ms();
            fallback.retain(|_, ts| now_ms - *ts < window_ms);
            fallback.insert(key.clone(), now_ms);
        }

        if let Err(e) =
            crate::db::rate_limits::insert_record(&self.pool, &key, note_id, now_ms).await
        {
            warn!(error = %e, "failed to persist rate-limit record; in-process record kept");
        }
    }
}

/// Extract a syntactically plausible client address from the prioritized
/// proxy header list. `x-forwarded-for` may carry a comma-separated hop
/// chain; only the first hop counts.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    for name in IP_HEADERS {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let first_hop = value.split(',').next().unwrap_or("").trim();
        if first_hop.parse::<IpAddr>().is_ok() {
            return Some(first_hop.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use sticky_common::config::RateLimitConfig;

    fn header_map(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    async fn test_gate(strategy: RateLimitStrategy) -> RateLimitGate {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        RateLimitGate::new(
            pool,
            RateLimitConfig {
                strategy,
                window_secs: 86_400,
                salt: "test-salt".to_string(),
            },
        )
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let headers = header_map(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_header_priority_order() {
        let headers = header_map(&[
            ("cf-connecting-ip", "198.51.100.2"),
            ("x-real-ip", "192.0.2.44"),
        ]);
        // x-real-ip outranks cf-connecting-ip
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("192.0.2.44"));
    }

    #[test]
    fn test_implausible_address_skipped() {
        let headers = header_map(&[
            ("x-forwarded-for", "not-an-address"),
            ("x-real-ip", "::1"),
        ]);
        // Garbage first choice falls through; loopback IPv6 is plausible
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("::1"));
    }

    #[test]
    fn test_no_usable_header() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
        let headers = header_map(&[("x-forwarded-for", "999.999.1.1")]);
        assert_eq!(extract_client_ip(&headers), None);
    }

    #[tokio::test]
    async fn test_hash_is_salted_and_stable() {
        let gate = test_gate(RateLimitStrategy::HashedIp).await;
        let a = gate.hash_identity("203.0.113.7");
        let b = gate.hash_identity("203.0.113.7");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, gate.hash_identity("203.0.113.8"));
        // The raw address never appears in the hash
        assert!(!a.contains("203"));
    }

    #[tokio::test]
    async fn test_hashed_ip_strategy_falls_back_to_session() {
        let gate = test_gate(RateLimitStrategy::HashedIp).await;
        let with_ip = ClientIdentity {
            session_token: "tok".to_string(),
            remote_ip: Some("203.0.113.7".to_string()),
        };
        let without_ip = ClientIdentity {
            session_token: "tok".to_string(),
            remote_ip: None,
        };
        assert_eq!(gate.identity_key(&with_ip), gate.hash_identity("203.0.113.7"));
        assert_eq!(gate.identity_key(&without_ip), gate.hash_identity("tok"));
    }

    #[tokio::test]
    async fn test_second_submission_within_window_limited() {
        let gate = test_gate(RateLimitStrategy::Session).await;
        let identity = ClientIdentity {
            session_token: "tok-1".to_string(),
            remote_ip: None,
        };
        let now = 1_700_000_000_000i64;

        assert_eq!(gate.check(&identity, now).await, Eligibility::Allowed);
        gate.record(&identity, Uuid::new_v4(), now).await;

        match gate.check(&identity, now + 60_000).await {
            Eligibility::Limited { remaining_ms } => {
                assert_eq!(remaining_ms, 86_400_000 - 60_000);
            }
            Eligibility::Allowed => panic!("second submission within window must be limited"),
        }
    }

    #[tokio::test]
    async fn test_window_elapse_restores_eligibility() {
        let gate = test_gate(RateLimitStrategy::Session).await;
        let identity = ClientIdentity {
            session_token: "tok-2".to_string(),
            remote_ip: None,
        };
        let now = 1_700_000_000_000i64;

        gate.record(&identity, Uuid::new_v4(), now).await;
        assert_eq!(
            gate.check(&identity, now + 86_400_000).await,
            Eligibility::Allowed
        );
    }

    #[tokio::test]
    async fn test_store_outage_degrades_without_failing_open() {
        let gate = test_gate(RateLimitStrategy::Session).await;
        gate.pool.close().await;
        let identity = ClientIdentity {
            session_token: "tok-outage".to_string(),
            remote_ip: None,
        };
        let now = 1_700_000_000_000i64;

        // Unknown identity during an outage is allowed, not an error
        assert_eq!(gate.check(&identity, now).await, Eligibility::Allowed);

        // A recorded submission is still enforced via the in-process map
        gate.record(&identity, Uuid::new_v4(), now).await;
        match gate.check(&identity, now + 60_000).await {
            Eligibility::Limited { remaining_ms } => assert!(remaining_ms > 0),
            Eligibility::Allowed => panic!("store outage must not fail open"),
        }
    }

    #[tokio::test]
    async fn test_fallback_map_evicts_expired_entries() {
        let gate = test_gate(RateLimitStrategy::Session).await;
        let now = 1_700_000_000_000i64;
        let stale = ClientIdentity {
            session_token: "tok-stale".to_string(),
            remote_ip: None,
        };
        let fresh = ClientIdentity {
            session_token: "tok-fresh".to_string(),
            remote_ip: None,
        };

        gate.record(&stale, Uuid::new_v4(), now).await;
        // One window later the stale entry is dead weight; the next
        // record drops it.
        gate.record(&fresh, Uuid::new_v4(), now + 86_400_000).await;

        let fallback = gate.fallback.lock().await;
        assert_eq!(fallback.len(), 1);
        assert!(fallback.contains_key(&gate.identity_key(&fresh)));
    }

    #[tokio::test]
    async fn test_distinct_identities_independent() {
        let gate = test_gate(RateLimitStrategy::Session).await;
        let first = ClientIdentity {
            session_token: "tok-a".to_string(),
            remote_ip: None,
        };
        let second = ClientIdentity {
            session_token: "tok-b".to_string(),
            remote_ip: None,
        };
        let now = 1_700_000_000_000i64;

        gate.record(&first, Uuid::new_v4(), now).await;
        assert_eq!(gate.check(&second, now + 1000).await, Eligibility::Allowed);
    }
}
