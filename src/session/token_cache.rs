use crate::session::error::SessionError;
use crate::session::store::TokenStore;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use std::sync::Arc;

pub const TOKEN_KEY: &str = "token.txt";
pub const TOKEN_TIME_KEY: &str = "token_time.txt";

/// Issued tokens are assumed valid for one hour. The token endpoint does not
/// report an expiry.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// A bearer token and the moment it was issued.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            issued_at,
        }
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.issued_at) < ttl
    }
}

/// Decimal UNIX timestamp with microsecond fraction, e.g. `1712345678.250000`.
fn encode_timestamp(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

fn decode_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let value: f64 = text.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let secs = value.floor();
    let nanos = ((value - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// The two-entry token record kept in a [`TokenStore`].
///
/// A record is only trusted when both entries are present and parse; a token
/// without a readable timestamp (or the reverse) is treated as no record.
pub struct TokenCache {
    store: Arc<dyn TokenStore>,
    ttl: Duration,
}

impl TokenCache {
    pub fn new(store: Arc<dyn TokenStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads the stored record regardless of age.
    pub fn load(&self) -> Result<Option<TokenRecord>, SessionError> {
        let token = self.store.read(TOKEN_KEY)?;
        let issued_at = self.store.read(TOKEN_TIME_KEY)?;
        let (Some(token), Some(issued_at)) = (token, issued_at) else {
            debug!("no cached token record");
            return Ok(None);
        };

        let Ok(token) = String::from_utf8(token) else {
            warn!("cached token is not valid UTF-8, ignoring it");
            return Ok(None);
        };
        let issued_at = String::from_utf8_lossy(&issued_at);
        let Some(issued_at) = decode_timestamp(&issued_at) else {
            warn!("cached token timestamp '{}' is unreadable, ignoring it", issued_at.trim());
            return Ok(None);
        };
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(TokenRecord::new(token, issued_at)))
    }

    /// The cached token if it was issued less than `ttl` before `now`.
    pub fn fresh_token(&self, now: DateTime<Utc>) -> Result<Option<String>, SessionError> {
        Ok(self
            .load()?
            .filter(|record| record.is_fresh(self.ttl, now))
            .map(|record| record.token))
    }

    /// Overwrites both entries.
    pub fn save(&self, record: &TokenRecord) -> Result<(), SessionError> {
        self.store.write(TOKEN_KEY, record.token.as_bytes())?;
        self.store
            .write(TOKEN_TIME_KEY, encode_timestamp(record.issued_at).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::{FileStore, MemoryStore};

    fn cache_with(store: Arc<dyn TokenStore>) -> TokenCache {
        TokenCache::new(store, Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }

    #[test]
    fn timestamp_encoding_keeps_subsecond_precision() {
        let at = DateTime::from_timestamp(1_712_345_678, 250_000_000).unwrap();
        assert_eq!(encode_timestamp(at), "1712345678.250000");
        assert_eq!(decode_timestamp("1712345678.250000"), Some(at));
    }

    #[test]
    fn plain_integer_and_float_timestamps_decode() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(decode_timestamp("1700000000"), Some(at));
        assert_eq!(decode_timestamp(" 1700000000.0\n"), Some(at));
        assert_eq!(decode_timestamp("yesterday"), None);
        assert_eq!(decode_timestamp("NaN"), None);
    }

    #[test]
    fn record_freshness_boundary() {
        let ttl = Duration::seconds(3600);
        let issued = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = TokenRecord::new("tok", issued);

        assert!(record.is_fresh(ttl, issued + Duration::seconds(3599)));
        assert!(!record.is_fresh(ttl, issued + Duration::seconds(3600)));
        assert!(!record.is_fresh(ttl, issued + Duration::seconds(7200)));
    }

    #[test]
    fn save_then_load_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(Arc::new(FileStore::new(dir.path())));
        let issued = Utc::now();

        cache.save(&TokenRecord::new("tok1", issued)).unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join(TOKEN_KEY)).unwrap(),
            "tok1"
        );
        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.token, "tok1");
        assert!((loaded.issued_at - issued).num_milliseconds().abs() <= 1);
    }

    #[test]
    fn half_written_record_is_not_trusted() {
        let store = Arc::new(MemoryStore::new());
        store.write(TOKEN_KEY, b"tok1").unwrap();
        let cache = cache_with(store.clone());
        assert_eq!(cache.load().unwrap(), None);

        let store = Arc::new(MemoryStore::new());
        store.write(TOKEN_TIME_KEY, b"1700000000").unwrap();
        let cache = cache_with(store);
        assert_eq!(cache.load().unwrap(), None);
    }

    #[test]
    fn corrupt_timestamp_is_not_trusted() {
        let store = Arc::new(MemoryStore::new());
        store.write(TOKEN_KEY, b"tok1").unwrap();
        store.write(TOKEN_TIME_KEY, b"not a number").unwrap();
        assert_eq!(cache_with(store).load().unwrap(), None);
    }

    #[test]
    fn fresh_token_filters_by_age() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(store);
        let now = Utc::now();

        cache
            .save(&TokenRecord::new("old", now - Duration::seconds(4000)))
            .unwrap();
        assert_eq!(cache.fresh_token(now).unwrap(), None);

        cache
            .save(&TokenRecord::new("new", now - Duration::seconds(10)))
            .unwrap();
        assert_eq!(cache.fresh_token(now).unwrap(), Some("new".to_string()));
    }
}
