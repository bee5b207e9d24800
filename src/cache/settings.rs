//! Serializable cache settings, for loading from configuration files.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::engine::StoreEngine;
use crate::http::{InvalidStatusCode, StatusCode};
use crate::key::DefaultKeyGenerator;
use crate::store::Store;

/// Errors produced while loading [`Settings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Status(#[from] InvalidStatusCode),

    #[error("ttl_ms must be greater than zero")]
    ZeroTtl,
}

/// Plain-data cache configuration.
///
/// Every field is optional in the serialized form and falls back to the
/// same default as [`Builder`](super::Builder).
///
/// `ttl_ms` and `cacheable_status_codes` configure the transport through
/// [`Builder::settings`](super::Builder::settings). `partition` is part of the
/// key strategy, which lives in the engine: build it with
/// [`engine`](Self::engine) (or wire [`key_generator`](Self::key_generator)
/// into your own engine).
///
/// ```
/// use transcache::cache::{CachingTransport, Settings};
/// use transcache::store::MemoryStore;
///
/// let settings = Settings::from_json(r#"{ "ttl_ms": 30000, "partition": "billing" }"#).unwrap();
/// assert_eq!(settings.cacheable_status_codes, vec![200]);
/// assert_eq!(settings.ttl().as_secs(), 30);
///
/// let client = CachingTransport::builder(settings.engine(MemoryStore::new()))
///     .settings(&settings)
///     .unwrap()
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Lifetime of stored entries, in milliseconds.
    pub ttl_ms: u64,
    /// Status codes whose responses are stored.
    pub cacheable_status_codes: Vec<u16>,
    /// Key prefix separating this client's entries from others sharing a store.
    pub partition: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            cacheable_status_codes: vec![200],
            partition: String::new(),
        }
    }
}

impl Settings {
    /// Parses and validates settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, a zero TTL, or a status code outside `100..=999`.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// The fingerprinting strategy for this partition.
    pub fn key_generator(&self) -> DefaultKeyGenerator {
        DefaultKeyGenerator::new(self.partition.clone())
    }

    /// A [`StoreEngine`] over `store` keyed with this partition.
    pub fn engine<S: Store>(&self, store: S) -> StoreEngine<S> {
        StoreEngine::new(store).key_generator(self.key_generator())
    }

    pub(crate) fn status_codes(&self) -> Result<HashSet<StatusCode>, InvalidStatusCode> {
        self.cacheable_status_codes
            .iter()
            .map(|&code| StatusCode::from_u16(code))
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<(), SettingsError> {
        if self.ttl_ms == 0 {
            return Err(SettingsError::ZeroTtl);
        }
        self.status_codes()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.ttl(), Duration::from_secs(60));
        assert_eq!(settings.key_generator().partition(), "");
    }

    #[test]
    fn fields_are_read() {
        let settings = Settings::from_json(
            r#"{ "ttl_ms": 1500, "cacheable_status_codes": [200, 404], "partition": "svc" }"#,
        )
        .unwrap();
        assert_eq!(settings.ttl(), Duration::from_millis(1500));
        let codes = settings.status_codes().unwrap();
        assert!(codes.contains(&StatusCode::OK));
        assert!(codes.contains(&StatusCode::NOT_FOUND));
        assert_eq!(settings.key_generator().partition(), "svc");
    }

    #[tokio::test]
    async fn engine_keys_carry_partition() {
        use crate::engine::CacheEngine;
        use crate::http::Request;
        use crate::store::MemoryStore;

        let settings = Settings::from_json(r#"{ "partition": "billing" }"#).unwrap();
        let engine = settings.engine(MemoryStore::new());
        let mut req = Request::get("http://example.com/invoices").unwrap();
        assert!(engine.key(&mut req).await.unwrap().starts_with("billing_"));
    }

    #[test]
    fn empty_status_set_is_allowed() {
        let settings = Settings::from_json(r#"{ "cacheable_status_codes": [] }"#).unwrap();
        assert!(settings.status_codes().unwrap().is_empty());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Settings::from_json(r#"{ "ttl_ms": 0 }"#),
            Err(SettingsError::ZeroTtl)
        ));
        assert!(matches!(
            Settings::from_json(r#"{ "cacheable_status_codes": [42] }"#),
            Err(SettingsError::Status(InvalidStatusCode(42)))
        ));
        assert!(matches!(
            Settings::from_json("not json"),
            Err(SettingsError::Json(_))
        ));
    }
}
