//! Runtime settings read from the environment.

use crate::filter::FilterMode;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 28_800;
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// How writes invalidate cached reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Flush the whole cache namespace on any write.
    All,
    /// Flush only entries whose query read the written table, including tables joined
    /// in through `with` relations.
    Resource,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub config_path: String,
    pub bind_addr: String,
    /// `0` disables caching.
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
    pub invalidation: InvalidationScope,
    pub filter_mode: FilterMode,
    pub trust_subject_header: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/autoresource".into(),
            config_path: "config".into(),
            bind_addr: "0.0.0.0:3000".into(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            invalidation: InvalidationScope::All,
            filter_mode: FilterMode::Permissive,
            trust_subject_header: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unparseable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        if let Some(v) = lookup("DATABASE_URL") {
            s.database_url = v;
        }
        if let Some(v) = lookup("AUTORESOURCE_CONFIG_PATH") {
            s.config_path = v;
        }
        if let Some(v) = lookup("AUTORESOURCE_BIND") {
            s.bind_addr = v;
        }
        if let Some(v) = lookup("AUTORESOURCE_CACHE_TTL") {
            match v.trim().parse::<u64>() {
                Ok(n) => s.cache_ttl_secs = n,
                Err(_) => tracing::warn!(value = %v, "AUTORESOURCE_CACHE_TTL is not an integer, keeping default"),
            }
        }
        if let Some(v) = lookup("AUTORESOURCE_CACHE_CAPACITY") {
            if let Ok(n) = v.trim().parse::<u64>() {
                s.cache_capacity = n;
            }
        }
        if let Some(v) = lookup("AUTORESOURCE_CACHE_INVALIDATION") {
            s.invalidation = match v.trim().to_lowercase().as_str() {
                "resource" => InvalidationScope::Resource,
                "all" => InvalidationScope::All,
                other => {
                    tracing::warn!(value = %other, "unknown cache invalidation scope, using 'all'");
                    InvalidationScope::All
                }
            };
        }
        if let Some(v) = lookup("AUTORESOURCE_FILTER_MODE") {
            s.filter_mode = v.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %v, "unknown filter mode, using permissive");
                FilterMode::Permissive
            });
        }
        if let Some(v) = lookup("AUTORESOURCE_TRUST_SUBJECT_HEADER") {
            s.trust_subject_header = matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_env_empty() {
        let s = Settings::from_lookup(lookup(&[]));
        assert_eq!(s.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
        assert_eq!(s.filter_mode, FilterMode::Permissive);
        assert_eq!(s.invalidation, InvalidationScope::All);
        assert!(!s.trust_subject_header);
    }

    #[test]
    fn zero_ttl_and_paranoid_mode() {
        let s = Settings::from_lookup(lookup(&[
            ("AUTORESOURCE_CACHE_TTL", "0"),
            ("AUTORESOURCE_FILTER_MODE", "Paranoid"),
            ("AUTORESOURCE_CACHE_INVALIDATION", "resource"),
        ]));
        assert_eq!(s.cache_ttl_secs, 0);
        assert_eq!(s.filter_mode, FilterMode::Paranoid);
        assert_eq!(s.invalidation, InvalidationScope::Resource);
    }

    #[test]
    fn non_integer_ttl_keeps_default() {
        let s = Settings::from_lookup(lookup(&[("AUTORESOURCE_CACHE_TTL", "1.5")]));
        assert_eq!(s.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }
}
