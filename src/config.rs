//! Centralized configuration for store instances.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - StoreConfig::from_env() reads the same env vars the process can set
//!   ahead of time; fluent with_* setters override per instance.
//!
//! Env:
//! - BP_STORE_ROOT       — root directory for chapter files (default ".pfile")
//! - BP_STORE_CACHE_SIZE — reclaim cache entries (default 16384; 0 => default)
//! - BP_STORE_FLUSH      — flush after every enqueue (default true;
//!                         "0|false|off|no" => false)

use std::fmt;

use crate::consts::{STORE_DEFAULT_CACHE_SIZE, STORE_DEFAULT_ROOT};

/// Per-store configuration, consumed by `store::create`.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Root directory for chapter/table files.
    pub root_path: String,

    /// Reclaim cache capacity in entries. 0 means "use default".
    pub cache_size: usize,

    /// Flush the write descriptor after every enqueue.
    pub flush: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_path: STORE_DEFAULT_ROOT.to_string(),
            cache_size: STORE_DEFAULT_CACHE_SIZE,
            flush: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("BP_STORE_ROOT") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.root_path = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("BP_STORE_CACHE_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.cache_size = n;
            }
        }

        if let Ok(v) = std::env::var("BP_STORE_FLUSH") {
            let s = v.trim().to_ascii_lowercase();
            cfg.flush = !(s == "0" || s == "false" || s == "off" || s == "no");
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_root_path<S: Into<String>>(mut self, root: S) -> Self {
        self.root_path = root.into();
        self
    }

    pub fn with_cache_size(mut self, entries: usize) -> Self {
        self.cache_size = entries;
        self
    }

    pub fn with_flush(mut self, on: bool) -> Self {
        self.flush = on;
        self
    }

    /// Effective cache size (0 falls back to the default).
    pub fn effective_cache_size(&self) -> usize {
        if self.cache_size == 0 {
            STORE_DEFAULT_CACHE_SIZE
        } else {
            self.cache_size
        }
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreConfig {{ root_path: {}, cache_size: {}, flush: {} }}",
            self.root_path,
            self.effective_cache_size(),
            self.flush,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store_constants() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.root_path, ".pfile");
        assert_eq!(cfg.cache_size, 16384);
        assert!(cfg.flush);
    }

    #[test]
    fn zero_cache_size_falls_back_to_default() {
        let cfg = StoreConfig::default().with_cache_size(0);
        assert_eq!(cfg.effective_cache_size(), 16384);
    }
}
