use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CcError;

struct CachedRegex {
    regex: Arc<Regex>,
    compiled_at: Instant,
}

/// Bounded cache of compiled trigger patterns, keyed by the full pattern text
pub struct RegexCache {
    entries: DashMap<String, CachedRegex>,
    ttl: Duration,
    capacity: usize,
}

impl RegexCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Return the compiled pattern, compiling it on a miss or after expiry.
    /// Compile failures are not cached.
    pub fn get(&self, pattern: &str) -> Result<Arc<Regex>, CcError> {
        if let Some(entry) = self.entries.get(pattern) {
            if entry.compiled_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.regex));
            }
        }

        let regex = Regex::new(pattern).map_err(|source| CcError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let regex = Arc::new(regex);

        if self.entries.len() >= self.capacity {
            self.evict();
        }
        self.entries.insert(
            pattern.to_string(),
            CachedRegex {
                regex: Arc::clone(&regex),
                compiled_at: Instant::now(),
            },
        );

        Ok(regex)
    }

    /// Drop expired entries, then the oldest ones if still full
    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.compiled_at.elapsed() < ttl);

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.compiled_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
