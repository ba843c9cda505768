//! Domain allow-list.
//!
//! # Design Decisions
//! - Empty list = every domain allowed (default-open)
//! - A pattern admits a domain when it matches at the start of the domain,
//!   not the whole of it: `api\.example` admits `api.example.com`
//! - Readers load a snapshot through `ArcSwap`; writers swap in a new list

use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;

/// A pattern as supplied by the operator, plus its anchored compilation.
#[derive(Debug, Clone)]
pub struct AllowListPattern {
    pattern: String,
    anchored: Regex,
}

impl AllowListPattern {
    /// Compile a pattern. The raw pattern must be valid on its own.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern)?;
        let anchored = Regex::new(&format!(r"\A(?:{pattern})"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            anchored,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// True if the pattern matches a prefix of `domain`.
    pub fn matches(&self, domain: &str) -> bool {
        self.anchored.is_match(domain)
    }
}

/// Mutable, shared list of allow-list patterns.
pub struct AllowList {
    patterns: ArcSwap<Vec<AllowListPattern>>,
}

impl AllowList {
    /// Build from configured patterns; fails on the first one that does not compile.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let mut compiled: Vec<AllowListPattern> = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = AllowListPattern::compile(pattern.as_ref())?;
            if !compiled.iter().any(|p| p.pattern == pattern.pattern) {
                compiled.push(pattern);
            }
        }
        Ok(Self {
            patterns: ArcSwap::from_pointee(compiled),
        })
    }

    pub fn empty() -> Self {
        Self {
            patterns: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Check a domain against the current patterns.
    pub fn is_allowed(&self, domain: &str) -> bool {
        let patterns = self.patterns.load();
        patterns.is_empty() || patterns.iter().any(|p| p.matches(domain))
    }

    /// Pattern strings in insertion order.
    pub fn patterns(&self) -> Vec<String> {
        self.patterns
            .load()
            .iter()
            .map(|p| p.pattern.clone())
            .collect()
    }

    /// Add a pattern. Returns `Ok(false)` if it is already present.
    pub fn add(&self, pattern: &str) -> Result<bool, regex::Error> {
        let compiled = AllowListPattern::compile(pattern)?;
        let mut added = false;
        self.patterns.rcu(|current| {
            if current.iter().any(|p| p.pattern == pattern) {
                added = false;
                return Arc::clone(current);
            }
            added = true;
            let mut next = Vec::clone(current);
            next.push(compiled.clone());
            Arc::new(next)
        });
        if added {
            tracing::info!(pattern = %pattern, "Allow-list pattern added");
        }
        Ok(added)
    }

    /// Remove a pattern by exact string. Returns `false` if it was not present.
    pub fn remove(&self, pattern: &str) -> bool {
        let mut removed = false;
        self.patterns.rcu(|current| {
            removed = current.iter().any(|p| p.pattern == pattern);
            if !removed {
                return Arc::clone(current);
            }
            let next: Vec<AllowListPattern> = current
                .iter()
                .filter(|p| p.pattern != pattern)
                .cloned()
                .collect();
            Arc::new(next)
        });
        if removed {
            tracing::info!(pattern = %pattern, "Allow-list pattern removed");
        }
        removed
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::empty()
    }
}
