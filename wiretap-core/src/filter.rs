use crate::error::DebuggerError;
use regex::Regex;

/// Compiled URL pattern that only matches whole URLs
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
}

impl UrlPattern {
    /// Compile `source` once. The expression is anchored on both ends so a
    /// match always covers the full URL.
    pub fn new(source: &str) -> Result<Self, DebuggerError> {
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
            DebuggerError::InvalidPattern {
                pattern: source.to_string(),
                source: e,
            }
        })?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Source text as sent by the debugger client
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

/// URL patterns whose traffic is exempt from action processing
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    patterns: Vec<UrlPattern>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern. Re-adding the same source text keeps a single entry.
    pub fn add(&mut self, pattern: UrlPattern) {
        if !self.patterns.iter().any(|p| p.as_str() == pattern.as_str()) {
            self.patterns.push(pattern);
        }
    }

    /// Remove by exact source text, returns whether anything was removed
    pub fn remove(&mut self, source: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.as_str() != source);
        before != self.patterns.len()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
