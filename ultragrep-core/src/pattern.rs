use regex::Regex;

use crate::errors::{Result, UltragrepError};

/// A compiled search pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| UltragrepError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn test(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// First capture group of the first match.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Patterns a request must satisfy: every pattern has to match at least one
/// of the request's lines.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| Pattern::compile(pattern.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn matches_lines<S: AsRef<str>>(&self, lines: &[S]) -> bool {
        self.patterns
            .iter()
            .all(|pattern| lines.iter().any(|line| pattern.test(line.as_ref())))
    }

    /// Whether any pattern matches `line`.
    pub fn matches_any(&self, line: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.test(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_must_hit_some_line() {
        let set = PatternSet::compile(&["GET /users", "Completed 500"]).expect("compile");
        let hit = ["Started GET /users\n", "Completed 500 Internal\n"];
        let miss = ["Started GET /users\n", "Completed 200 OK\n"];

        assert!(set.matches_lines(&hit));
        assert!(!set.matches_lines(&miss));
    }

    #[test]
    fn empty_set_matches_everything() {
        let set = PatternSet::compile::<&str>(&[]).expect("compile");
        assert!(set.matches_lines(&["anything"]));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = Pattern::compile("(unclosed").expect_err("invalid");
        assert!(matches!(err, UltragrepError::InvalidPattern { .. }));
    }

    #[test]
    fn capture_returns_first_group() {
        let pattern = Pattern::compile(r#""(\w{6}:\w{6})""#).expect("compile");
        assert_eq!(
            pattern.capture(r#"{"session":"f6add2:a51f27"}"#),
            Some("f6add2:a51f27")
        );
        assert_eq!(pattern.capture("no session here"), None);
    }
}
