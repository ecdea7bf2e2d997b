use crate::config::CustomFormatConfig;
use crate::errors::Result;
use crate::format::{LineInterpreter, LineIssue};
use crate::pattern::Pattern;
use crate::time::parse_timestamp;

/// A format declared in the configuration file through regular expressions.
#[derive(Debug, Clone)]
pub struct RegexFormat {
    start: Option<Pattern>,
    time: Pattern,
    time_format: String,
    key: Option<Pattern>,
    end: Option<Pattern>,
}

impl RegexFormat {
    pub fn from_config(config: &CustomFormatConfig) -> Result<Self> {
        Ok(Self {
            start: compile_optional(config.start_pattern.as_deref())?,
            time: Pattern::compile(&config.time_pattern)?,
            time_format: config.time_format.clone(),
            key: compile_optional(config.key_pattern.as_deref())?,
            end: compile_optional(config.end_pattern.as_deref())?,
        })
    }
}

fn compile_optional(pattern: Option<&str>) -> Result<Option<Pattern>> {
    pattern.map(Pattern::compile).transpose()
}

impl LineInterpreter for RegexFormat {
    fn is_boundary(&self, line: &str) -> bool {
        self.start.as_ref().is_some_and(|start| start.test(line))
    }

    fn extract_time(&self, line: &str) -> std::result::Result<Option<u64>, LineIssue> {
        match self.time.capture(line) {
            Some(text) => parse_timestamp(text, &self.time_format)
                .map(Some)
                .ok_or(LineIssue::UnparsableTime),
            None => Ok(None),
        }
    }

    fn extract_key(&self, line: &str) -> Option<String> {
        self.key
            .as_ref()
            .and_then(|key| key.capture(line))
            .map(str::to_string)
    }

    fn ends_unit(&self, line: &str) -> bool {
        self.end.as_ref().is_some_and(|end| end.test(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UltragrepError;
    use crate::format::MatcherKind;

    fn nginx() -> CustomFormatConfig {
        CustomFormatConfig {
            name: "nginx".into(),
            kind: MatcherKind::OneLine,
            start_pattern: None,
            time_pattern: r"\[(\d{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2})".into(),
            time_format: "%d/%b/%Y:%H:%M:%S".into(),
            key_pattern: None,
            end_pattern: None,
            blank_lines: 0,
        }
    }

    #[test]
    fn parses_with_configured_layout() {
        let format = RegexFormat::from_config(&nginx()).expect("format");
        let line = r#"10.0.0.1 - - [14/Nov/2023:22:13:20 +0000] "GET / HTTP/1.1" 200"#;
        assert_eq!(format.extract_time(line), Ok(Some(1_700_000_000)));
        assert!(!format.is_boundary(line));
        assert_eq!(format.extract_key(line), None);
    }

    #[test]
    fn session_patterns_are_optional_but_used() {
        let mut config = nginx();
        config.kind = MatcherKind::Session;
        config.key_pattern = Some(r"job=(\w+)".into());
        config.end_pattern = Some("done$".into());
        let format = RegexFormat::from_config(&config).expect("format");

        assert_eq!(format.extract_key("job=abc step 1").as_deref(), Some("abc"));
        assert!(format.ends_unit("job=abc done"));
    }

    #[test]
    fn invalid_patterns_fail_at_construction() {
        let mut config = nginx();
        config.start_pattern = Some("([".into());
        assert!(matches!(
            RegexFormat::from_config(&config),
            Err(UltragrepError::InvalidPattern { .. })
        ));
    }
}
