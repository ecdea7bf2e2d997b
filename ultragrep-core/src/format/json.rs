use serde_json::Value;

use crate::format::{LineInterpreter, LineIssue};
use crate::time::parse_time_spec;

/// Field holding the record timestamp.
pub const TIME_FIELD: &str = "time";

/// One JSON document per line.
#[derive(Debug, Clone, Default)]
pub struct JsonFormat;

impl JsonFormat {
    pub fn new() -> Self {
        Self
    }
}

impl LineInterpreter for JsonFormat {
    fn extract_time(&self, line: &str) -> Result<Option<u64>, LineIssue> {
        let value: Value =
            serde_json::from_str(line.trim()).map_err(|_| LineIssue::MalformedPayload)?;
        let object = value.as_object().ok_or(LineIssue::MalformedPayload)?;

        match object.get(TIME_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number
                .as_u64()
                .filter(|secs| *secs > 0)
                .map(Some)
                .ok_or(LineIssue::UnparsableTime),
            Some(Value::String(text)) => parse_time_spec(text)
                .ok()
                .filter(|secs| *secs > 0)
                .map(Some)
                .ok_or(LineIssue::UnparsableTime),
            Some(_) => Err(LineIssue::UnparsableTime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(r#"{"time":"2023-11-14 22:13:20","msg":"hi"}"#, Ok(Some(1_700_000_000)) ; "string time")]
    #[test_case(r#"{"time":1700000000}"#, Ok(Some(1_700_000_000)) ; "epoch time")]
    #[test_case(r#"{"msg":"no time"}"#, Ok(None) ; "missing time")]
    #[test_case(r#"{"time":"last tuesday"}"#, Err(LineIssue::UnparsableTime) ; "garbage time")]
    #[test_case(r#"{"time":"2023-11-14"#, Err(LineIssue::MalformedPayload) ; "truncated json")]
    #[test_case("[1,2,3]", Err(LineIssue::MalformedPayload) ; "not an object")]
    fn extracts_time(line: &str, expected: Result<Option<u64>, LineIssue>) {
        assert_eq!(JsonFormat::new().extract_time(line), expected);
    }
}
