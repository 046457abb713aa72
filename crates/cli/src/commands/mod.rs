pub mod check_messages;
pub mod config;
pub mod migrate;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// Failure classes the operator commands report. Each maps to a fixed exit
/// code so scripts can branch without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    ConfigValidation,
    ReadFile,
    InvalidJson,
    RuntimeInit,
    InvalidMessages,
    DbConnectivity,
    Migration,
    KvSchema,
}

impl ErrorClass {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation | Self::ReadFile => 2,
            Self::InvalidJson | Self::RuntimeInit => 3,
            Self::InvalidMessages | Self::DbConnectivity => 4,
            Self::Migration => 5,
            Self::KvSchema => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Ok,
    Error,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: Status,
    error_class: Option<ErrorClass>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success_with_details(command: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let payload =
            CommandOutcome { command, status: Status::Ok, error_class: None, message: message.into(), details };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(command: &str, error_class: ErrorClass, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command,
            status: Status::Error,
            error_class: Some(error_class),
            message: message.into(),
            details: None,
        };
        Self { exit_code: error_class.exit_code(), output: serialize_payload(&payload) }
    }
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            payload.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{CommandResult, ErrorClass};

    #[test]
    fn failures_carry_the_class_exit_code() {
        let result = CommandResult::failure("migrate", ErrorClass::KvSchema, "plugin_kv table is missing");
        assert_eq!(result.exit_code, 6);

        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "kv_schema");
        assert!(payload.get("details").is_none());
    }

    #[test]
    fn successes_have_no_error_class() {
        let result = CommandResult::success_with_details("config", "ok", Some(json!({"teams": 2})));
        assert_eq!(result.exit_code, 0);

        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["error_class"], Value::Null);
        assert_eq!(payload["details"]["teams"], 2);
    }

    #[test]
    fn exit_codes_group_by_stage() {
        assert_eq!(ErrorClass::ConfigValidation.exit_code(), ErrorClass::ReadFile.exit_code());
        assert_eq!(ErrorClass::InvalidMessages.exit_code(), 4);
        assert_eq!(ErrorClass::Migration.exit_code(), 5);
    }
}
