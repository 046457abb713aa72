use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use welcomebot_core::settings::parse_welcome_messages;
use welcomebot_core::WILDCARD_TEAM;

use crate::commands::{CommandResult, ErrorClass};

/// Runs the plugin settings in `path` through the same parsing and migration
/// the bot applies on activation.
pub fn run(path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "check-messages",
                ErrorClass::ReadFile,
                format!("failed to read {}: {error}", path.display()),
            );
        }
    };

    let document: Value = match serde_json::from_str(&raw) {
        Ok(document) => document,
        Err(error) => {
            return CommandResult::failure(
                "check-messages",
                ErrorClass::InvalidJson,
                format!("{} is not valid JSON: {error}", path.display()),
            );
        }
    };

    let messages = match parse_welcome_messages(&document) {
        Ok(messages) => messages,
        Err(error) => {
            return CommandResult::failure("check-messages", ErrorClass::InvalidMessages, error.to_string());
        }
    };

    let mut teams: Vec<&str> = Vec::new();
    for message in messages.iter().filter(|message| !message.is_global()) {
        if !teams.contains(&message.team_name.as_str()) {
            teams.push(&message.team_name);
        }
    }
    let global = messages.iter().filter(|message| message.is_global()).count();
    let buttons: usize = messages.iter().map(|message| message.button_actions().count()).sum();

    let summary = if teams.is_empty() {
        format!("{} welcome messages, no team messages", messages.len())
    } else {
        format!("{} welcome messages for teams: {}", messages.len(), teams.join(", "))
    };

    CommandResult::success_with_details(
        "check-messages",
        summary,
        Some(json!({
            "teams": teams,
            "all_teams": teams.contains(&WILDCARD_TEAM),
            "messages": messages.len(),
            "global_messages": global,
            "button_actions": buttons,
        })),
    )
}
