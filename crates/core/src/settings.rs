//! Plugin configuration parsing and the live welcome message list.
//!
//! The host stores plugin settings as loosely typed JSON: keys may arrive
//! lowercased, `WelcomeMessages` may be an embedded JSON string, and older
//! configurations hold multi-line fields as a single string. Everything is
//! normalized here before it reaches the typed [`ConfigMessage`] model.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};

use crate::domain::message::{ConfigMessage, ConfigMessageAction};
use crate::domain::model::User;
use crate::errors::SettingsError;

const WELCOME_MESSAGES_KEY: &str = "welcomemessages";
const MESSAGE_LINE_FIELDS: [&str; 3] = ["message", "attachmentmessage", "globalwelcomemessage"];
const ACTION_LINE_FIELDS: [&str; 1] = ["actionsuccessfulmessage"];
const ACTION_TYPES: [&str; 2] = ["automatic", "button"];
/// Spelling written by the admin console.
const ACTION_SUCCESS_MISSPELLED: &str = "actionsuccessfullmessage";

/// Parses the host's plugin configuration into validated welcome messages.
pub fn parse_welcome_messages(configuration: &Value) -> Result<Vec<ConfigMessage>, SettingsError> {
    let root = match lowercase_keys(configuration.clone()) {
        Value::Object(root) => root,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(SettingsError::NotAnObject),
    };

    let entries = match root.get(WELCOME_MESSAGES_KEY) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(raw)) if raw.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(raw)) => {
            let decoded: Value = serde_json::from_str(raw)
                .map_err(|error| SettingsError::EmbeddedJson(error.to_string()))?;
            match lowercase_keys(decoded) {
                Value::Null => return Ok(Vec::new()),
                Value::Array(entries) => entries,
                _ => return Err(SettingsError::NotAList),
            }
        }
        Some(Value::Array(entries)) => entries.clone(),
        Some(_) => return Err(SettingsError::NotAList),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| parse_message(position + 1, entry))
        .collect()
}

fn parse_message(index: usize, entry: Value) -> Result<ConfigMessage, SettingsError> {
    let Value::Object(mut fields) = entry else {
        return Err(SettingsError::invalid(index, "expected an object"));
    };

    migrate_line_fields(&mut fields, &MESSAGE_LINE_FIELDS);
    migrate_scalar_fields(&mut fields);
    if let Some(Value::Array(actions)) = fields.get_mut("actions") {
        for action in actions.iter_mut() {
            let Value::Object(action_fields) = action else {
                return Err(SettingsError::invalid(index, "actions must be objects"));
            };
            migrate_action(index, action_fields)?;
        }
    } else if matches!(fields.get("actions"), Some(Value::Null)) {
        fields.remove("actions");
    }

    let message: ConfigMessage = serde_json::from_value(Value::Object(fields))
        .map_err(|error| SettingsError::invalid(index, error.to_string()))?;
    validate_message(index, &message)?;
    Ok(message)
}

fn migrate_action(index: usize, fields: &mut Map<String, Value>) -> Result<(), SettingsError> {
    if let Some(Value::String(action_type)) = fields.get_mut("actiontype") {
        let normalized = action_type.trim().to_ascii_lowercase();
        if !ACTION_TYPES.contains(&normalized.as_str()) {
            return Err(SettingsError::invalid(
                index,
                format!("unknown ActionType `{action_type}`, expected `automatic` or `button`"),
            ));
        }
        *action_type = normalized;
    }

    if let Some(value) = fields.remove(ACTION_SUCCESS_MISSPELLED) {
        fields.entry(ACTION_LINE_FIELDS[0]).or_insert(value);
    }
    migrate_line_fields(fields, &ACTION_LINE_FIELDS);
    match fields.get("channelsaddedto") {
        Some(Value::String(raw)) => {
            let channels = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| Value::String(name.to_owned()))
                .collect();
            fields.insert("channelsaddedto".to_owned(), Value::Array(channels));
        }
        Some(Value::Null) => {
            fields.remove("channelsaddedto");
        }
        _ => {}
    }
    Ok(())
}

/// The admin console saves `includeGuests` as `"true"`/`"false"`, and a
/// negative delay means no delay.
fn migrate_scalar_fields(fields: &mut Map<String, Value>) {
    match fields.get("includeguests") {
        Some(Value::String(raw)) => {
            let include = raw.trim().eq_ignore_ascii_case("true");
            fields.insert("includeguests".to_owned(), Value::Bool(include));
        }
        Some(Value::Null) => {
            fields.remove("includeguests");
        }
        _ => {}
    }

    match fields.get("delayinseconds") {
        Some(Value::Number(number)) if number.as_f64().is_some_and(|delay| delay < 0.0) => {
            fields.insert("delayinseconds".to_owned(), Value::from(0u64));
        }
        Some(Value::Null) => {
            fields.remove("delayinseconds");
        }
        _ => {}
    }
}

fn migrate_line_fields(fields: &mut Map<String, Value>, names: &[&str]) {
    for name in names {
        match fields.get(*name) {
            Some(Value::String(raw)) => {
                let lines = raw.lines().map(|line| Value::String(line.to_owned())).collect();
                fields.insert((*name).to_owned(), Value::Array(lines));
            }
            Some(Value::Null) => {
                fields.remove(*name);
            }
            _ => {}
        }
    }
}

fn validate_message(index: usize, message: &ConfigMessage) -> Result<(), SettingsError> {
    if message.team_name.trim().is_empty() && !message.is_global() {
        return Err(SettingsError::invalid(
            index,
            "TeamName is required unless the message only sets GlobalWelcomeMessage",
        ));
    }

    for action in message.button_actions() {
        if action.action_name.trim().is_empty() {
            return Err(SettingsError::invalid(index, "button action requires ActionName"));
        }
        if action.action_display_name.trim().is_empty() {
            return Err(SettingsError::invalid(
                index,
                format!("button action `{}` requires ActionDisplayName", action.action_name),
            ));
        }
    }

    Ok(())
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields.into_iter().map(|(key, value)| (key.to_lowercase(), lowercase_keys(value))).collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Atomically swapped list of configured welcome messages.
///
/// Readers take a snapshot and never observe a half-applied reload.
#[derive(Debug)]
pub struct WelcomeMessageStore {
    messages: ArcSwap<Vec<ConfigMessage>>,
}

impl Default for WelcomeMessageStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl WelcomeMessageStore {
    pub fn new(messages: Vec<ConfigMessage>) -> Self {
        Self { messages: ArcSwap::from_pointee(messages) }
    }

    pub fn snapshot(&self) -> Arc<Vec<ConfigMessage>> {
        self.messages.load_full()
    }

    pub fn replace(&self, messages: Vec<ConfigMessage>) {
        self.messages.store(Arc::new(messages));
    }

    /// Parses and swaps in a new configuration. On error the current list stays active.
    pub fn reload(&self, configuration: &Value) -> Result<usize, SettingsError> {
        let messages = parse_welcome_messages(configuration)?;
        let count = messages.len();
        self.replace(messages);
        Ok(count)
    }

    /// Team join messages for `team_name`, in configuration order.
    pub fn team_messages(&self, team_name: &str) -> Vec<ConfigMessage> {
        self.snapshot()
            .iter()
            .filter(|message| message.matches_team(team_name) && !message.is_global())
            .cloned()
            .collect()
    }

    pub fn first_for_team(&self, team_name: &str) -> Option<ConfigMessage> {
        self.team_messages(team_name).into_iter().next()
    }

    pub fn global_message_for(&self, user: &User) -> Option<ConfigMessage> {
        self.snapshot()
            .iter()
            .find(|message| message.applies_to(user) && message.is_global())
            .cloned()
    }

    pub fn find_action(&self, team_name: &str, action_name: &str) -> Option<ConfigMessageAction> {
        self.snapshot()
            .iter()
            .filter(|message| message.matches_team(team_name))
            .find_map(|message| message.find_action(action_name).cloned())
    }

    /// Configured team names, de-duplicated in first-seen order.
    pub fn team_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for message in self.snapshot().iter() {
            if message.team_name.is_empty() || names.contains(&message.team_name) {
                continue;
            }
            names.push(message.team_name.clone());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_welcome_messages, WelcomeMessageStore};
    use crate::domain::message::ActionType;
    use crate::domain::model::User;
    use crate::errors::SettingsError;

    fn ensure(condition: bool, message: &str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_owned())
        }
    }

    #[test]
    fn parses_array_with_mixed_case_keys() -> Result<(), String> {
        let messages = parse_welcome_messages(&json!({
            "welcomemessages": [{
                "TeamName": "engineering",
                "DelayInSeconds": 3,
                "Message": ["Hello {{.UserDisplayName}}", "Welcome aboard"],
                "Actions": [{
                    "ActionType": "Button",
                    "ActionDisplayName": "Join dev",
                    "ActionName": "join-dev",
                    "ActionSuccessfulMessage": ["Added you"],
                    "ChannelsAddedTo": ["developers"]
                }]
            }]
        }))
        .map_err(|error| error.to_string())?;

        ensure(messages.len() == 1, "one message parsed")?;
        let message = &messages[0];
        ensure(message.team_name == "engineering", "team name kept")?;
        ensure(message.delay_in_seconds == 3, "delay kept")?;
        ensure(message.message.len() == 2, "message lines kept")?;
        ensure(message.actions[0].action_type == ActionType::Button, "action type normalized")?;
        ensure(message.actions[0].channels_added_to == vec!["developers"], "channels kept")
    }

    #[test]
    fn accepts_embedded_json_string_and_legacy_field_shapes() -> Result<(), String> {
        let embedded = json!([{
            "teamname": "sales",
            "message": "line one\nline two",
            "actions": [{
                "actiontype": "automatic",
                "channelsaddedto": "deals, , leads"
            }]
        }])
        .to_string();

        let messages = parse_welcome_messages(&json!({ "WelcomeMessages": embedded }))
            .map_err(|error| error.to_string())?;

        ensure(messages[0].message == vec!["line one", "line two"], "string split on newlines")?;
        ensure(
            messages[0].actions[0].channels_added_to == vec!["deals", "leads"],
            "comma list split and trimmed",
        )
    }

    #[test]
    fn accepts_admin_console_shape() -> Result<(), String> {
        let saved = json!([
            {
                "teamName": "engineering",
                "delayInSeconds": -5,
                "message": ["Welcome {{.UserDisplayName}}"],
                "includeGuests": "true",
                "attachmentMessage": null,
                "actions": [{
                    "actionType": "button",
                    "actionName": "join-dev",
                    "actionDisplayName": "Join dev",
                    "channelsAddedTo": ["developers"],
                    "actionSuccessfullMessage": ["You joined ~developers"]
                }]
            },
            {
                "teamName": "sales",
                "delayInSeconds": 2,
                "message": ["Hi"],
                "includeGuests": "",
                "attachmentMessage": [""],
                "actions": null
            }
        ])
        .to_string();

        let messages = parse_welcome_messages(&json!({ "WelcomeMessages": saved }))
            .map_err(|error| error.to_string())?;

        ensure(messages.len() == 2, "both messages parsed")?;
        ensure(messages[0].include_guests, "string true includes guests")?;
        ensure(messages[0].delay_in_seconds == 0, "negative delay means no delay")?;
        ensure(
            messages[0].actions[0].action_successful_message == vec!["You joined ~developers"],
            "admin console spelling of the success message is accepted",
        )?;
        ensure(!messages[1].include_guests, "empty string excludes guests")?;
        ensure(messages[1].delay_in_seconds == 2, "positive delay kept")?;
        ensure(messages[1].actions.is_empty(), "null actions mean none")
    }

    #[test]
    fn missing_or_blank_messages_mean_no_messages() -> Result<(), String> {
        for configuration in [
            json!(null),
            json!({}),
            json!({"WelcomeMessages": null}),
            json!({"WelcomeMessages": "  "}),
        ] {
            let messages = parse_welcome_messages(&configuration).map_err(|error| error.to_string())?;
            ensure(messages.is_empty(), "no messages expected")?;
        }
        Ok(())
    }

    #[test]
    fn rejects_unknown_action_type() {
        let result = parse_welcome_messages(&json!({
            "WelcomeMessages": [{
                "TeamName": "engineering",
                "Actions": [{"ActionType": "teleport", "ActionName": "x"}]
            }]
        }));

        assert!(matches!(result, Err(SettingsError::InvalidMessage { index: 1, .. })));
    }

    #[test]
    fn rejects_button_without_display_name() {
        let result = parse_welcome_messages(&json!({
            "WelcomeMessages": [
                {"TeamName": "a"},
                {"TeamName": "b", "Actions": [{"ActionType": "button", "ActionName": "go"}]}
            ]
        }));

        match result {
            Err(SettingsError::InvalidMessage { index, reason }) => {
                assert_eq!(index, 2);
                assert!(reason.contains("ActionDisplayName"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn team_name_is_optional_only_for_global_messages() {
        let global = parse_welcome_messages(&json!({
            "WelcomeMessages": [{"GlobalWelcomeMessage": ["Hi {{.UserDisplayName}}"]}]
        }));
        assert!(global.is_ok());

        let missing = parse_welcome_messages(&json!({
            "WelcomeMessages": [{"Message": ["Hi"]}]
        }));
        assert!(matches!(missing, Err(SettingsError::InvalidMessage { index: 1, .. })));
    }

    #[test]
    fn rejects_non_list_messages() {
        assert_eq!(
            parse_welcome_messages(&json!({"WelcomeMessages": {"TeamName": "a"}})),
            Err(SettingsError::NotAList)
        );
        assert_eq!(parse_welcome_messages(&json!(["nope"])), Err(SettingsError::NotAnObject));
        assert!(matches!(
            parse_welcome_messages(&json!({"WelcomeMessages": "[{"})),
            Err(SettingsError::EmbeddedJson(_))
        ));
    }

    #[test]
    fn failed_reload_keeps_previous_messages() -> Result<(), String> {
        let store = WelcomeMessageStore::default();
        let loaded = store
            .reload(&json!({"WelcomeMessages": [{"TeamName": "engineering"}]}))
            .map_err(|error| error.to_string())?;
        ensure(loaded == 1, "first reload applies")?;

        let failed = store.reload(&json!({"WelcomeMessages": [{"Message": ["no team"]}]}));
        ensure(failed.is_err(), "invalid reload rejected")?;
        ensure(store.team_names() == vec!["engineering"], "previous list still active")
    }

    #[test]
    fn store_queries_respect_wildcards_and_global_messages() -> Result<(), String> {
        let store = WelcomeMessageStore::default();
        store
            .reload(&json!({"WelcomeMessages": [
                {"TeamName": "*", "Message": ["everyone"]},
                {"TeamName": "engineering", "Message": ["eng"],
                 "Actions": [{"ActionType": "button", "ActionName": "dev", "ActionDisplayName": "Dev"}]},
                {"TeamName": "engineering", "GlobalWelcomeMessage": ["global"], "IncludeGuests": true},
                {"TeamName": "*", "Message": ["duplicate wildcard"]}
            ]}))
            .map_err(|error| error.to_string())?;

        ensure(store.team_messages("engineering").len() == 3, "wildcard and team messages")?;
        ensure(store.team_messages("sales").len() == 2, "only wildcard messages")?;
        ensure(
            store.first_for_team("engineering").map(|message| message.message)
                == Some(vec!["everyone".to_owned()]),
            "first match in configuration order",
        )?;
        ensure(store.find_action("engineering", "dev").is_some(), "action found for team")?;
        ensure(store.find_action("sales", "dev").is_none(), "action scoped to team")?;
        ensure(store.team_names() == vec!["*", "engineering"], "team names de-duplicated")?;

        let guest = User { roles: "system_user system_guest".to_owned(), ..User::default() };
        ensure(store.global_message_for(&guest).is_some(), "global message includes guests")
    }
}
