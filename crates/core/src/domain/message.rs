use serde::{Deserialize, Serialize};

use crate::domain::model::User;

/// Team name that makes a configured message apply to every team.
pub const WILDCARD_TEAM: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Automatic,
    Button,
}

/// Follow-up attached to a welcome message.
///
/// `automatic` actions run when the welcome message is delivered; `button`
/// actions render as a post button and run when the user clicks it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct ConfigMessageAction {
    #[serde(rename = "actiontype")]
    pub action_type: ActionType,
    #[serde(rename = "actiondisplayname", default)]
    pub action_display_name: String,
    #[serde(rename = "actionname", default)]
    pub action_name: String,
    #[serde(rename = "actionsuccessfulmessage", alias = "actionsuccessfullmessage", default)]
    pub action_successful_message: Vec<String>,
    #[serde(rename = "channelsaddedto", default)]
    pub channels_added_to: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMessage {
    #[serde(rename = "teamname", default)]
    pub team_name: String,
    #[serde(default)]
    pub actions: Vec<ConfigMessageAction>,
    #[serde(default)]
    pub message: Vec<String>,
    #[serde(rename = "attachmentmessage", default)]
    pub attachment_message: Vec<String>,
    #[serde(rename = "globalwelcomemessage", default)]
    pub global_welcome_message: Vec<String>,
    #[serde(rename = "delayinseconds", default)]
    pub delay_in_seconds: u64,
    #[serde(rename = "includeguests", default)]
    pub include_guests: bool,
}

impl ConfigMessage {
    pub fn matches_team(&self, team_name: &str) -> bool {
        self.team_name == WILDCARD_TEAM || self.team_name == team_name
    }

    /// Guests only receive messages that opt in to them.
    pub fn applies_to(&self, user: &User) -> bool {
        self.include_guests || !user.is_guest()
    }

    pub fn is_global(&self) -> bool {
        !self.global_welcome_message.is_empty()
    }

    pub fn find_action(&self, action_name: &str) -> Option<&ConfigMessageAction> {
        self.actions.iter().find(|action| action.action_name == action_name)
    }

    pub fn button_actions(&self) -> impl Iterator<Item = &ConfigMessageAction> {
        self.actions.iter().filter(|action| action.action_type == ActionType::Button)
    }

    pub fn automatic_actions(&self) -> impl Iterator<Item = &ConfigMessageAction> {
        self.actions.iter().filter(|action| action.action_type == ActionType::Automatic)
    }
}
