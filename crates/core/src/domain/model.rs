//! Host platform entities as they travel over the host REST API.
//!
//! Field names follow the host's JSON encoding (snake_case). Everything that
//! is optional on the wire is defaulted so partial payloads still decode.

use serde::{Deserialize, Serialize};

pub const SYSTEM_ADMIN_ROLE: &str = "system_admin";
pub const SYSTEM_GUEST_ROLE: &str = "system_guest";
pub const TEAM_ADMIN_ROLE: &str = "team_admin";
pub const CHANNEL_ADMIN_ROLE: &str = "channel_admin";

/// Name of the default channel every team member belongs to.
pub const TOWN_SQUARE_CHANNEL: &str = "town-square";

/// Space separated role list as stored by the host.
pub fn has_role(roles: &str, role: &str) -> bool {
    roles.split_whitespace().any(|candidate| candidate == role)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub roles: String,
    pub delete_at: i64,
}

impl User {
    /// Nickname first, then full name, then username.
    pub fn display_name(&self) -> String {
        let nickname = self.nickname.trim();
        if !nickname.is_empty() {
            return nickname.to_owned();
        }

        let full_name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full_name = full_name.trim();
        if !full_name.is_empty() {
            return full_name.to_owned();
        }

        self.username.clone()
    }

    pub fn is_guest(&self) -> bool {
        has_role(&self.roles, SYSTEM_GUEST_ROLE)
    }

    pub fn is_system_admin(&self) -> bool {
        has_role(&self.roles, SYSTEM_ADMIN_ROLE)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    #[default]
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "P")]
    Private,
    #[serde(rename = "D")]
    Direct,
    #[serde(rename = "G")]
    Group,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub roles: String,
    pub delete_at: i64,
}

impl TeamMember {
    pub fn is_active(&self) -> bool {
        self.delete_at == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMember {
    pub channel_id: String,
    pub user_id: String,
    pub roles: String,
}

/// Context carried by welcome message buttons and echoed back on click.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionContext {
    pub team_id: String,
    pub user_id: String,
    pub action: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostActionIntegration {
    pub url: String,
    pub context: ActionContext,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAction {
    pub name: String,
    pub integration: PostActionIntegration,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackAttachment {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PostAction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProps {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<SlackAttachment>,
}

impl PostProps {
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "PostProps::is_empty")]
    pub props: PostProps,
}

/// Slash command invocation as delivered by the host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandArgs {
    pub command: String,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
}

/// Slash command registration payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRegistration {
    pub trigger: String,
    pub display_name: String,
    pub description: String,
    pub auto_complete: bool,
    pub auto_complete_desc: String,
    pub auto_complete_hint: String,
}
