//! The host platform surface every WelcomeBot behavior is written against.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::model::{Channel, ChannelMember, CommandRegistration, Post, Team, TeamMember, User};
use crate::errors::HostError;

#[async_trait]
pub trait PluginApi: Send + Sync {
    /// The user the bot posts as.
    async fn get_bot_user(&self) -> Result<User, HostError>;

    async fn get_user(&self, user_id: &str) -> Result<User, HostError>;
    async fn get_team(&self, team_id: &str) -> Result<Team, HostError>;
    async fn get_team_by_name(&self, name: &str) -> Result<Team, HostError>;
    async fn list_teams(&self) -> Result<Vec<Team>, HostError>;
    async fn get_team_member(&self, team_id: &str, user_id: &str) -> Result<TeamMember, HostError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HostError>;
    async fn get_channel_by_name(&self, team_id: &str, name: &str) -> Result<Channel, HostError>;
    async fn get_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<ChannelMember, HostError>;
    /// Returns the direct channel between two users, creating it when needed.
    async fn get_direct_channel(&self, user_id: &str, other_user_id: &str) -> Result<Channel, HostError>;
    async fn add_channel_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<ChannelMember, HostError>;

    async fn create_post(&self, post: Post) -> Result<Post, HostError>;
    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<Post, HostError>;

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError>;
    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), HostError>;
    async fn kv_delete(&self, key: &str) -> Result<(), HostError>;

    /// Raw plugin settings object as saved by the host.
    async fn load_plugin_configuration(&self) -> Result<Value, HostError>;
    /// Externally reachable host URL, if one is configured.
    async fn site_url(&self) -> Result<Option<String>, HostError>;
    async fn register_command(&self, command: CommandRegistration) -> Result<(), HostError>;
}
