//! Role checks against the host's role strings.
//!
//! A missing team or channel membership means the user simply does not hold
//! the role there; any other lookup failure is reported to the caller.

use std::fmt;

use thiserror::Error;

use welcomebot_core::domain::model::{has_role, CHANNEL_ADMIN_ROLE, TEAM_ADMIN_ROLE};
use welcomebot_core::errors::HostError;
use welcomebot_core::host::PluginApi;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    SystemAdmin,
    TeamAdmin,
    ChannelAdmin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SystemAdmin => "System admin",
            Self::TeamAdmin => "Team admin",
            Self::ChannelAdmin => "Channel admin",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{role} authorization failed: {source}")]
pub struct RoleLookupError {
    pub role: Role,
    #[source]
    pub source: HostError,
}

pub async fn has_system_admin_role(api: &dyn PluginApi, user_id: &str) -> Result<bool, HostError> {
    let user = api.get_user(user_id).await?;
    Ok(user.is_system_admin())
}

pub async fn has_team_admin_role(
    api: &dyn PluginApi,
    user_id: &str,
    team_id: &str,
) -> Result<bool, HostError> {
    match api.get_team_member(team_id, user_id).await {
        Ok(member) => Ok(member.is_active() && has_role(&member.roles, TEAM_ADMIN_ROLE)),
        Err(error) if error.is_not_found() => Ok(false),
        Err(error) => Err(error),
    }
}

pub async fn has_channel_admin_role(
    api: &dyn PluginApi,
    user_id: &str,
    channel_id: &str,
) -> Result<bool, HostError> {
    match api.get_channel_member(channel_id, user_id).await {
        Ok(member) => Ok(has_role(&member.roles, CHANNEL_ADMIN_ROLE)),
        Err(error) if error.is_not_found() => Ok(false),
        Err(error) => Err(error),
    }
}

/// Flat OR of system admin, team admin of `team_id` and channel admin of `channel_id`.
pub async fn is_command_admin(
    api: &dyn PluginApi,
    user_id: &str,
    team_id: &str,
    channel_id: &str,
) -> Result<bool, RoleLookupError> {
    let lookup = |role: Role| move |source: HostError| RoleLookupError { role, source };

    if has_system_admin_role(api, user_id).await.map_err(lookup(Role::SystemAdmin))? {
        return Ok(true);
    }
    if has_team_admin_role(api, user_id, team_id).await.map_err(lookup(Role::TeamAdmin))? {
        return Ok(true);
    }
    has_channel_admin_role(api, user_id, channel_id).await.map_err(lookup(Role::ChannelAdmin))
}

/// System admin or team admin of `team_id`.
pub async fn is_system_or_team_admin(
    api: &dyn PluginApi,
    user_id: &str,
    team_id: &str,
) -> Result<bool, RoleLookupError> {
    let system_admin = has_system_admin_role(api, user_id)
        .await
        .map_err(|source| RoleLookupError { role: Role::SystemAdmin, source })?;
    if system_admin {
        return Ok(true);
    }
    has_team_admin_role(api, user_id, team_id)
        .await
        .map_err(|source| RoleLookupError { role: Role::TeamAdmin, source })
}

#[cfg(test)]
mod tests {
    use welcomebot_core::errors::HostError;

    use super::{is_command_admin, is_system_or_team_admin, Role, RoleLookupError};
    use crate::testing::{fixture, ADMIN, CHANNEL_ADMIN, MEMBER, TEAM, TEAM_ADMIN};

    #[tokio::test]
    async fn command_gate_accepts_any_admin_role() {
        let host = fixture();
        for user_id in [ADMIN, TEAM_ADMIN, CHANNEL_ADMIN] {
            assert!(
                is_command_admin(&host, user_id, TEAM, "c-town").await.expect("lookup"),
                "{user_id} should pass",
            );
        }
        assert!(!is_command_admin(&host, MEMBER, TEAM, "c-town").await.expect("lookup"));
    }

    #[tokio::test]
    async fn missing_membership_counts_as_not_admin() {
        let host = fixture();
        assert!(!is_system_or_team_admin(&host, MEMBER, "other-team").await.expect("lookup"));
    }

    #[tokio::test]
    async fn failed_user_lookup_names_the_role() {
        let host = fixture();
        let error = is_command_admin(&host, "ghost-user", TEAM, "c-town").await.expect_err("must fail");
        assert_eq!(
            error,
            RoleLookupError { role: Role::SystemAdmin, source: HostError::not_found("user", "ghost-user") }
        );
        assert_eq!(error.to_string(), "System admin authorization failed: user not found: ghost-user");
    }
}
