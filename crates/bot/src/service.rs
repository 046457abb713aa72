//! `/welcomebot` actions backed by the host API and the key-value overrides.

use async_trait::async_trait;
use tracing::{error, info};

use welcomebot_core::domain::model::ChannelType;
use welcomebot_core::errors::HostError;
use welcomebot_core::kv::{channel_welcome_key, decode_message, team_welcome_key};

use crate::commands::{
    permission_denied_message, CommandEnvelope, CommandReply, CommandRouteError,
    WelcomeCommandService,
};
use crate::permissions::{has_system_admin_role, is_command_admin, is_system_or_team_admin, Role, RoleLookupError};
use crate::welcome::WelcomeService;

pub const TEAM_WELCOME_NOT_SET: &str = "Welcome message has not been set for the team";
pub const CHANNEL_WELCOME_NOT_SET: &str = "Welcome message has not been set yet";
const TEAM_PRIVILEGES_REQUIRED: &str =
    "You do not have the proper privileges to control this Team's welcome messages.";

fn failed(context: &str, error: impl std::fmt::Display) -> CommandRouteError {
    CommandRouteError::Failed(format!("{context}: `{error}`"))
}

impl WelcomeService {
    async fn require_team_admin(&self, user_id: &str, team_id: &str) -> Result<(), CommandRouteError> {
        match is_system_or_team_admin(self.api(), user_id, team_id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!(
                    event_name = "welcomebot.command.team_privileges_missing",
                    user_id,
                    team_id,
                    "user cannot control the team's welcome messages"
                );
                Err(CommandRouteError::Denied(TEAM_PRIVILEGES_REQUIRED.to_owned()))
            }
            Err(error) => Err(CommandRouteError::Failed(error.to_string())),
        }
    }

    async fn team_override(&self, team_id: &str) -> Result<Option<String>, HostError> {
        Ok(decode_message(self.api().kv_get(&team_welcome_key(team_id)).await?))
    }

    /// Renders the configured message for `team_id` as the caller would receive it.
    async fn preview_configured(
        &self,
        team_id: &str,
        team_name: &str,
        envelope: &CommandEnvelope,
    ) -> Result<Option<CommandReply>, CommandRouteError> {
        let Some(message) = self.store().first_for_team(team_name) else {
            return Ok(None);
        };

        let context = format!("Error occurred while processing the greeting for the team `{team_name}`");
        let template = self
            .build_template(&envelope.user_id, Some(team_id))
            .await
            .map_err(|error| failed(&context, error))?;
        let callback_base = self.callback_base().await;
        let post = self
            .welcome_post(&template, &message, &envelope.channel_id, &callback_base)
            .map_err(|error| failed(&context, error))?;
        Ok(Some(CommandReply::Post(post)))
    }

    async fn teams_with_overrides(&self) -> Result<Vec<String>, HostError> {
        let mut names = Vec::new();
        for team in self.api().list_teams().await? {
            if self.team_override(&team.id).await?.is_some() {
                names.push(team.name);
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl WelcomeCommandService for WelcomeService {
    async fn authorize(&self, envelope: &CommandEnvelope) -> Result<(), CommandRouteError> {
        let allowed = is_command_admin(
            self.api(),
            &envelope.user_id,
            &envelope.team_id,
            &envelope.channel_id,
        )
        .await
        .map_err(|error| CommandRouteError::Failed(error.to_string()))?;

        if !allowed {
            return Err(CommandRouteError::Denied(permission_denied_message(&envelope.action)));
        }
        Ok(())
    }

    async fn preview(
        &self,
        team_name: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError> {
        let team = self.api().get_team_by_name(team_name).await.map_err(|error| {
            failed("Error occurred while retrieving the welcome message for the team", error)
        })?;

        if let Err(error) = self.api().get_team_member(&team.id, &envelope.user_id).await {
            if error.is_not_found() {
                return Err(CommandRouteError::Denied("You are not a member of the team.".to_owned()));
            }
            error!(
                event_name = "welcomebot.command.team_member_lookup_failed",
                team_id = %team.id,
                error = %error,
                "error occurred while getting the team member"
            );
            return Err(CommandRouteError::Failed("Error occurred while getting the Team member".to_owned()));
        }
        self.require_team_admin(&envelope.user_id, &team.id).await?;

        let stored = self.team_override(&team.id).await.map_err(|error| {
            failed("Error occurred while retrieving the welcome message for the team", error)
        })?;
        if let Some(message) = stored {
            return Ok(CommandReply::Text(message));
        }

        match self.preview_configured(&team.id, team_name, envelope).await? {
            Some(reply) => Ok(reply),
            None => Ok(CommandReply::Text(format!("team `{team_name}` has not been found"))),
        }
    }

    async fn list(&self, envelope: &CommandEnvelope) -> Result<CommandReply, CommandRouteError> {
        let is_admin = has_system_admin_role(self.api(), &envelope.user_id)
            .await
            .map_err(|source| RoleLookupError { role: Role::SystemAdmin, source })
            .map_err(|error| CommandRouteError::Failed(error.to_string()))?;
        if !is_admin {
            return Err(CommandRouteError::Denied(
                "Only a System Admin can view all welcome messages of teams.".to_owned(),
            ));
        }

        let mut names = self.store().team_names();
        let overrides = self
            .teams_with_overrides()
            .await
            .map_err(|error| failed("Error occurred while retrieving the welcome messages", error))?;
        for name in overrides {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        if names.is_empty() {
            return Ok(CommandReply::text("There are no welcome messages defined"));
        }
        Ok(CommandReply::Text(names.iter().map(|name| format!("\n * {name}")).collect()))
    }

    async fn set_channel_welcome(
        &self,
        message: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError> {
        let channel = self.api().get_channel(&envelope.channel_id).await.map_err(|error| {
            failed(
                &format!("Error occurred while checking the type of the channel `{}`", envelope.channel_id),
                error,
            )
        })?;
        if channel.channel_type != ChannelType::Open {
            return Err(CommandRouteError::Denied(
                "Welcome messages are not supported for direct channels".to_owned(),
            ));
        }

        self.api()
            .kv_set(&channel_welcome_key(&envelope.channel_id), message.as_bytes())
            .await
            .map_err(|error| failed("Error occurred while storing the welcome message for the channel", error))?;

        info!(
            event_name = "welcomebot.command.channel_welcome_stored",
            channel_id = %envelope.channel_id,
            user_id = %envelope.user_id,
            "channel welcome message stored"
        );
        Ok(CommandReply::Text(format!("Stored the channel welcome message:\n{message}")))
    }

    async fn get_channel_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError> {
        let stored = self
            .api()
            .kv_get(&channel_welcome_key(&envelope.channel_id))
            .await
            .map_err(|error| failed("Error occurred while retrieving the welcome message for the channel", error))?;

        Ok(match decode_message(stored) {
            Some(message) => CommandReply::Text(format!("Welcome message is:\n{message}")),
            None => CommandReply::text(CHANNEL_WELCOME_NOT_SET),
        })
    }

    async fn delete_channel_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError> {
        let key = channel_welcome_key(&envelope.channel_id);
        let stored = self
            .api()
            .kv_get(&key)
            .await
            .map_err(|error| failed("Error occurred while retrieving the welcome message for the channel", error))?;
        if decode_message(stored).is_none() {
            return Ok(CommandReply::text(CHANNEL_WELCOME_NOT_SET));
        }

        self.api()
            .kv_delete(&key)
            .await
            .map_err(|error| failed("Error occurred while deleting the welcome message for the channel", error))?;
        Ok(CommandReply::text("Welcome message has been deleted"))
    }

    async fn set_team_welcome(
        &self,
        message: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError> {
        self.require_team_admin(&envelope.user_id, &envelope.team_id).await?;

        self.api()
            .kv_set(&team_welcome_key(&envelope.team_id), message.as_bytes())
            .await
            .map_err(|error| failed("Error occurred while storing the welcome message for the team", error))?;

        info!(
            event_name = "welcomebot.command.team_welcome_stored",
            team_id = %envelope.team_id,
            user_id = %envelope.user_id,
            "team welcome message stored"
        );
        Ok(CommandReply::Text(format!("Stored the team welcome message:\n{message}")))
    }

    async fn get_team_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError> {
        self.require_team_admin(&envelope.user_id, &envelope.team_id).await?;

        let stored = self.team_override(&envelope.team_id).await.map_err(|error| {
            failed("Error occurred while retrieving the welcome message for the team", error)
        })?;
        if let Some(message) = stored {
            return Ok(CommandReply::Text(message));
        }

        let team = self
            .api()
            .get_team(&envelope.team_id)
            .await
            .map_err(|error| failed("Error occurred while retrieving the team", error))?;
        match self.preview_configured(&team.id, &team.name, envelope).await? {
            Some(reply) => Ok(reply),
            None => Ok(CommandReply::text(TEAM_WELCOME_NOT_SET)),
        }
    }

    async fn delete_team_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError> {
        self.require_team_admin(&envelope.user_id, &envelope.team_id).await?;

        let stored = self.team_override(&envelope.team_id).await.map_err(|error| {
            failed("Error occurred while retrieving the welcome message for the team", error)
        })?;
        if stored.is_none() {
            return Ok(CommandReply::text(TEAM_WELCOME_NOT_SET));
        }

        self.api()
            .kv_delete(&team_welcome_key(&envelope.team_id))
            .await
            .map_err(|error| failed("Error occurred while deleting the welcome message for the team", error))?;
        Ok(CommandReply::text("Team welcome message has been deleted"))
    }
}
