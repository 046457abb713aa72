//! Button callbacks posted back by the host to `/plugins/<id>/addchannels`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use welcomebot_core::domain::model::ActionContext;

use crate::template::MessageTemplate;
use crate::welcome::WelcomeService;

/// Body the host posts when a welcome message button is clicked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ActionPayload {
    /// The user who clicked, as reported by the host.
    pub user_id: String,
    pub context: ActionContext,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub ephemeral_text: String,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("WelcomeBot Error: We could not decode the action")]
    Decode,
    #[error("WelcomeBot Error: This action was not meant for you")]
    WrongActor,
    #[error("WelcomeBot Error: We could not find the supplied user")]
    UserNotFound,
    #[error("WelcomeBot Error: We could not find the supplied team")]
    TeamNotFound,
    #[error("WelcomeBot Error: We could not find the welcome bot direct message channel")]
    DirectChannelNotFound,
    #[error("WelcomeBot Error: You do not appear to have access to this team")]
    NoTeamAccess,
    #[error("WelcomeBot Error: The action wasn't found for {0}")]
    UnknownAction(String),
}

impl From<ActionError> for ActionResponse {
    fn from(error: ActionError) -> Self {
        Self { ephemeral_text: error.to_string() }
    }
}

pub fn decode_payload(body: &[u8]) -> Result<ActionPayload, ActionError> {
    match serde_json::from_slice::<Option<ActionPayload>>(body) {
        Ok(Some(payload)) => Ok(payload),
        Ok(None) | Err(_) => Err(ActionError::Decode),
    }
}

/// Runs the clicked action and produces the ephemeral answer for the clicker.
pub async fn handle_action(service: &WelcomeService, body: &[u8]) -> ActionResponse {
    match run_action(service, body).await {
        Ok(()) => ActionResponse::ok(),
        Err(error) => {
            warn!(
                event_name = "welcomebot.action.rejected",
                error = %error,
                "button action rejected"
            );
            error.into()
        }
    }
}

async fn run_action(service: &WelcomeService, body: &[u8]) -> Result<(), ActionError> {
    let payload = decode_payload(body)?;
    let context = &payload.context;
    if !payload.user_id.is_empty() && payload.user_id != context.user_id {
        return Err(ActionError::WrongActor);
    }

    let template = action_template(service, context).await?;

    match service.api().get_team_member(&context.team_id, &context.user_id).await {
        Ok(member) if member.is_active() => {}
        Ok(_) | Err(_) => {
            error!(
                event_name = "welcomebot.action.team_access_missing",
                user_id = %context.user_id,
                team_id = %context.team_id,
                "user no longer has access to the team"
            );
            return Err(ActionError::NoTeamAccess);
        }
    }

    let Some(action) = service.store().find_action(&template.team.name, &context.action) else {
        return Err(ActionError::UnknownAction(context.action.clone()));
    };

    match service.run_action(&template, &action).await {
        Ok(_) => info!(
            event_name = "welcomebot.action.completed",
            action = %context.action,
            user_id = %context.user_id,
            team_id = %context.team_id,
            "button action completed"
        ),
        Err(error) => error!(
            event_name = "welcomebot.action.response_failed",
            action = %context.action,
            user_id = %context.user_id,
            error = %error,
            "could not create the response post"
        ),
    }
    Ok(())
}

async fn action_template(
    service: &WelcomeService,
    context: &ActionContext,
) -> Result<MessageTemplate, ActionError> {
    let api = service.api();
    let user = api.get_user(&context.user_id).await.map_err(|_| ActionError::UserNotFound)?;
    let team = api.get_team(&context.team_id).await.map_err(|_| ActionError::TeamNotFound)?;
    let direct_message = api
        .get_direct_channel(&context.user_id, service.bot_user_id())
        .await
        .map_err(|_| ActionError::DirectChannelNotFound)?;

    Ok(MessageTemplate {
        welcome_bot: service.bot_user().clone(),
        user_display_name: user.display_name(),
        user,
        team,
        direct_message,
        ..MessageTemplate::default()
    })
}
