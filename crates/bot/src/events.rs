use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use welcomebot_core::domain::model::ChannelType;
use welcomebot_core::errors::{HostError, SettingsError};
use welcomebot_core::kv::{channel_welcome_key, decode_message, team_welcome_key};

use crate::attachments::text_post;
use crate::template::TemplateError;
use crate::welcome::WelcomeService;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TeamJoinEvent {
    pub team_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelJoinEvent {
    pub channel_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserCreatedEvent {
    #[serde(alias = "id")]
    pub user_id: String,
}

/// Host lifecycle callbacks the bot reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookEvent {
    ConfigurationChange,
    UserHasJoinedTeam(TeamJoinEvent),
    UserHasJoinedChannel(ChannelJoinEvent),
    UserHasBeenCreated(UserCreatedEvent),
}

impl HookEvent {
    pub fn hook_type(&self) -> HookType {
        match self {
            Self::ConfigurationChange => HookType::ConfigurationChange,
            Self::UserHasJoinedTeam(_) => HookType::UserHasJoinedTeam,
            Self::UserHasJoinedChannel(_) => HookType::UserHasJoinedChannel,
            Self::UserHasBeenCreated(_) => HookType::UserHasBeenCreated,
        }
    }

    /// Decodes a hook body for the hook named in the callback path.
    pub fn decode(hook_type: HookType, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match hook_type {
            HookType::ConfigurationChange => Self::ConfigurationChange,
            HookType::UserHasJoinedTeam => Self::UserHasJoinedTeam(serde_json::from_slice(body)?),
            HookType::UserHasJoinedChannel => Self::UserHasJoinedChannel(serde_json::from_slice(body)?),
            HookType::UserHasBeenCreated => Self::UserHasBeenCreated(serde_json::from_slice(body)?),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookType {
    ConfigurationChange,
    UserHasJoinedTeam,
    UserHasJoinedChannel,
    UserHasBeenCreated,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationChange => "configuration_change",
            Self::UserHasJoinedTeam => "user_has_joined_team",
            Self::UserHasJoinedChannel => "user_has_joined_channel",
            Self::UserHasBeenCreated => "user_has_been_created",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "configuration_change" => Some(Self::ConfigurationChange),
            "user_has_joined_team" => Some(Self::UserHasJoinedTeam),
            "user_has_joined_channel" => Some(Self::UserHasJoinedChannel),
            "user_has_been_created" => Some(Self::UserHasBeenCreated),
            _ => None,
        }
    }
}

/// What a hook handler did. Scheduled work keeps running after the hook returns.
#[derive(Debug)]
pub enum HookOutcome {
    Scheduled(Vec<JoinHandle<()>>),
    Delivered,
    Reloaded { messages: usize },
    Ignored,
}

#[derive(Debug, Error)]
pub enum HookHandlerError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("invalid welcome message configuration: {0}")]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] HookHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn hook_type(&self) -> HookType;
    async fn handle(&self, event: &HookEvent) -> Result<HookOutcome, HookHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<HookType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.hook_type(), Arc::new(handler));
    }

    pub async fn dispatch(&self, event: &HookEvent) -> Result<HookOutcome, DispatchError> {
        let Some(handler) = self.handlers.get(&event.hook_type()) else {
            return Ok(HookOutcome::Ignored);
        };

        handler.handle(event).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher(service: &WelcomeService) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ConfigurationChangeHandler::new(service.clone()));
    dispatcher.register(TeamJoinHandler::new(service.clone()));
    dispatcher.register(ChannelJoinHandler::new(service.clone()));
    dispatcher.register(UserCreatedHandler::new(service.clone()));
    dispatcher
}

pub struct ConfigurationChangeHandler {
    service: WelcomeService,
}

impl ConfigurationChangeHandler {
    pub fn new(service: WelcomeService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for ConfigurationChangeHandler {
    fn hook_type(&self) -> HookType {
        HookType::ConfigurationChange
    }

    async fn handle(&self, _event: &HookEvent) -> Result<HookOutcome, HookHandlerError> {
        let configuration = self.service.api().load_plugin_configuration().await?;
        match self.service.store().reload(&configuration) {
            Ok(messages) => {
                info!(
                    event_name = "welcomebot.configuration.reloaded",
                    messages,
                    "welcome messages reloaded"
                );
                Ok(HookOutcome::Reloaded { messages })
            }
            Err(error) => {
                error!(
                    event_name = "welcomebot.configuration.invalid",
                    error = %error,
                    "keeping the previous welcome messages"
                );
                Err(error.into())
            }
        }
    }
}

pub struct TeamJoinHandler {
    service: WelcomeService,
}

impl TeamJoinHandler {
    pub fn new(service: WelcomeService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for TeamJoinHandler {
    fn hook_type(&self) -> HookType {
        HookType::UserHasJoinedTeam
    }

    async fn handle(&self, event: &HookEvent) -> Result<HookOutcome, HookHandlerError> {
        let HookEvent::UserHasJoinedTeam(joined) = event else {
            return Ok(HookOutcome::Ignored);
        };

        let template = match self.service.build_template(&joined.user_id, Some(&joined.team_id)).await {
            Ok(template) => template,
            Err(error) => {
                error!(
                    event_name = "welcomebot.team_join.template_failed",
                    team_id = %joined.team_id,
                    user_id = %joined.user_id,
                    error = %error,
                    "could not build the welcome message template"
                );
                return Err(error.into());
            }
        };

        if let Some(message) = decode_message(self.service.api().kv_get(&team_welcome_key(&joined.team_id)).await?) {
            let post = text_post(&template.direct_message.id, self.service.bot_user_id(), message);
            self.service.api().create_post(post).await?;
            info!(
                event_name = "welcomebot.team_join.override_delivered",
                team_id = %joined.team_id,
                user_id = %joined.user_id,
                "team welcome message delivered"
            );
            return Ok(HookOutcome::Delivered);
        }

        let handles: Vec<JoinHandle<()>> = self
            .service
            .store()
            .team_messages(&template.team.name)
            .into_iter()
            .filter(|message| message.applies_to(&template.user))
            .map(|message| self.service.schedule_welcome(template.clone(), message))
            .collect();

        if handles.is_empty() {
            debug!(
                event_name = "welcomebot.team_join.no_message",
                team_id = %joined.team_id,
                user_id = %joined.user_id,
                "no welcome message configured for the team"
            );
            return Ok(HookOutcome::Ignored);
        }
        Ok(HookOutcome::Scheduled(handles))
    }
}

pub struct ChannelJoinHandler {
    service: WelcomeService,
}

impl ChannelJoinHandler {
    pub fn new(service: WelcomeService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for ChannelJoinHandler {
    fn hook_type(&self) -> HookType {
        HookType::UserHasJoinedChannel
    }

    async fn handle(&self, event: &HookEvent) -> Result<HookOutcome, HookHandlerError> {
        let HookEvent::UserHasJoinedChannel(joined) = event else {
            return Ok(HookOutcome::Ignored);
        };

        let api = self.service.api();
        let channel = api.get_channel(&joined.channel_id).await?;
        if channel.channel_type != ChannelType::Open {
            return Ok(HookOutcome::Ignored);
        }

        let Some(message) = decode_message(api.kv_get(&channel_welcome_key(&joined.channel_id)).await?) else {
            return Ok(HookOutcome::Ignored);
        };

        let direct = api.get_direct_channel(&joined.user_id, self.service.bot_user_id()).await?;
        if let Err(error) = api.create_post(text_post(&direct.id, self.service.bot_user_id(), message.clone())).await {
            error!(
                event_name = "welcomebot.channel_join.dm_failed",
                channel_id = %direct.id,
                error = %error,
                "failed to post the channel welcome message"
            );
        }

        // The ephemeral copy only shows once the client has switched to the channel.
        let service = self.service.clone();
        let channel_id = joined.channel_id.clone();
        let user_id = joined.user_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(service.channel_ephemeral_delay()).await;
            let post = text_post(&channel_id, service.bot_user_id(), message);
            if let Err(error) = service.api().send_ephemeral_post(&user_id, post).await {
                debug!(
                    event_name = "welcomebot.channel_join.ephemeral_failed",
                    channel_id = %channel_id,
                    error = %error,
                    "ephemeral channel welcome was not delivered"
                );
            }
        });
        Ok(HookOutcome::Scheduled(vec![handle]))
    }
}

pub struct UserCreatedHandler {
    service: WelcomeService,
}

impl UserCreatedHandler {
    pub fn new(service: WelcomeService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for UserCreatedHandler {
    fn hook_type(&self) -> HookType {
        HookType::UserHasBeenCreated
    }

    async fn handle(&self, event: &HookEvent) -> Result<HookOutcome, HookHandlerError> {
        let HookEvent::UserHasBeenCreated(created) = event else {
            return Ok(HookOutcome::Ignored);
        };

        let template = self.service.build_template(&created.user_id, None).await?;
        let Some(message) = self.service.store().global_message_for(&template.user) else {
            return Ok(HookOutcome::Ignored);
        };

        let text = template.render(&message.global_welcome_message)?;
        let post = text_post(&template.direct_message.id, self.service.bot_user_id(), text);
        self.service.api().create_post(post).await?;
        info!(
            event_name = "welcomebot.user_created.delivered",
            user_id = %created.user_id,
            "global welcome message delivered"
        );
        Ok(HookOutcome::Delivered)
    }
}
