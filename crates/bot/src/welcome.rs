//! Welcome message delivery and button action execution.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use welcomebot_core::domain::message::{ConfigMessage, ConfigMessageAction};
use welcomebot_core::domain::model::{ActionContext, Post, User, TOWN_SQUARE_CHANNEL};
use welcomebot_core::errors::HostError;
use welcomebot_core::host::PluginApi;
use welcomebot_core::settings::WelcomeMessageStore;

use crate::attachments::{action_url, text_post, PostBuilder};
use crate::template::{MessageTemplate, TemplateError};

/// Used when neither a callback base nor a host site URL is configured.
pub const DEFAULT_SITE_URL: &str = "http://localhost:8065";

#[derive(Debug, Error)]
pub enum WelcomeError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Shared handle over the host API, the configured messages and the bot identity.
#[derive(Clone)]
pub struct WelcomeService {
    api: Arc<dyn PluginApi>,
    store: Arc<WelcomeMessageStore>,
    bot: Arc<User>,
    plugin_id: String,
    callback_base_url: Option<String>,
    channel_ephemeral_delay: Duration,
}

impl WelcomeService {
    pub fn new(
        api: Arc<dyn PluginApi>,
        store: Arc<WelcomeMessageStore>,
        bot: User,
        plugin_id: impl Into<String>,
        callback_base_url: Option<String>,
        channel_ephemeral_delay: Duration,
    ) -> Self {
        Self {
            api,
            store,
            bot: Arc::new(bot),
            plugin_id: plugin_id.into(),
            callback_base_url,
            channel_ephemeral_delay,
        }
    }

    pub fn api(&self) -> &dyn PluginApi {
        self.api.as_ref()
    }

    pub fn store(&self) -> &WelcomeMessageStore {
        &self.store
    }

    pub fn bot_user(&self) -> &User {
        &self.bot
    }

    pub fn bot_user_id(&self) -> &str {
        &self.bot.id
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn channel_ephemeral_delay(&self) -> Duration {
        self.channel_ephemeral_delay
    }

    /// Looks up everything a template can refer to. With no team the team and
    /// town square fields stay empty.
    pub async fn build_template(
        &self,
        user_id: &str,
        team_id: Option<&str>,
    ) -> Result<MessageTemplate, HostError> {
        let user = self.api.get_user(user_id).await?;
        let mut template = MessageTemplate {
            welcome_bot: self.bot.as_ref().clone(),
            user_display_name: user.display_name(),
            ..MessageTemplate::default()
        };

        if let Some(team_id) = team_id {
            template.team = self.api.get_team(team_id).await?;
            template.townsquare = self.api.get_channel_by_name(team_id, TOWN_SQUARE_CHANNEL).await?;
        }
        template.direct_message = self.api.get_direct_channel(user_id, &self.bot.id).await?;
        template.user = user;
        Ok(template)
    }

    /// Base URL the host uses to reach button callbacks.
    pub async fn callback_base(&self) -> String {
        let base = match &self.callback_base_url {
            Some(url) => url.clone(),
            None => match self.api.site_url().await {
                Ok(Some(url)) if !url.trim().is_empty() => url,
                Ok(_) => DEFAULT_SITE_URL.to_owned(),
                Err(error) => {
                    warn!(
                        event_name = "welcomebot.site_url.lookup_failed",
                        error = %error,
                        "falling back to default site url"
                    );
                    DEFAULT_SITE_URL.to_owned()
                }
            },
        };

        if base.contains("localhost") || base.contains("127.0.0.1") {
            warn!(
                event_name = "welcomebot.site_url.localhost",
                callback_base = %base,
                "callback url points at localhost; the host must allow untrusted internal connections to 127.0.0.1 for buttons to work"
            );
        }
        base
    }

    /// Renders `message` into a post for `channel_id` with one attachment
    /// carrying the attachment text and the button actions.
    pub fn welcome_post(
        &self,
        template: &MessageTemplate,
        message: &ConfigMessage,
        channel_id: &str,
        callback_base: &str,
    ) -> Result<Post, TemplateError> {
        let text = template.render(&message.message)?;
        let builder = PostBuilder::new(channel_id, self.bot_user_id()).message(text);

        let buttons: Vec<&ConfigMessageAction> = message.button_actions().collect();
        if message.attachment_message.is_empty() && buttons.is_empty() {
            return Ok(builder.build());
        }

        let attachment_text = template.render(&message.attachment_message)?;
        let url = action_url(callback_base, &self.plugin_id);
        Ok(builder
            .attachment(|attachment| {
                attachment.text(attachment_text);
                for button in buttons {
                    attachment.button(
                        button.action_display_name.clone(),
                        url.clone(),
                        ActionContext {
                            team_id: template.team.id.clone(),
                            user_id: template.user.id.clone(),
                            action: button.action_name.clone(),
                        },
                    );
                }
            })
            .build())
    }

    /// Runs automatic actions and posts the welcome message to the user's DM channel.
    pub async fn deliver_welcome(
        &self,
        template: &MessageTemplate,
        message: &ConfigMessage,
    ) -> Result<Post, WelcomeError> {
        let callback_base = self.callback_base().await;

        for action in message.automatic_actions() {
            for channel_name in &action.channels_added_to {
                self.join_channel(&template.team.id, &template.user.id, channel_name).await;
            }
        }

        let post = self.welcome_post(template, message, &template.direct_message.id, &callback_base)?;
        let created = self.api.create_post(post).await?;
        info!(
            event_name = "welcomebot.welcome.delivered",
            user_id = %template.user.id,
            team_id = %template.team.id,
            "welcome message delivered"
        );
        Ok(created)
    }

    /// Delivers on a detached task after the message's delay. The handle is
    /// only awaited by tests.
    pub fn schedule_welcome(&self, template: MessageTemplate, message: ConfigMessage) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            if message.delay_in_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(message.delay_in_seconds)).await;
            }
            if let Err(error) = service.deliver_welcome(&template, &message).await {
                error!(
                    event_name = "welcomebot.welcome.delivery_failed",
                    user_id = %template.user.id,
                    team_id = %template.team.id,
                    error = %error,
                    "could not create the welcome post"
                );
            }
        })
    }

    /// Runs a clicked button action: joins its channels and DMs the success message.
    pub async fn run_action(
        &self,
        template: &MessageTemplate,
        action: &ConfigMessageAction,
    ) -> Result<Post, WelcomeError> {
        for channel_name in &action.channels_added_to {
            self.join_channel(&template.team.id, &template.user.id, channel_name).await;
        }

        let text = template.render(&action.action_successful_message)?;
        let post = text_post(&template.direct_message.id, self.bot_user_id(), text);
        Ok(self.api.create_post(post).await?)
    }

    /// Adds the user to a channel of the team by name. A missing channel or a
    /// failed add is logged and skipped.
    pub async fn join_channel(&self, team_id: &str, user_id: &str, channel_name: &str) -> bool {
        let channel = match self.api.get_channel_by_name(team_id, channel_name).await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(
                    event_name = "welcomebot.channel.lookup_failed",
                    channel_name,
                    team_id,
                    user_id,
                    error = %error,
                    "failed to get channel, continuing to the next channel"
                );
                return false;
            }
        };

        if let Err(error) = self.api.add_channel_member(&channel.id, user_id).await {
            warn!(
                event_name = "welcomebot.channel.add_failed",
                channel_id = %channel.id,
                user_id,
                error = %error,
                "couldn't add user to the channel, continuing to the next channel"
            );
            return false;
        }
        true
    }
}
