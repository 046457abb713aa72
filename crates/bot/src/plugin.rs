use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use welcomebot_core::config::DEFAULT_PLUGIN_ID;
use welcomebot_core::domain::model::{CommandArgs, CommandResponse};
use welcomebot_core::errors::{HostError, SettingsError};
use welcomebot_core::host::PluginApi;
use welcomebot_core::settings::WelcomeMessageStore;

use crate::actions::{self, ActionResponse};
use crate::attachments::text_post;
use crate::commands::{command_registration, normalize_welcome_command, CommandReply, CommandRouter};
use crate::events::{default_dispatcher, DispatchError, EventDispatcher, HookEvent, HookOutcome};
use crate::welcome::WelcomeService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationOptions {
    pub plugin_id: String,
    /// Overrides the host site URL in button callback URLs.
    pub callback_base_url: Option<String>,
    /// Wait before the channel welcome is repeated ephemerally in the channel.
    pub channel_ephemeral_delay: Duration,
}

impl Default for ActivationOptions {
    fn default() -> Self {
        Self {
            plugin_id: DEFAULT_PLUGIN_ID.to_owned(),
            callback_base_url: None,
            channel_ephemeral_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("failed to activate against the host: {0}")]
    Host(#[from] HostError),
    #[error("failed to load the welcome messages: {0}")]
    Settings(#[from] SettingsError),
}

/// Entry point for every host callback once the bot is activated.
pub struct WelcomeBot {
    service: WelcomeService,
    router: CommandRouter<WelcomeService>,
    hooks: EventDispatcher,
}

impl WelcomeBot {
    /// Resolves the bot user, loads the welcome messages and registers `/welcomebot`.
    pub async fn activate(
        api: Arc<dyn PluginApi>,
        options: ActivationOptions,
    ) -> Result<Self, ActivationError> {
        let bot = api.get_bot_user().await?;

        let store = Arc::new(WelcomeMessageStore::default());
        let configuration = api.load_plugin_configuration().await?;
        let messages = store.reload(&configuration)?;

        api.register_command(command_registration()).await?;

        let service = WelcomeService::new(
            api,
            store,
            bot,
            options.plugin_id,
            options.callback_base_url,
            options.channel_ephemeral_delay,
        );
        info!(
            event_name = "welcomebot.plugin.activated",
            plugin_id = %service.plugin_id(),
            bot_user_id = %service.bot_user_id(),
            messages,
            "welcomebot activated"
        );

        Ok(Self {
            hooks: default_dispatcher(&service),
            router: CommandRouter::new(service.clone()),
            service,
        })
    }

    pub fn service(&self) -> &WelcomeService {
        &self.service
    }

    pub fn plugin_id(&self) -> &str {
        self.service.plugin_id()
    }

    /// Runs a slash command. Replies reach the caller as an ephemeral post so
    /// the command response itself is always empty.
    pub async fn execute_command(&self, args: &CommandArgs) -> CommandResponse {
        let Some(envelope) = normalize_welcome_command(args) else {
            return CommandResponse::default();
        };

        let action = envelope.action.clone();
        let reply = match self.router.route(envelope).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "welcomebot.command.failed",
                    action = %action,
                    user_id = %args.user_id,
                    error = %error,
                    "welcomebot command did not complete"
                );
                CommandReply::Text(error.to_string())
            }
        };

        let post = match reply {
            CommandReply::Text(text) => text_post(&args.channel_id, self.service.bot_user_id(), text),
            CommandReply::Post(post) => post,
        };
        if let Err(error) = self.service.api().send_ephemeral_post(&args.user_id, post).await {
            error!(
                event_name = "welcomebot.command.reply_failed",
                action = %action,
                user_id = %args.user_id,
                error = %error,
                "could not send the command reply"
            );
        }
        CommandResponse::default()
    }

    pub async fn handle_hook(&self, event: &HookEvent) -> Result<HookOutcome, DispatchError> {
        self.hooks.dispatch(event).await
    }

    pub async fn handle_action(&self, body: &[u8]) -> ActionResponse {
        actions::handle_action(&self.service, body).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use welcomebot_core::domain::model::{CommandArgs, CommandResponse};

    use super::{ActivationError, ActivationOptions, WelcomeBot};
    use crate::events::{HookEvent, HookOutcome, TeamJoinEvent};
    use crate::testing::{fixture, FakeHost, ADMIN, MEMBER, TEAM};

    fn args(user_id: &str, command: &str) -> CommandArgs {
        CommandArgs {
            command: command.to_owned(),
            team_id: TEAM.to_owned(),
            channel_id: "c-town".to_owned(),
            user_id: user_id.to_owned(),
        }
    }

    async fn activate(host: Arc<FakeHost>) -> WelcomeBot {
        WelcomeBot::activate(host, ActivationOptions::default()).await.expect("activate")
    }

    #[tokio::test]
    async fn activation_registers_the_command_and_loads_messages() {
        let host = Arc::new(fixture().with_configuration(json!({
            "WelcomeMessages": "[{\"TeamName\": \"engineering\", \"Message\": \"Hi\"}]"
        })));
        let bot = activate(host.clone()).await;

        assert_eq!(bot.plugin_id(), "com.mattermost.welcomebot");
        assert_eq!(bot.service().store().team_names(), vec!["engineering".to_owned()]);

        let registered = host.registered.lock().expect("lock").clone();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].trigger, "welcomebot");
    }

    #[tokio::test]
    async fn activation_fails_on_invalid_configuration() {
        let host = Arc::new(fixture().with_configuration(json!({"WelcomeMessages": 42})));
        let error = WelcomeBot::activate(host.clone(), ActivationOptions::default())
            .await
            .err()
            .expect("invalid configuration");
        assert!(matches!(error, ActivationError::Settings(_)));
        assert!(host.registered.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn command_replies_are_ephemeral_posts_from_the_bot() {
        let host = Arc::new(fixture());
        let bot = activate(host.clone()).await;

        let response = bot.execute_command(&args(ADMIN, "/welcomebot help")).await;
        assert_eq!(response, CommandResponse::default());

        let ephemeral = host.ephemeral();
        assert_eq!(ephemeral.len(), 1);
        assert_eq!(ephemeral[0].0, ADMIN);
        assert_eq!(ephemeral[0].1.channel_id, "c-town");
        assert_eq!(ephemeral[0].1.user_id, "bot");
        assert!(ephemeral[0].1.message.starts_with("###### Mattermost welcomebot Plugin - Slash Command Help"));
    }

    #[tokio::test]
    async fn denied_commands_report_the_reason() {
        let host = Arc::new(fixture());
        let bot = activate(host.clone()).await;

        bot.execute_command(&args(MEMBER, "/welcomebot list")).await;
        assert_eq!(
            host.ephemeral_messages(),
            vec![
                "`/welcomebot list` commands can only be executed by the user with a system admin role, team admin role, or channel admin role"
                    .to_owned()
            ]
        );
    }

    #[tokio::test]
    async fn help_is_denied_to_members_without_admin_roles() {
        let host = Arc::new(fixture());
        let bot = activate(host.clone()).await;

        bot.execute_command(&args(MEMBER, "/welcomebot help")).await;
        bot.execute_command(&args(MEMBER, "/welcomebot")).await;
        let messages = host.ephemeral_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            "`/welcomebot help` commands can only be executed by the user with a system admin role, team admin role, or channel admin role"
        );
        assert!(messages.iter().all(|message| !message.contains("Slash Command Help")));
    }

    #[tokio::test]
    async fn other_commands_are_ignored() {
        let host = Arc::new(fixture());
        let bot = activate(host.clone()).await;

        let response = bot.execute_command(&args(ADMIN, "/remind me later")).await;
        assert_eq!(response, CommandResponse::default());
        assert!(host.ephemeral().is_empty());
    }

    #[tokio::test]
    async fn hooks_and_actions_reach_their_handlers() {
        let host = Arc::new(fixture().with_kv("teammsg_t1", "Hello team"));
        let bot = activate(host.clone()).await;

        let event = HookEvent::UserHasJoinedTeam(TeamJoinEvent {
            team_id: TEAM.to_owned(),
            user_id: MEMBER.to_owned(),
        });
        assert!(matches!(bot.handle_hook(&event).await.expect("hook"), HookOutcome::Delivered));
        assert_eq!(host.posts()[0].message, "Hello team");

        let response = bot.handle_action(b"null").await;
        assert_eq!(response.ephemeral_text, "WelcomeBot Error: We could not decode the action");
    }
}
