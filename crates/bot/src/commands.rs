use async_trait::async_trait;
use thiserror::Error;

use welcomebot_core::domain::model::{CommandArgs, CommandRegistration, Post};

pub const COMMAND_TRIGGER: &str = "welcomebot";

pub const ACTION_PREVIEW: &str = "preview";
pub const ACTION_LIST: &str = "list";
pub const ACTION_SET_CHANNEL_WELCOME: &str = "set_channel_welcome";
pub const ACTION_GET_CHANNEL_WELCOME: &str = "get_channel_welcome";
pub const ACTION_DELETE_CHANNEL_WELCOME: &str = "delete_channel_welcome";
pub const ACTION_SET_TEAM_WELCOME: &str = "set_team_welcome";
pub const ACTION_GET_TEAM_WELCOME: &str = "get_team_welcome";
pub const ACTION_DELETE_TEAM_WELCOME: &str = "delete_team_welcome";
pub const ACTION_HELP: &str = "help";

const COMMAND_HELP: &str = "* |/welcomebot preview [team-name] | - preview the welcome message for the given team name. The current user's username will be used to render the template.
* |/welcomebot list| - list the teams for which welcome messages were defined.
The following commands will only be allowed to be run by system admins and users with permission to manage channel roles. |set_channel_welcome|, |get_channel_welcome| and |delete_channel_welcome|.
* |/welcomebot set_channel_welcome [welcome-message]| - set the welcome message for the given channel. Direct channels are not supported.
* |/welcomebot get_channel_welcome| - print the welcome message set for the given channel (if any)
* |/welcomebot delete_channel_welcome| - delete the welcome message for the given channel (if any)
* |/welcomebot set_team_welcome [welcome-message]| - set a brief welcome message for your current team.
* |/welcomebot get_team_welcome| - print the welcome message set for the given team (if any)
* |/welcomebot delete_team_welcome| - delete the dynamic welcome message for the given team (if any)
";

/// A tokenized `/welcomebot` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub action: String,
    pub parameters: Vec<String>,
    pub raw: String,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WelcomeCommand {
    Preview { team_name: String },
    List,
    SetChannelWelcome { message: String },
    GetChannelWelcome,
    DeleteChannelWelcome,
    SetTeamWelcome { message: String },
    GetTeamWelcome,
    DeleteTeamWelcome,
    Help,
    Unknown { action: String },
}

/// What the bot answers with, always shown to the caller only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandReply {
    Text(String),
    Post(Post),
}

impl CommandReply {
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }
}

/// Failures whose message is shown to the caller as is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("{0}")]
    Denied(String),
    #[error("{0}")]
    Failed(String),
}

/// Splits the command line; `None` when it is not a `/welcomebot` command.
pub fn normalize_welcome_command(args: &CommandArgs) -> Option<CommandEnvelope> {
    let mut tokens = args.command.split_whitespace();
    if tokens.next()? != format!("/{COMMAND_TRIGGER}") {
        return None;
    }

    let action = tokens.next().unwrap_or_default().to_owned();
    let parameters = tokens.map(str::to_owned).collect();

    Some(CommandEnvelope {
        action,
        parameters,
        raw: args.command.clone(),
        team_id: args.team_id.clone(),
        channel_id: args.channel_id.clone(),
        user_id: args.user_id.clone(),
    })
}

/// Arity check; the returned text is shown to the caller and stops processing.
pub fn validate_arity(action: &str, parameters: &[String]) -> Option<String> {
    match action {
        ACTION_PREVIEW if parameters.len() != 1 => {
            Some("Please specify a team, for which preview should be made.".to_owned())
        }
        ACTION_LIST if !parameters.is_empty() => {
            Some("List command does not accept any extra parameters".to_owned())
        }
        ACTION_SET_CHANNEL_WELCOME | ACTION_SET_TEAM_WELCOME if parameters.is_empty() => {
            Some(format!("`{action}` command requires the message to be provided"))
        }
        ACTION_GET_CHANNEL_WELCOME
        | ACTION_DELETE_CHANNEL_WELCOME
        | ACTION_GET_TEAM_WELCOME
        | ACTION_DELETE_TEAM_WELCOME
            if !parameters.is_empty() =>
        {
            Some(format!("`{action}` command does not accept any extra parameters"))
        }
        _ => None,
    }
}

/// Everything after the action keyword, trimmed, with inner whitespace kept.
pub fn extract_message(raw: &str, action: &str) -> Option<String> {
    let (_, message) = raw.split_once(action)?;
    let message = message.trim();
    if message.is_empty() {
        return None;
    }
    Some(message.to_owned())
}

pub fn classify_welcome_command(envelope: &CommandEnvelope) -> WelcomeCommand {
    let message = || extract_message(&envelope.raw, &envelope.action).unwrap_or_default();
    match envelope.action.as_str() {
        ACTION_PREVIEW => WelcomeCommand::Preview {
            team_name: envelope.parameters.first().cloned().unwrap_or_default(),
        },
        ACTION_LIST => WelcomeCommand::List,
        ACTION_SET_CHANNEL_WELCOME => WelcomeCommand::SetChannelWelcome { message: message() },
        ACTION_GET_CHANNEL_WELCOME => WelcomeCommand::GetChannelWelcome,
        ACTION_DELETE_CHANNEL_WELCOME => WelcomeCommand::DeleteChannelWelcome,
        ACTION_SET_TEAM_WELCOME => WelcomeCommand::SetTeamWelcome { message: message() },
        ACTION_GET_TEAM_WELCOME => WelcomeCommand::GetTeamWelcome,
        ACTION_DELETE_TEAM_WELCOME => WelcomeCommand::DeleteTeamWelcome,
        ACTION_HELP | "" => WelcomeCommand::Help,
        other => WelcomeCommand::Unknown { action: other.to_owned() },
    }
}

pub fn help_text() -> String {
    format!(
        "###### Mattermost welcomebot Plugin - Slash Command Help\n{}",
        COMMAND_HELP.replace('|', "`")
    )
}

pub fn command_registration() -> CommandRegistration {
    let actions = [
        ACTION_PREVIEW,
        ACTION_HELP,
        ACTION_LIST,
        ACTION_SET_CHANNEL_WELCOME,
        ACTION_GET_CHANNEL_WELCOME,
        ACTION_DELETE_CHANNEL_WELCOME,
        ACTION_SET_TEAM_WELCOME,
        ACTION_GET_TEAM_WELCOME,
        ACTION_DELETE_TEAM_WELCOME,
    ];

    CommandRegistration {
        trigger: COMMAND_TRIGGER.to_owned(),
        display_name: COMMAND_TRIGGER.to_owned(),
        description: "Welcome Bot helps add new team members to channels.".to_owned(),
        auto_complete: true,
        auto_complete_desc: format!("Available commands: {}", actions.join(", ")),
        auto_complete_hint: "[command]".to_owned(),
    }
}

pub fn permission_denied_message(action: &str) -> String {
    format!(
        "`/welcomebot {action}` commands can only be executed by the user with a system admin role, team admin role, or channel admin role"
    )
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: WelcomeCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn route(&self, envelope: CommandEnvelope) -> Result<CommandReply, CommandRouteError> {
        if let Some(message) = validate_arity(&envelope.action, &envelope.parameters) {
            return Ok(CommandReply::Text(message));
        }

        self.service.authorize(&envelope).await?;
        let command = classify_welcome_command(&envelope);

        match command {
            WelcomeCommand::Preview { team_name } => self.service.preview(&team_name, &envelope).await,
            WelcomeCommand::List => self.service.list(&envelope).await,
            WelcomeCommand::SetChannelWelcome { message } => {
                self.service.set_channel_welcome(&message, &envelope).await
            }
            WelcomeCommand::GetChannelWelcome => self.service.get_channel_welcome(&envelope).await,
            WelcomeCommand::DeleteChannelWelcome => {
                self.service.delete_channel_welcome(&envelope).await
            }
            WelcomeCommand::SetTeamWelcome { message } => {
                self.service.set_team_welcome(&message, &envelope).await
            }
            WelcomeCommand::GetTeamWelcome => self.service.get_team_welcome(&envelope).await,
            WelcomeCommand::DeleteTeamWelcome => self.service.delete_team_welcome(&envelope).await,
            WelcomeCommand::Help => Ok(CommandReply::Text(help_text())),
            WelcomeCommand::Unknown { action } => {
                Ok(CommandReply::Text(format!("Unknown action {action}")))
            }
        }
    }
}

#[async_trait]
pub trait WelcomeCommandService: Send + Sync {
    /// Gate applied to every action, help included.
    async fn authorize(&self, envelope: &CommandEnvelope) -> Result<(), CommandRouteError>;

    async fn preview(
        &self,
        team_name: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError>;

    async fn list(&self, envelope: &CommandEnvelope) -> Result<CommandReply, CommandRouteError>;

    async fn set_channel_welcome(
        &self,
        message: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError>;

    async fn get_channel_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError>;

    async fn delete_channel_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError>;

    async fn set_team_welcome(
        &self,
        message: &str,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError>;

    async fn get_team_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError>;

    async fn delete_team_welcome(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<CommandReply, CommandRouteError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use welcomebot_core::domain::model::CommandArgs;

    use super::{
        classify_welcome_command, command_registration, extract_message, help_text,
        normalize_welcome_command, permission_denied_message, validate_arity, CommandEnvelope,
        CommandReply, CommandRouteError, CommandRouter, WelcomeCommand, WelcomeCommandService,
    };

    fn args(command: &str) -> CommandArgs {
        CommandArgs {
            command: command.to_owned(),
            team_id: "t1".to_owned(),
            channel_id: "c1".to_owned(),
            user_id: "u1".to_owned(),
        }
    }

    fn envelope(command: &str) -> CommandEnvelope {
        normalize_welcome_command(&args(command)).expect("welcomebot command")
    }

    #[test]
    fn normalize_splits_action_and_parameters() {
        let envelope = envelope("/welcomebot  preview   engineering ");
        assert_eq!(envelope.action, "preview");
        assert_eq!(envelope.parameters, vec!["engineering"]);
        assert_eq!(envelope.team_id, "t1");

        let bare = self::envelope("/welcomebot");
        assert_eq!(bare.action, "");
        assert!(bare.parameters.is_empty());
    }

    #[test]
    fn normalize_ignores_other_commands() {
        assert!(normalize_welcome_command(&args("/weather today")).is_none());
        assert!(normalize_welcome_command(&args("   ")).is_none());
    }

    #[test]
    fn arity_rules_match_each_action() {
        let none: Vec<String> = Vec::new();
        let one = vec!["x".to_owned()];
        let two = vec!["x".to_owned(), "y".to_owned()];

        assert_eq!(
            validate_arity("preview", &none).as_deref(),
            Some("Please specify a team, for which preview should be made.")
        );
        assert!(validate_arity("preview", &two).is_some());
        assert!(validate_arity("preview", &one).is_none());
        assert_eq!(
            validate_arity("list", &one).as_deref(),
            Some("List command does not accept any extra parameters")
        );
        assert_eq!(
            validate_arity("set_team_welcome", &none).as_deref(),
            Some("`set_team_welcome` command requires the message to be provided")
        );
        assert_eq!(
            validate_arity("delete_channel_welcome", &one).as_deref(),
            Some("`delete_channel_welcome` command does not accept any extra parameters")
        );
        assert!(validate_arity("set_channel_welcome", &two).is_none());
        assert!(validate_arity("help", &two).is_none());
    }

    #[test]
    fn extracted_message_keeps_inner_whitespace() {
        assert_eq!(
            extract_message("/welcomebot set_channel_welcome  Hello   there\n  friend  ", "set_channel_welcome")
                .as_deref(),
            Some("Hello   there\n  friend")
        );
        assert_eq!(extract_message("/welcomebot set_team_welcome   ", "set_team_welcome"), None);
    }

    #[test]
    fn classify_maps_known_actions() {
        assert_eq!(classify_welcome_command(&envelope("/welcomebot")), WelcomeCommand::Help);
        assert_eq!(classify_welcome_command(&envelope("/welcomebot help")), WelcomeCommand::Help);
        assert_eq!(
            classify_welcome_command(&envelope("/welcomebot set_team_welcome Hi  all")),
            WelcomeCommand::SetTeamWelcome { message: "Hi  all".to_owned() }
        );
        assert_eq!(
            classify_welcome_command(&envelope("/welcomebot dance")),
            WelcomeCommand::Unknown { action: "dance".to_owned() }
        );
    }

    #[test]
    fn help_text_uses_backticks() {
        let help = help_text();
        assert!(help.starts_with("###### Mattermost welcomebot Plugin - Slash Command Help\n"));
        assert!(help.contains("`/welcomebot list`"));
        assert!(!help.contains('|'));
    }

    #[test]
    fn command_registration_lists_every_action() {
        let registration = command_registration();
        assert_eq!(registration.trigger, "welcomebot");
        assert!(registration.auto_complete);
        assert!(registration.auto_complete_desc.contains("delete_team_welcome"));
        assert!(registration.auto_complete_desc.starts_with("Available commands: preview, help, list"));
    }

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
        deny: bool,
    }

    #[async_trait::async_trait]
    impl WelcomeCommandService for RecordingService {
        async fn authorize(&self, envelope: &CommandEnvelope) -> Result<(), CommandRouteError> {
            self.calls.lock().expect("lock").push("authorize".to_owned());
            if self.deny {
                return Err(CommandRouteError::Denied(permission_denied_message(&envelope.action)));
            }
            Ok(())
        }

        async fn preview(
            &self,
            team_name: &str,
            _envelope: &CommandEnvelope,
        ) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push(format!("preview:{team_name}"));
            Ok(CommandReply::text("preview"))
        }

        async fn list(&self, _envelope: &CommandEnvelope) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push("list".to_owned());
            Ok(CommandReply::text("list"))
        }

        async fn set_channel_welcome(
            &self,
            message: &str,
            _envelope: &CommandEnvelope,
        ) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push(format!("set_channel:{message}"));
            Ok(CommandReply::text("set"))
        }

        async fn get_channel_welcome(
            &self,
            _envelope: &CommandEnvelope,
        ) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push("get_channel".to_owned());
            Ok(CommandReply::text("get"))
        }

        async fn delete_channel_welcome(
            &self,
            _envelope: &CommandEnvelope,
        ) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push("delete_channel".to_owned());
            Ok(CommandReply::text("delete"))
        }

        async fn set_team_welcome(
            &self,
            message: &str,
            _envelope: &CommandEnvelope,
        ) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push(format!("set_team:{message}"));
            Ok(CommandReply::text("set"))
        }

        async fn get_team_welcome(
            &self,
            _envelope: &CommandEnvelope,
        ) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push("get_team".to_owned());
            Ok(CommandReply::text("get"))
        }

        async fn delete_team_welcome(
            &self,
            _envelope: &CommandEnvelope,
        ) -> Result<CommandReply, CommandRouteError> {
            self.calls.lock().expect("lock").push("delete_team".to_owned());
            Ok(CommandReply::text("delete"))
        }
    }

    #[tokio::test]
    async fn router_authorizes_then_calls_service_entrypoints() {
        let router = CommandRouter::new(RecordingService::default());
        for command in [
            "/welcomebot preview engineering",
            "/welcomebot list",
            "/welcomebot set_channel_welcome Hello there",
            "/welcomebot get_channel_welcome",
            "/welcomebot delete_channel_welcome",
            "/welcomebot set_team_welcome Hi",
            "/welcomebot get_team_welcome",
            "/welcomebot delete_team_welcome",
        ] {
            router.route(envelope(command)).await.expect("route");
        }

        let calls = router.service().calls.lock().expect("lock").clone();
        let dispatched: Vec<&str> =
            calls.iter().map(String::as_str).filter(|call| *call != "authorize").collect();
        assert_eq!(
            dispatched,
            vec![
                "preview:engineering",
                "list",
                "set_channel:Hello there",
                "get_channel",
                "delete_channel",
                "set_team:Hi",
                "get_team",
                "delete_team",
            ]
        );
        assert_eq!(calls.iter().filter(|call| *call == "authorize").count(), 8);
    }

    #[tokio::test]
    async fn router_gates_help_and_validates_before_gate() {
        let router = CommandRouter::new(RecordingService { deny: true, ..RecordingService::default() });

        let arity = router.route(envelope("/welcomebot list extra")).await.expect("arity");
        assert_eq!(arity, CommandReply::text("List command does not accept any extra parameters"));
        assert!(router.service().calls.lock().expect("lock").is_empty());

        let denied = router.route(envelope("/welcomebot list")).await.expect_err("denied");
        assert_eq!(
            denied.to_string(),
            "`/welcomebot list` commands can only be executed by the user with a system admin role, team admin role, or channel admin role"
        );

        for command in ["/welcomebot help", "/welcomebot"] {
            let denied = router.route(envelope(command)).await.expect_err("help is gated");
            assert!(matches!(denied, CommandRouteError::Denied(_)));
        }
    }

    #[tokio::test]
    async fn help_is_answered_after_authorization() {
        let router = CommandRouter::new(RecordingService::default());
        let help = router.route(envelope("/welcomebot")).await.expect("help");
        assert!(matches!(help, CommandReply::Text(text) if text.contains("Slash Command Help")));
        assert_eq!(*router.service().calls.lock().expect("lock"), vec!["authorize".to_owned()]);
    }

    #[tokio::test]
    async fn unknown_action_is_reported_after_authorization() {
        let router = CommandRouter::new(RecordingService::default());
        let reply = router.route(envelope("/welcomebot dance now")).await.expect("route");
        assert_eq!(reply, CommandReply::text("Unknown action dance"));
        assert_eq!(*router.service().calls.lock().expect("lock"), vec!["authorize".to_owned()]);
    }
}
