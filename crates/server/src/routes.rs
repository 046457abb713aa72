use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::post,
    Form, Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use welcomebot_bot::actions::ActionResponse;
use welcomebot_bot::events::{HookEvent, HookOutcome, HookType};
use welcomebot_bot::WelcomeBot;
use welcomebot_core::domain::model::{CommandArgs, CommandResponse};

use crate::command_tokens::CommandTokens;

#[derive(Clone)]
pub struct AppState {
    bot: Arc<WelcomeBot>,
    command_token: Option<SecretString>,
    command_tokens: CommandTokens,
    hook_secret: Option<SecretString>,
}

impl AppState {
    /// `command_token` is an operator-configured shared token; `command_tokens`
    /// holds the per-team tokens the host issued at registration. A command
    /// passes when it carries either.
    pub fn new(
        bot: Arc<WelcomeBot>,
        command_token: Option<SecretString>,
        command_tokens: CommandTokens,
        hook_secret: Option<SecretString>,
    ) -> Self {
        Self { bot, command_token, command_tokens, hook_secret }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteError {
    pub error: String,
}

type RouteResult<T> = Result<T, (StatusCode, Json<RouteError>)>;

fn reject(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<RouteError>) {
    (status, Json(RouteError { error: message.into() }))
}

/// Outgoing slash command form as posted by the host.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommandForm {
    pub token: String,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub command: String,
    pub text: String,
}

impl CommandForm {
    pub fn into_args(self) -> CommandArgs {
        let command = if self.text.trim().is_empty() {
            self.command
        } else {
            format!("{} {}", self.command, self.text)
        };
        CommandArgs { command, team_id: self.team_id, channel_id: self.channel_id, user_id: self.user_id }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookReply {
    pub hook: String,
    pub outcome: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/plugins/{plugin_id}/addchannels", post(add_channels))
        .route("/plugins/{plugin_id}/command", post(execute_command))
        .route("/plugins/{plugin_id}/hooks/{hook}", post(run_hook))
        .with_state(state)
}

fn ensure_plugin(state: &AppState, plugin_id: &str) -> RouteResult<()> {
    if plugin_id != state.bot.plugin_id() {
        return Err(reject(StatusCode::NOT_FOUND, format!("unknown plugin `{plugin_id}`")));
    }
    Ok(())
}

async fn add_channels(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
    body: Bytes,
) -> RouteResult<Json<ActionResponse>> {
    ensure_plugin(&state, &plugin_id)?;
    Ok(Json(state.bot.handle_action(&body).await))
}

async fn execute_command(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
    Form(form): Form<CommandForm>,
) -> RouteResult<Json<CommandResponse>> {
    ensure_plugin(&state, &plugin_id)?;

    check_command_token(&state, &form)?;
    Ok(Json(state.bot.execute_command(&form.into_args()).await))
}

fn check_command_token(state: &AppState, form: &CommandForm) -> RouteResult<()> {
    if state.command_token.is_none() && state.command_tokens.is_empty() {
        return Ok(());
    }

    let configured = state.command_token.as_ref().is_some_and(|expected| form.token == expected.expose_secret());
    if configured || state.command_tokens.contains(&form.token) {
        return Ok(());
    }
    warn!(
        event_name = "welcomebot.http.command_token_rejected",
        user_id = %form.user_id,
        team_id = %form.team_id,
        "slash command token mismatch"
    );
    Err(reject(StatusCode::UNAUTHORIZED, "invalid command token"))
}

fn check_hook_secret(state: &AppState, headers: &HeaderMap) -> RouteResult<()> {
    let Some(secret) = &state.hook_secret else {
        return Ok(());
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == secret.expose_secret() => Ok(()),
        Some(_) => Err(reject(StatusCode::UNAUTHORIZED, "invalid hook secret")),
        None => Err(reject(StatusCode::UNAUTHORIZED, "missing hook secret")),
    }
}

async fn run_hook(
    State(state): State<AppState>,
    Path((plugin_id, hook)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> RouteResult<Json<HookReply>> {
    ensure_plugin(&state, &plugin_id)?;
    check_hook_secret(&state, &headers)?;

    let Some(hook_type) = HookType::from_name(&hook) else {
        return Err(reject(StatusCode::NOT_FOUND, format!("unknown hook `{hook}`")));
    };
    let event = HookEvent::decode(hook_type, &body)
        .map_err(|error| reject(StatusCode::BAD_REQUEST, format!("invalid `{hook}` payload: {error}")))?;

    match state.bot.handle_hook(&event).await {
        Ok(outcome) => {
            let outcome = match outcome {
                HookOutcome::Scheduled(_) => "scheduled",
                HookOutcome::Delivered => "delivered",
                HookOutcome::Reloaded { .. } => "reloaded",
                HookOutcome::Ignored => "ignored",
            };
            Ok(Json(HookReply { hook, outcome: outcome.to_owned() }))
        }
        Err(error) => {
            error!(
                event_name = "welcomebot.http.hook_failed",
                hook = %hook,
                error = %error,
                "hook handler failed"
            );
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use welcomebot_bot::testing::{fixture, FakeHost};
    use welcomebot_bot::{ActivationOptions, WelcomeBot};

    use super::{router, AppState, CommandForm};
    use crate::command_tokens::CommandTokens;

    const BASE: &str = "/plugins/com.mattermost.welcomebot";

    async fn app(host: Arc<FakeHost>) -> Router {
        let bot = WelcomeBot::activate(host, ActivationOptions::default()).await.expect("activate");
        router(AppState::new(
            Arc::new(bot),
            Some("command-token".to_owned().into()),
            CommandTokens::default(),
            Some("hook-secret".to_owned().into()),
        ))
    }

    async fn app_with_team_tokens(host: Arc<FakeHost>, tokens: &[&str]) -> Router {
        let bot = WelcomeBot::activate(host, ActivationOptions::default()).await.expect("activate");
        let registered = CommandTokens::default();
        for token in tokens {
            registered.insert(token);
        }
        router(AppState::new(Arc::new(bot), None, registered, None))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
        (status, body)
    }

    fn command(token: &str, text: &str) -> Request<Body> {
        let form = format!(
            "token={token}&team_id=t1&channel_id=c-town&user_id=admin&command=%2Fwelcomebot&text={}",
            text.replace(' ', "+")
        );
        Request::builder()
            .method("POST")
            .uri(format!("{BASE}/command"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .expect("request")
    }

    fn hook(name: &str, secret: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("{BASE}/hooks/{name}"))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {secret}"));
        }
        builder.body(Body::from(body.to_owned())).expect("request")
    }

    #[test]
    fn command_form_joins_command_and_text() {
        let form = CommandForm {
            command: "/welcomebot".to_owned(),
            text: "set_channel_welcome  hello  there".to_owned(),
            ..CommandForm::default()
        };
        assert_eq!(form.into_args().command, "/welcomebot set_channel_welcome  hello  there");

        let bare = CommandForm { command: "/welcomebot".to_owned(), ..CommandForm::default() };
        assert_eq!(bare.into_args().command, "/welcomebot");
    }

    #[tokio::test]
    async fn command_route_replies_ephemerally() {
        let host = Arc::new(fixture());
        let (status, body) = send(app(host.clone()).await, command("command-token", "help")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({}));
        let messages = host.ephemeral_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("###### Mattermost welcomebot Plugin"));
    }

    #[tokio::test]
    async fn command_route_rejects_wrong_token() {
        let host = Arc::new(fixture());
        let (status, body) = send(app(host.clone()).await, command("forged", "list")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid command token");
        assert!(host.ephemeral().is_empty());
    }

    #[tokio::test]
    async fn command_route_accepts_tokens_issued_per_team() {
        let host = Arc::new(fixture());
        let app = app_with_team_tokens(host.clone(), &["team-one-token", "team-two-token"]).await;

        let (status, _) = send(app.clone(), command("team-two-token", "help")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(host.ephemeral_messages().len(), 1);

        let (status, body) = send(app, command("command-token", "help")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid command token");
        assert_eq!(host.ephemeral_messages().len(), 1);
    }

    #[tokio::test]
    async fn unknown_plugin_ids_are_not_found() {
        let request = Request::builder()
            .method("POST")
            .uri("/plugins/com.example.other/addchannels")
            .body(Body::from("{}"))
            .expect("request");
        let (status, _) = send(app(Arc::new(fixture())).await, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn add_channels_answers_with_ephemeral_text() {
        let request = Request::builder()
            .method("POST")
            .uri(format!("{BASE}/addchannels"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("null"))
            .expect("request");
        let (status, body) = send(app(Arc::new(fixture())).await, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ephemeral_text"], "WelcomeBot Error: We could not decode the action");
    }

    #[tokio::test]
    async fn hooks_require_the_shared_secret() {
        let host = Arc::new(fixture().with_kv("teammsg_t1", "Hello team"));
        let app = app(host.clone()).await;
        let payload = r#"{"team_id":"t1","user_id":"u1"}"#;

        let (status, body) = send(app.clone(), hook("user_has_joined_team", None, payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing hook secret");

        let (status, _) = send(app.clone(), hook("user_has_joined_team", Some("wrong"), payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(host.posts().is_empty());

        let (status, body) = send(app, hook("user_has_joined_team", Some("hook-secret"), payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "delivered");
        assert_eq!(host.posts()[0].message, "Hello team");
    }

    #[tokio::test]
    async fn unknown_hooks_and_bad_payloads_are_rejected() {
        let app = app(Arc::new(fixture())).await;

        let (status, _) = send(app.clone(), hook("message_has_been_posted", Some("hook-secret"), "{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app.clone(), hook("user_has_joined_channel", Some("hook-secret"), "[")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").starts_with("invalid `user_has_joined_channel` payload"));

        let (status, body) = send(app, hook("configuration_change", Some("hook-secret"), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "reloaded");
    }
}
