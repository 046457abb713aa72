//! `PluginApi` over the host's REST API (`/api/v4`), with KV storage kept in
//! the local SQLite database.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use welcomebot_core::config::AppConfig;
use welcomebot_core::domain::model::{Channel, ChannelMember, CommandRegistration, Post, Team, TeamMember, User};
use welcomebot_core::errors::HostError;
use welcomebot_core::host::PluginApi;
use welcomebot_core::kv::KvStore;
use welcomebot_db::SqliteKvStore;

use crate::command_tokens::CommandTokens;

const TEAMS_PER_PAGE: usize = 200;

pub struct MattermostApi {
    client: Client,
    base_url: String,
    token: SecretString,
    plugin_id: String,
    command_url: String,
    kv: SqliteKvStore,
    command_tokens: CommandTokens,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegisteredCommand {
    trigger: String,
    token: String,
}

#[derive(Serialize)]
struct TeamCommandPayload<'a> {
    team_id: &'a str,
    method: &'static str,
    url: &'a str,
    trigger: &'a str,
    display_name: &'a str,
    description: &'a str,
    auto_complete: bool,
    auto_complete_desc: &'a str,
    auto_complete_hint: &'a str,
}

impl MattermostApi {
    pub fn new(config: &AppConfig, kv: SqliteKvStore) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.host.timeout_secs)).build()?;
        Ok(Self {
            client,
            base_url: config.host.url.trim_end_matches('/').to_owned(),
            token: config.host.bot_token.clone(),
            plugin_id: config.host.plugin_id.clone(),
            command_url: command_url(config.callback_base_url(), &config.host.plugin_id),
            kv,
            command_tokens: CommandTokens::default(),
        })
    }

    /// Shared view of the per-team command tokens seen during registration.
    pub fn command_tokens(&self) -> CommandTokens {
        self.command_tokens.clone()
    }

    async fn register_team_command(&self, team_id: &str, command: &CommandRegistration) -> Result<(), HostError> {
        let existing: Vec<RegisteredCommand> =
            self.get(&format!("commands?team_id={team_id}&custom_only=true"), "commands", team_id).await?;
        if let Some(registered) = existing.iter().find(|registered| registered.trigger == command.trigger) {
            self.command_tokens.insert(&registered.token);
            debug!(
                event_name = "welcomebot.host.command_present",
                team_id,
                trigger = %command.trigger,
                "slash command already registered"
            );
            return Ok(());
        }

        let payload = TeamCommandPayload {
            team_id,
            method: "P",
            url: &self.command_url,
            trigger: &command.trigger,
            display_name: &command.display_name,
            description: &command.description,
            auto_complete: command.auto_complete,
            auto_complete_desc: &command.auto_complete_desc,
            auto_complete_hint: &command.auto_complete_hint,
        };
        let created: RegisteredCommand = self.post("commands", &payload, "commands", team_id).await?;
        self.command_tokens.insert(&created.token);
        info!(
            event_name = "welcomebot.host.command_registered",
            team_id,
            trigger = %command.trigger,
            "slash command registered"
        );
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/api/v4/{path}", self.base_url))
            .bearer_auth(self.token.expose_secret())
    }

    async fn send<T>(&self, request: RequestBuilder, entity: &'static str, id: &str) -> Result<T, HostError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await.map_err(|error| HostError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, entity, id, &body));
        }
        response.json::<T>().await.map_err(|error| HostError::Decode(error.to_string()))
    }

    async fn get<T>(&self, path: &str, entity: &'static str, id: &str) -> Result<T, HostError>
    where
        T: DeserializeOwned,
    {
        self.send(self.request(Method::GET, path), entity, id).await
    }

    async fn post<B, T>(&self, path: &str, body: &B, entity: &'static str, id: &str) -> Result<T, HostError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.request(Method::POST, path).json(body), entity, id).await
    }
}

pub fn command_url(callback_base: &str, plugin_id: &str) -> String {
    format!("{}/plugins/{plugin_id}/command", callback_base.trim_end_matches('/'))
}

/// Maps a non-success host status onto the error the bot logic branches on.
pub fn status_error(status: StatusCode, entity: &'static str, id: &str, body: &str) -> HostError {
    match status {
        StatusCode::NOT_FOUND => HostError::not_found(entity, id),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            HostError::Forbidden(format!("{entity} {id}: {status}"))
        }
        _ => HostError::Transport(format!("{entity} {id}: {status} {}", body.trim())),
    }
}

/// Picks this plugin's settings out of the host configuration document.
/// The host stores plugin ids lowercased.
pub fn plugin_settings(config: &Value, plugin_id: &str) -> Value {
    let plugins = &config["PluginSettings"]["Plugins"];
    plugins
        .get(plugin_id.to_lowercase())
        .or_else(|| plugins.get(plugin_id))
        .cloned()
        .unwrap_or(Value::Null)
}

pub fn site_url(config: &Value) -> Option<String> {
    config["ServiceSettings"]["SiteURL"]
        .as_str()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
}

#[async_trait]
impl PluginApi for MattermostApi {
    async fn get_bot_user(&self) -> Result<User, HostError> {
        self.get("users/me", "user", "me").await
    }

    async fn get_user(&self, user_id: &str) -> Result<User, HostError> {
        self.get(&format!("users/{user_id}"), "user", user_id).await
    }

    async fn get_team(&self, team_id: &str) -> Result<Team, HostError> {
        self.get(&format!("teams/{team_id}"), "team", team_id).await
    }

    async fn get_team_by_name(&self, name: &str) -> Result<Team, HostError> {
        self.get(&format!("teams/name/{name}"), "team", name).await
    }

    async fn list_teams(&self) -> Result<Vec<Team>, HostError> {
        let mut teams = Vec::new();
        for page in 0.. {
            let batch: Vec<Team> = self
                .get(&format!("teams?page={page}&per_page={TEAMS_PER_PAGE}"), "teams", &page.to_string())
                .await?;
            let done = batch.len() < TEAMS_PER_PAGE;
            teams.extend(batch);
            if done {
                break;
            }
        }
        Ok(teams)
    }

    async fn get_team_member(&self, team_id: &str, user_id: &str) -> Result<TeamMember, HostError> {
        self.get(
            &format!("teams/{team_id}/members/{user_id}"),
            "team member",
            &format!("{team_id}/{user_id}"),
        )
        .await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HostError> {
        self.get(&format!("channels/{channel_id}"), "channel", channel_id).await
    }

    async fn get_channel_by_name(&self, team_id: &str, name: &str) -> Result<Channel, HostError> {
        self.get(&format!("teams/{team_id}/channels/name/{name}"), "channel", name).await
    }

    async fn get_channel_member(&self, channel_id: &str, user_id: &str) -> Result<ChannelMember, HostError> {
        self.get(
            &format!("channels/{channel_id}/members/{user_id}"),
            "channel member",
            &format!("{channel_id}/{user_id}"),
        )
        .await
    }

    async fn get_direct_channel(&self, user_id: &str, other_user_id: &str) -> Result<Channel, HostError> {
        self.post("channels/direct", &[user_id, other_user_id], "direct channel", user_id).await
    }

    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<ChannelMember, HostError> {
        self.post(
            &format!("channels/{channel_id}/members"),
            &json!({ "user_id": user_id }),
            "channel",
            channel_id,
        )
        .await
    }

    async fn create_post(&self, post: Post) -> Result<Post, HostError> {
        let channel_id = post.channel_id.clone();
        self.post("posts", &post, "channel", &channel_id).await
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<Post, HostError> {
        let channel_id = post.channel_id.clone();
        self.post("posts/ephemeral", &json!({ "user_id": user_id, "post": post }), "channel", &channel_id)
            .await
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError> {
        self.kv.get(key).await
    }

    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), HostError> {
        self.kv.set(key, value).await
    }

    async fn kv_delete(&self, key: &str) -> Result<(), HostError> {
        self.kv.delete(key).await
    }

    async fn load_plugin_configuration(&self) -> Result<Value, HostError> {
        let config: Value = self.get("config", "config", "server").await?;
        Ok(plugin_settings(&config, &self.plugin_id))
    }

    async fn site_url(&self) -> Result<Option<String>, HostError> {
        let config: Value = self.get("config", "config", "server").await?;
        Ok(site_url(&config))
    }

    async fn register_command(&self, command: CommandRegistration) -> Result<(), HostError> {
        let teams = self.list_teams().await?;
        let mut failed = 0usize;
        for team in &teams {
            if let Err(error) = self.register_team_command(&team.id, &command).await {
                failed += 1;
                warn!(
                    event_name = "welcomebot.host.command_register_failed",
                    team_id = %team.id,
                    trigger = %command.trigger,
                    error = %error,
                    "slash command registration failed for team"
                );
            }
        }
        info!(
            event_name = "welcomebot.host.command_registration_done",
            teams = teams.len(),
            failed,
            tokens = self.command_tokens.len(),
            "slash command registration finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Query, State},
        http::StatusCode as HttpStatus,
        routing::get,
        Json, Router,
    };
    use reqwest::StatusCode;
    use serde_json::{json, Value};

    use welcomebot_core::config::AppConfig;
    use welcomebot_core::domain::model::CommandRegistration;
    use welcomebot_core::errors::HostError;
    use welcomebot_core::host::PluginApi;
    use welcomebot_db::{connect_with_settings, migrations::run_pending, SqliteKvStore};

    use super::{command_url, plugin_settings, site_url, status_error, MattermostApi};

    type CreatedFor = Arc<Mutex<Vec<String>>>;

    async fn list_teams() -> Json<Value> {
        Json(json!([
            {"id": "t-broken", "name": "broken", "display_name": "Broken"},
            {"id": "t-new", "name": "new", "display_name": "New"},
            {"id": "t-present", "name": "present", "display_name": "Present"}
        ]))
    }

    async fn list_commands(Query(query): Query<HashMap<String, String>>) -> Result<Json<Value>, HttpStatus> {
        match query.get("team_id").map(String::as_str) {
            Some("t-broken") => Err(HttpStatus::INTERNAL_SERVER_ERROR),
            Some("t-present") => Ok(Json(json!([{"trigger": "welcomebot", "token": "present-token"}]))),
            _ => Ok(Json(json!([]))),
        }
    }

    async fn create_command(State(created): State<CreatedFor>, Json(body): Json<Value>) -> Json<Value> {
        let team_id = body["team_id"].as_str().unwrap_or_default().to_owned();
        created.lock().expect("created lock").push(team_id);
        Json(json!({"trigger": body["trigger"], "token": "new-token"}))
    }

    async fn fake_host(created: CreatedFor) -> String {
        let app = Router::new()
            .route("/api/v4/teams", get(list_teams))
            .route("/api/v4/commands", get(list_commands).post(create_command))
            .with_state(created);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake host");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake host");
        });
        format!("http://{address}")
    }

    async fn api(host_url: String) -> MattermostApi {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        let mut config = AppConfig::default();
        config.host.url = host_url;
        MattermostApi::new(&config, SqliteKvStore::new(pool)).expect("client")
    }

    #[tokio::test]
    async fn one_failing_team_does_not_stop_command_registration() {
        let created = CreatedFor::default();
        let api = api(fake_host(created.clone()).await).await;
        let tokens = api.command_tokens();

        api.register_command(CommandRegistration {
            trigger: "welcomebot".to_owned(),
            display_name: "welcomebot".to_owned(),
            ..CommandRegistration::default()
        })
        .await
        .expect("registration should tolerate a failing team");

        assert_eq!(*created.lock().expect("created lock"), vec!["t-new".to_owned()]);
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains("new-token"));
        assert!(tokens.contains("present-token"));
    }

    #[test]
    fn status_codes_map_to_host_errors() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "team", "t1", ""),
            HostError::not_found("team", "t1")
        );
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "user", "u1", "denied"),
            HostError::Forbidden(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "user", "u1", ""),
            HostError::Forbidden(_)
        ));
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "posts", "c1", " upstream down \n"),
            HostError::Transport("posts c1: 502 Bad Gateway upstream down".to_owned())
        );
    }

    #[test]
    fn plugin_settings_use_the_lowercased_plugin_id() {
        let config = json!({
            "PluginSettings": {"Plugins": {
                "com.mattermost.welcomebot": {"welcomemessages": []}
            }}
        });
        assert_eq!(
            plugin_settings(&config, "com.Mattermost.WelcomeBot"),
            json!({"welcomemessages": []})
        );
        assert_eq!(plugin_settings(&config, "com.example.other"), Value::Null);
        assert_eq!(plugin_settings(&json!({}), "com.mattermost.welcomebot"), Value::Null);
    }

    #[test]
    fn site_url_ignores_blank_values() {
        assert_eq!(
            site_url(&json!({"ServiceSettings": {"SiteURL": "https://chat.example.com"}})),
            Some("https://chat.example.com".to_owned())
        );
        assert_eq!(site_url(&json!({"ServiceSettings": {"SiteURL": "  "}})), None);
        assert_eq!(site_url(&json!({})), None);
    }

    #[test]
    fn command_url_points_at_the_plugin_route() {
        assert_eq!(
            command_url("https://bot.example.com/", "com.mattermost.welcomebot"),
            "https://bot.example.com/plugins/com.mattermost.welcomebot/command"
        );
    }
}
