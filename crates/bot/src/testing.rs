//! In-memory host for tests. Records every post and KV mutation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use welcomebot_core::domain::model::{
    Channel, ChannelMember, ChannelType, CommandRegistration, Post, Team, TeamMember, User,
};
use welcomebot_core::errors::HostError;
use welcomebot_core::host::PluginApi;

pub const BOT: &str = "bot";
pub const TEAM: &str = "t1";
pub const TEAM_NAME: &str = "engineering";
pub const OTHER_TEAM: &str = "t2";
pub const ADMIN: &str = "admin";
pub const TEAM_ADMIN: &str = "team-admin";
pub const CHANNEL_ADMIN: &str = "chan-admin";
pub const MEMBER: &str = "u1";
pub const GUEST: &str = "guest";

#[derive(Default)]
pub struct FakeHost {
    pub users: Mutex<HashMap<String, User>>,
    pub teams: Mutex<HashMap<String, Team>>,
    pub team_members: Mutex<HashMap<(String, String), TeamMember>>,
    pub channels: Mutex<HashMap<String, Channel>>,
    pub channel_members: Mutex<HashMap<(String, String), ChannelMember>>,
    pub posts: Mutex<Vec<Post>>,
    pub ephemeral: Mutex<Vec<(String, Post)>>,
    pub kv: Mutex<HashMap<String, Vec<u8>>>,
    pub configuration: Mutex<Value>,
    pub site_url: Mutex<Option<String>>,
    pub registered: Mutex<Vec<CommandRegistration>>,
    pub fail_kv: Mutex<bool>,
}

impl FakeHost {
    pub fn with_user(self, id: &str, username: &str, roles: &str) -> Self {
        let user = User {
            id: id.to_owned(),
            username: username.to_owned(),
            roles: roles.to_owned(),
            ..User::default()
        };
        self.users.lock().expect("lock").insert(id.to_owned(), user);
        self
    }

    pub fn with_team(self, id: &str, name: &str) -> Self {
        let team = Team { id: id.to_owned(), name: name.to_owned(), display_name: name.to_uppercase() };
        self.teams.lock().expect("lock").insert(id.to_owned(), team);
        self
    }

    pub fn with_team_member(self, team_id: &str, user_id: &str, roles: &str) -> Self {
        let member = TeamMember {
            team_id: team_id.to_owned(),
            user_id: user_id.to_owned(),
            roles: roles.to_owned(),
            delete_at: 0,
        };
        self.team_members.lock().expect("lock").insert((team_id.to_owned(), user_id.to_owned()), member);
        self
    }

    pub fn with_channel(self, id: &str, team_id: &str, name: &str, channel_type: ChannelType) -> Self {
        let channel = Channel {
            id: id.to_owned(),
            team_id: team_id.to_owned(),
            name: name.to_owned(),
            display_name: name.to_owned(),
            channel_type,
        };
        self.channels.lock().expect("lock").insert(id.to_owned(), channel);
        self
    }

    pub fn with_channel_member(self, channel_id: &str, user_id: &str, roles: &str) -> Self {
        let member = ChannelMember {
            channel_id: channel_id.to_owned(),
            user_id: user_id.to_owned(),
            roles: roles.to_owned(),
        };
        self.channel_members
            .lock()
            .expect("lock")
            .insert((channel_id.to_owned(), user_id.to_owned()), member);
        self
    }

    pub fn with_configuration(self, configuration: Value) -> Self {
        *self.configuration.lock().expect("lock") = configuration;
        self
    }

    pub fn with_kv(self, key: &str, value: &str) -> Self {
        self.kv.lock().expect("lock").insert(key.to_owned(), value.as_bytes().to_vec());
        self
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().expect("lock").clone()
    }

    pub fn ephemeral(&self) -> Vec<(String, Post)> {
        self.ephemeral.lock().expect("lock").clone()
    }

    pub fn ephemeral_messages(&self) -> Vec<String> {
        self.ephemeral().into_iter().map(|(_, post)| post.message).collect()
    }

    pub fn kv_value(&self, key: &str) -> Option<String> {
        self.kv.lock().expect("lock").get(key).map(|value| String::from_utf8_lossy(value).into_owned())
    }

    pub fn is_channel_member(&self, channel_id: &str, user_id: &str) -> bool {
        self.channel_members
            .lock()
            .expect("lock")
            .contains_key(&(channel_id.to_owned(), user_id.to_owned()))
    }

    fn check_kv(&self) -> Result<(), HostError> {
        if *self.fail_kv.lock().expect("lock") {
            return Err(HostError::Kv("disk I/O error".to_owned()));
        }
        Ok(())
    }
}

/// Host with two teams, a few channels and one user per role.
pub fn fixture() -> FakeHost {
    FakeHost::default()
        .with_user(BOT, "welcomebot", "system_user")
        .with_user(ADMIN, "root", "system_user system_admin")
        .with_user(TEAM_ADMIN, "lead", "system_user")
        .with_user(CHANNEL_ADMIN, "mod", "system_user")
        .with_user(MEMBER, "jdoe", "system_user")
        .with_user(GUEST, "visitor", "system_guest")
        .with_team(TEAM, TEAM_NAME)
        .with_team(OTHER_TEAM, "sales")
        .with_team_member(TEAM, ADMIN, "team_user")
        .with_team_member(TEAM, TEAM_ADMIN, "team_user team_admin")
        .with_team_member(TEAM, CHANNEL_ADMIN, "team_user")
        .with_team_member(TEAM, MEMBER, "team_user")
        .with_team_member(TEAM, GUEST, "team_guest")
        .with_team_member(OTHER_TEAM, ADMIN, "team_user")
        .with_channel("c-town", TEAM, "town-square", ChannelType::Open)
        .with_channel("c-dev", TEAM, "developers", ChannelType::Open)
        .with_channel("c-priv", TEAM, "secret", ChannelType::Private)
        .with_channel("c-town2", OTHER_TEAM, "town-square", ChannelType::Open)
        .with_channel_member("c-town", CHANNEL_ADMIN, "channel_user channel_admin")
        .with_channel_member("c-town", MEMBER, "channel_user")
}

fn direct_channel_id(user_id: &str, other_user_id: &str) -> String {
    let mut ids = [user_id, other_user_id];
    ids.sort_unstable();
    format!("dm_{}_{}", ids[0], ids[1])
}

#[async_trait]
impl PluginApi for FakeHost {
    async fn get_bot_user(&self) -> Result<User, HostError> {
        self.get_user(BOT).await
    }

    async fn get_user(&self, user_id: &str) -> Result<User, HostError> {
        self.users
            .lock()
            .expect("lock")
            .get(user_id)
            .cloned()
            .ok_or_else(|| HostError::not_found("user", user_id))
    }

    async fn get_team(&self, team_id: &str) -> Result<Team, HostError> {
        self.teams
            .lock()
            .expect("lock")
            .get(team_id)
            .cloned()
            .ok_or_else(|| HostError::not_found("team", team_id))
    }

    async fn get_team_by_name(&self, name: &str) -> Result<Team, HostError> {
        self.teams
            .lock()
            .expect("lock")
            .values()
            .find(|team| team.name == name)
            .cloned()
            .ok_or_else(|| HostError::not_found("team", name))
    }

    async fn list_teams(&self) -> Result<Vec<Team>, HostError> {
        let mut teams: Vec<Team> = self.teams.lock().expect("lock").values().cloned().collect();
        teams.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(teams)
    }

    async fn get_team_member(&self, team_id: &str, user_id: &str) -> Result<TeamMember, HostError> {
        self.team_members
            .lock()
            .expect("lock")
            .get(&(team_id.to_owned(), user_id.to_owned()))
            .cloned()
            .ok_or_else(|| HostError::not_found("team member", format!("{team_id}/{user_id}")))
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HostError> {
        self.channels
            .lock()
            .expect("lock")
            .get(channel_id)
            .cloned()
            .ok_or_else(|| HostError::not_found("channel", channel_id))
    }

    async fn get_channel_by_name(&self, team_id: &str, name: &str) -> Result<Channel, HostError> {
        self.channels
            .lock()
            .expect("lock")
            .values()
            .find(|channel| channel.team_id == team_id && channel.name == name)
            .cloned()
            .ok_or_else(|| HostError::not_found("channel", name))
    }

    async fn get_channel_member(&self, channel_id: &str, user_id: &str) -> Result<ChannelMember, HostError> {
        self.channel_members
            .lock()
            .expect("lock")
            .get(&(channel_id.to_owned(), user_id.to_owned()))
            .cloned()
            .ok_or_else(|| HostError::not_found("channel member", format!("{channel_id}/{user_id}")))
    }

    async fn get_direct_channel(&self, user_id: &str, other_user_id: &str) -> Result<Channel, HostError> {
        self.get_user(user_id).await?;
        self.get_user(other_user_id).await?;
        Ok(Channel {
            id: direct_channel_id(user_id, other_user_id),
            channel_type: ChannelType::Direct,
            ..Channel::default()
        })
    }

    async fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<ChannelMember, HostError> {
        self.get_channel(channel_id).await?;
        let member = ChannelMember {
            channel_id: channel_id.to_owned(),
            user_id: user_id.to_owned(),
            roles: "channel_user".to_owned(),
        };
        self.channel_members
            .lock()
            .expect("lock")
            .insert((channel_id.to_owned(), user_id.to_owned()), member.clone());
        Ok(member)
    }

    async fn create_post(&self, mut post: Post) -> Result<Post, HostError> {
        let mut posts = self.posts.lock().expect("lock");
        post.id = format!("post-{}", posts.len() + 1);
        posts.push(post.clone());
        Ok(post)
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<Post, HostError> {
        self.ephemeral.lock().expect("lock").push((user_id.to_owned(), post.clone()));
        Ok(post)
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError> {
        self.check_kv()?;
        Ok(self.kv.lock().expect("lock").get(key).cloned())
    }

    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), HostError> {
        self.check_kv()?;
        self.kv.lock().expect("lock").insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn kv_delete(&self, key: &str) -> Result<(), HostError> {
        self.check_kv()?;
        self.kv.lock().expect("lock").remove(key);
        Ok(())
    }

    async fn load_plugin_configuration(&self) -> Result<Value, HostError> {
        Ok(self.configuration.lock().expect("lock").clone())
    }

    async fn site_url(&self) -> Result<Option<String>, HostError> {
        Ok(self.site_url.lock().expect("lock").clone())
    }

    async fn register_command(&self, command: CommandRegistration) -> Result<(), HostError> {
        self.registered.lock().expect("lock").push(command);
        Ok(())
    }
}
