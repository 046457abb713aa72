use async_trait::async_trait;

use crate::errors::HostError;

pub const CHANNEL_WELCOME_PREFIX: &str = "chanmsg_";
pub const TEAM_WELCOME_PREFIX: &str = "teammsg_";

pub fn channel_welcome_key(channel_id: &str) -> String {
    format!("{CHANNEL_WELCOME_PREFIX}{channel_id}")
}

pub fn team_welcome_key(team_id: &str) -> String {
    format!("{TEAM_WELCOME_PREFIX}{team_id}")
}

/// String key to byte blob storage backing the welcome message overrides.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), HostError>;
    async fn delete(&self, key: &str) -> Result<(), HostError>;
}

/// Decodes a stored override. Empty values count as unset.
pub fn decode_message(value: Option<Vec<u8>>) -> Option<String> {
    let value = value?;
    if value.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&value).into_owned())
}
