pub mod config;
pub mod domain;
pub mod errors;
pub mod host;
pub mod kv;
pub mod settings;

pub use domain::message::{ActionType, ConfigMessage, ConfigMessageAction, WILDCARD_TEAM};
pub use domain::model::{
    ActionContext, Channel, ChannelMember, ChannelType, CommandArgs, CommandResponse, CommandRegistration,
    Post, PostAction, PostActionIntegration, PostProps, SlackAttachment, Team, TeamMember, User,
};
pub use errors::{HostError, SettingsError};
pub use host::PluginApi;
pub use kv::KvStore;
pub use settings::{parse_welcome_messages, WelcomeMessageStore};
