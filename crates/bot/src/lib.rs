//! WelcomeBot behaviors on top of the host plugin API
//!
//! - **Hooks** (`events`) - team join, channel join, user created, configuration change
//! - **Slash command** (`commands`, `service`) - `/welcomebot preview`, `list`, `set_team_welcome`, ...
//! - **Button actions** (`actions`) - `addchannels` callbacks from welcome message buttons
//! - **Rendering** (`template`, `attachments`) - message templates and post attachments
//!
//! # Architecture
//!
//! ```text
//! Host callback → WelcomeBot → EventDispatcher / CommandRouter → WelcomeService → PluginApi
//! ```
//!
//! Every host interaction goes through `welcomebot_core::PluginApi`, so the whole
//! crate runs against an in-memory host in tests.

pub mod actions;
pub mod attachments;
pub mod commands;
pub mod events;
pub mod permissions;
pub mod plugin;
pub mod service;
pub mod template;
pub mod welcome;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use plugin::{ActivationError, ActivationOptions, WelcomeBot};
