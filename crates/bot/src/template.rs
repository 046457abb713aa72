//! Message template rendering.
//!
//! Templates are written against a PascalCase view of the event
//! (`{{.User.Username}}`, `{{.UserDisplayName}}`, `{{.Team.DisplayName}}`).
//! The leading-dot field syntax is accepted and rewritten to plain Tera paths
//! before rendering, so `{{ User.Username }}` works as well.

use std::collections::HashMap;

use serde_json::{json, Value};
use tera::{Context, Tera};
use thiserror::Error;

use welcomebot_core::domain::model::{Channel, Team, User};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template could not be rendered: {0}")]
    Render(String),
}

/// Everything a welcome template can refer to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageTemplate {
    pub welcome_bot: User,
    pub user: User,
    pub team: Team,
    pub townsquare: Channel,
    pub direct_message: Channel,
    pub user_display_name: String,
}

impl MessageTemplate {
    fn to_context(&self) -> Context {
        let mut context = Context::new();
        context.insert("WelcomeBot", &user_view(&self.welcome_bot));
        context.insert("User", &user_view(&self.user));
        context.insert("Team", &json!({
            "Id": self.team.id,
            "Name": self.team.name,
            "DisplayName": self.team.display_name,
        }));
        context.insert("Townsquare", &channel_view(&self.townsquare));
        context.insert("DirectMessage", &channel_view(&self.direct_message));
        context.insert("UserDisplayName", &self.user_display_name);
        context
    }

    pub fn render(&self, lines: &[String]) -> Result<String, TemplateError> {
        render_lines(lines, &self.to_context())
    }
}

fn user_view(user: &User) -> Value {
    json!({
        "Id": user.id,
        "Username": user.username,
        "FirstName": user.first_name,
        "LastName": user.last_name,
        "Nickname": user.nickname,
        "Email": user.email,
    })
}

fn channel_view(channel: &Channel) -> Value {
    json!({
        "Id": channel.id,
        "Name": channel.name,
        "DisplayName": channel.display_name,
    })
}

/// Registers the custom filters available to welcome templates.
///
/// - `mention`: prefixes a username with `@`, e.g. `{{ User.Username | mention }}`
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("mention", tera_mention_filter);
}

fn tera_mention_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let name = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("mention filter expects a string input"))?;
    let name = name.trim().trim_start_matches('@');
    if name.is_empty() {
        return Ok(Value::String(String::new()));
    }
    Ok(Value::String(format!("@{name}")))
}

fn render_lines(lines: &[String], context: &Context) -> Result<String, TemplateError> {
    if lines.is_empty() {
        return Ok(String::new());
    }

    let source = normalize_field_syntax(&lines.join("\n"));
    let mut tera = Tera::default();
    register_template_filters(&mut tera);
    tera.render_str(&source, context).map_err(|error| TemplateError::Render(describe(&error)))
}

fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Rewrites `{{.Field.Path}}` expressions into `{{ Field.Path }}`.
pub fn normalize_field_syntax(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };

        output.push_str("{{ ");
        output.push_str(&strip_field_dots(after_open[..end].trim()));
        output.push_str(" }}");
        rest = &after_open[end + 2..];
    }

    output.push_str(rest);
    output
}

fn strip_field_dots(expression: &str) -> String {
    let mut output = String::with_capacity(expression.len());
    let mut previous: Option<char> = None;

    for ch in expression.chars() {
        let starts_path = previous.map_or(true, |p| p.is_whitespace() || p == '(' || p == '|');
        if ch == '.' && starts_path {
            previous = Some(ch);
            continue;
        }
        output.push(ch);
        previous = Some(ch);
    }

    output
}
