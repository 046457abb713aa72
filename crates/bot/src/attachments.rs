use welcomebot_core::domain::model::{
    ActionContext, Post, PostAction, PostActionIntegration, PostProps, SlackAttachment,
};

/// Path segment the host posts button clicks to.
pub const ADD_CHANNELS_PATH: &str = "addchannels";

pub fn action_url(callback_base: &str, plugin_id: &str) -> String {
    format!("{}/plugins/{plugin_id}/{ADD_CHANNELS_PATH}", callback_base.trim_end_matches('/'))
}

pub struct PostBuilder {
    channel_id: String,
    user_id: String,
    message: String,
    attachments: Vec<SlackAttachment>,
}

impl PostBuilder {
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            message: String::new(),
            attachments: Vec::new(),
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn attachment<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut AttachmentBuilder),
    {
        let mut builder = AttachmentBuilder::default();
        build(&mut builder);
        self.attachments.push(builder.build());
        self
    }

    pub fn build(self) -> Post {
        Post {
            id: String::new(),
            channel_id: self.channel_id,
            user_id: self.user_id,
            message: self.message,
            props: PostProps { attachments: self.attachments },
        }
    }
}

#[derive(Default)]
pub struct AttachmentBuilder {
    text: String,
    actions: Vec<PostAction>,
}

impl AttachmentBuilder {
    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = text.into();
        self
    }

    pub fn button(&mut self, label: impl Into<String>, url: impl Into<String>, context: ActionContext) -> &mut Self {
        self.actions.push(PostAction {
            name: label.into(),
            integration: PostActionIntegration { url: url.into(), context },
        });
        self
    }

    fn build(self) -> SlackAttachment {
        SlackAttachment { text: self.text, actions: self.actions }
    }
}

/// Plain bot post, used for command replies and raw overrides.
pub fn text_post(channel_id: &str, bot_user_id: &str, message: impl Into<String>) -> Post {
    PostBuilder::new(channel_id, bot_user_id).message(message).build()
}

#[cfg(test)]
mod tests {
    use welcomebot_core::domain::model::ActionContext;

    use super::{action_url, text_post, PostBuilder};

    #[test]
    fn action_url_joins_without_double_slash() {
        assert_eq!(
            action_url("https://chat.example.com/", "com.mattermost.welcomebot"),
            "https://chat.example.com/plugins/com.mattermost.welcomebot/addchannels"
        );
    }

    #[test]
    fn builder_renders_attachment_with_buttons() {
        let post = PostBuilder::new("dm1", "bot")
            .message("Welcome!")
            .attachment(|attachment| {
                attachment.text("Pick a channel").button(
                    "Join dev",
                    "https://chat.example.com/plugins/wb/addchannels",
                    ActionContext {
                        team_id: "t1".to_owned(),
                        user_id: "u1".to_owned(),
                        action: "dev".to_owned(),
                    },
                );
            })
            .build();

        let encoded = serde_json::to_value(&post).expect("encode");
        assert_eq!(encoded["props"]["attachments"][0]["text"], "Pick a channel");
        assert_eq!(encoded["props"]["attachments"][0]["actions"][0]["name"], "Join dev");
        assert_eq!(
            encoded["props"]["attachments"][0]["actions"][0]["integration"]["context"]["action"],
            "dev"
        );
    }

    #[test]
    fn text_post_has_no_attachments() {
        let post = text_post("c1", "bot", "hello");
        assert!(post.props.is_empty());
        assert_eq!(post.message, "hello");
    }
}
