use gatekeeper_core::{ApprovalAction, ApprovalKind, NameError, PlayerName};

pub const DUPLICATE_SUBMISSION_WARNING: &str =
    "You have already whitelisted an username, you cannot whitelist more than one username.";
pub const SUBMISSION_NOT_SAVED: &str =
    "Your submission could not be saved right now. Please try again in a moment.";
pub const SUBMISSION_NOT_FORWARDED: &str =
    "Your submission was saved but could not be forwarded for review. Please contact a moderator.";
pub const ACTION_NOT_RECOGNIZED: &str = "Action not recognized";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonStyle {
    Success,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonElement {
    pub custom_id: String,
    pub label: String,
    pub style: Option<ButtonStyle>,
}

impl ButtonElement {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { custom_id: custom_id.into(), label: label.into(), style: None }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }
}

/// Transport-neutral message body; the bridge renders it into a Discord message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTemplate {
    pub content: String,
    pub action_rows: Vec<Vec<ButtonElement>>,
}

impl MessageTemplate {
    pub fn buttons(&self) -> impl Iterator<Item = &ButtonElement> {
        self.action_rows.iter().flatten()
    }
}

pub struct MessageBuilder {
    content: String,
    action_rows: Vec<Vec<ButtonElement>>,
}

impl MessageBuilder {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), action_rows: Vec::new() }
    }

    pub fn actions<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.action_rows.push(builder.build());
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { content: self.content, action_rows: self.action_rows }
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

pub fn text_message(content: impl Into<String>) -> MessageTemplate {
    MessageBuilder::new(content).build()
}

pub fn approval_request_message(name: &PlayerName) -> MessageTemplate {
    let approve = ApprovalAction::new(ApprovalKind::Approve, name.clone());
    let reject = ApprovalAction::new(ApprovalKind::Reject, name.clone());

    MessageBuilder::new(format!("Select an option for **{name}**:"))
        .actions(|actions| {
            actions
                .button(
                    ButtonElement::new(approve.encode(), ApprovalKind::Approve.label())
                        .style(ButtonStyle::Success),
                )
                .button(
                    ButtonElement::new(reject.encode(), ApprovalKind::Reject.label())
                        .style(ButtonStyle::Danger),
                );
        })
        .build()
}

pub fn invalid_name_warning(error: &NameError) -> String {
    format!(
        "That doesn't look like a valid username ({error}). Usernames are 3-16 letters, digits or underscores."
    )
}
