use std::fmt;

use thiserror::Error;

pub const PLAYER_NAME_MIN_LEN: usize = 3;
pub const PLAYER_NAME_MAX_LEN: usize = 16;

const ACTION_DELIMITER: char = ':';

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("player name is empty")]
    Empty,
    #[error("player name must be {min}..={max} characters, got {len}")]
    Length { len: usize, min: usize, max: usize },
    #[error("player name contains unsupported character `{0}`")]
    InvalidCharacter(char),
}

/// A trimmed player name: ASCII letters, digits and `_`, 3 to 16 characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlayerName(String);

impl PlayerName {
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(NameError::Empty);
        }

        if let Some(ch) = name.chars().find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_') {
            return Err(NameError::InvalidCharacter(ch));
        }

        let len = name.len();
        if !(PLAYER_NAME_MIN_LEN..=PLAYER_NAME_MAX_LEN).contains(&len) {
            return Err(NameError::Length {
                len,
                min: PLAYER_NAME_MIN_LEN,
                max: PLAYER_NAME_MAX_LEN,
            });
        }

        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApprovalKind {
    Approve,
    Reject,
}

impl ApprovalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "Whitelist",
            Self::Reject => "Reject",
        }
    }

    fn command_verb(&self) -> &'static str {
        match self {
            Self::Approve => "whitelistaddcommand",
            Self::Reject => "whitelistremovecommand",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("action identifier `{0}` has no `:` delimiter")]
    MissingDelimiter(String),
    #[error("unknown action kind `{0}`")]
    UnknownKind(String),
    #[error("action identifier has a malformed escape sequence")]
    MalformedEscape,
    #[error(transparent)]
    InvalidName(#[from] NameError),
}

/// The decision attached to one button of a pending approval request.
///
/// Encoded as `<kind>:<name>` so the request needs no record of its own.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApprovalAction {
    pub kind: ApprovalKind,
    pub name: PlayerName,
}

impl ApprovalAction {
    pub fn new(kind: ApprovalKind, name: PlayerName) -> Self {
        Self { kind, name }
    }

    pub fn encode(&self) -> String {
        format!("{}{ACTION_DELIMITER}{}", self.kind.as_str(), escape_component(self.name.as_str()))
    }

    pub fn parse(identifier: &str) -> Result<Self, ActionParseError> {
        let (kind, raw_name) = identifier
            .split_once(ACTION_DELIMITER)
            .ok_or_else(|| ActionParseError::MissingDelimiter(identifier.to_owned()))?;
        let kind = ApprovalKind::from_token(kind)
            .ok_or_else(|| ActionParseError::UnknownKind(kind.to_owned()))?;
        let name = unescape_component(raw_name).ok_or(ActionParseError::MalformedEscape)?;

        Ok(Self { kind, name: PlayerName::parse(&name)? })
    }

    /// Command string sent to the external executor.
    pub fn command(&self) -> String {
        format!("{} {}", self.kind.command_verb(), self.name)
    }

    pub fn confirmation(&self) -> String {
        match self.kind {
            ApprovalKind::Approve => format!("**{}** has been whitelisted!", self.name),
            ApprovalKind::Reject => format!("**{}** has been rejected.", self.name),
        }
    }
}

fn escape_component(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_component(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0usize;

    while index < bytes.len() {
        match bytes[index] {
            b'%' => {
                if index + 2 >= bytes.len() {
                    return None;
                }

                let high = hex_nibble(bytes[index + 1])?;
                let low = hex_nibble(bytes[index + 2])?;
                decoded.push((high << 4) | low);
                index += 3;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }

    String::from_utf8(decoded).ok()
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        escape_component, unescape_component, ActionParseError, ApprovalAction, ApprovalKind,
        NameError, PlayerName,
    };

    fn name(raw: &str) -> PlayerName {
        PlayerName::parse(raw).expect("valid player name")
    }

    #[test]
    fn player_name_is_trimmed() {
        assert_eq!(name("  Steve \n").as_str(), "Steve");
    }

    #[test]
    fn player_name_rejects_empty_and_whitespace() {
        assert_eq!(PlayerName::parse(""), Err(NameError::Empty));
        assert_eq!(PlayerName::parse("   \t"), Err(NameError::Empty));
    }

    #[test]
    fn player_name_rejects_delimiters_and_spaces() {
        assert_eq!(PlayerName::parse("Ste:ve"), Err(NameError::InvalidCharacter(':')));
        assert_eq!(PlayerName::parse("Steve op"), Err(NameError::InvalidCharacter(' ')));
        assert_eq!(PlayerName::parse("Steve-1"), Err(NameError::InvalidCharacter('-')));
    }

    #[test]
    fn player_name_enforces_length_bounds() {
        assert!(matches!(PlayerName::parse("ab"), Err(NameError::Length { len: 2, .. })));
        assert!(PlayerName::parse("abc").is_ok());
        assert!(PlayerName::parse("a_sixteen_chars_").is_ok());
        assert!(matches!(
            PlayerName::parse("seventeen_chars_x"),
            Err(NameError::Length { len: 17, .. })
        ));
    }

    #[test]
    fn approve_maps_to_whitelist_add_command() {
        let action = ApprovalAction::new(ApprovalKind::Approve, name("Steve"));
        assert_eq!(action.command(), "whitelistaddcommand Steve");
        assert_eq!(action.encode(), "approve:Steve");
        assert!(action.confirmation().contains("Steve"));
        assert!(action.confirmation().contains("whitelisted"));
    }

    #[test]
    fn reject_maps_to_whitelist_remove_command() {
        let action = ApprovalAction::new(ApprovalKind::Reject, name("Steve"));
        assert_eq!(action.command(), "whitelistremovecommand Steve");
        assert_eq!(action.encode(), "reject:Steve");
        assert!(action.confirmation().contains("rejected"));
    }

    #[test]
    fn parses_encoded_identifiers() {
        let parsed = ApprovalAction::parse("reject:Alex_99").expect("parse");
        assert_eq!(parsed.kind, ApprovalKind::Reject);
        assert_eq!(parsed.name.as_str(), "Alex_99");
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        assert_eq!(
            ApprovalAction::parse("whitelist:Steve"),
            Err(ActionParseError::UnknownKind("whitelist".to_owned()))
        );
        assert_eq!(
            ApprovalAction::parse("APPROVE:Steve"),
            Err(ActionParseError::UnknownKind("APPROVE".to_owned()))
        );
        assert!(matches!(
            ApprovalAction::parse("approve-Steve"),
            Err(ActionParseError::MissingDelimiter(_))
        ));
    }

    #[test]
    fn embedded_delimiters_never_reach_the_command() {
        assert!(matches!(
            ApprovalAction::parse("approve:Steve:extra"),
            Err(ActionParseError::InvalidName(NameError::InvalidCharacter(':')))
        ));
        assert!(matches!(
            ApprovalAction::parse("approve:Steve%3Aop"),
            Err(ActionParseError::InvalidName(NameError::InvalidCharacter(':')))
        ));
        assert_eq!(ApprovalAction::parse("approve:Ste%zzve"), Err(ActionParseError::MalformedEscape));
        assert_eq!(ApprovalAction::parse("approve:Steve%3"), Err(ActionParseError::MalformedEscape));
    }

    #[test]
    fn escape_round_trips_delimiter_characters() {
        let escaped = escape_component("a:b%c");
        assert_eq!(escaped, "a%3Ab%25c");
        assert_eq!(unescape_component(&escaped).as_deref(), Some("a:b%c"));
    }
}
