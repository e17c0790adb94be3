//! Parsing of the lines typed into the terminal.

use little_chat_core::{MessageId, MessageView, Role};

/// What a line of input asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Nothing but whitespace.
    Empty,
    /// A prompt to send.
    Prompt(String),
    /// `/regen [n]`: regenerate the n-th reply (1-based), or the last one.
    Regenerate(Option<usize>),
    /// `/history`: print the whole transcript.
    History,
    /// `/clear`: erase the history, after confirmation.
    Clear,
    /// `/quit`: leave.
    Quit,
    /// A command used the wrong way. Holds the usage text.
    Usage(&'static str),
}

impl Input {
    /// Parses a line of input.
    ///
    /// Lines starting with an unknown `/` command are sent as prompts.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }

        let mut parts = line.split_whitespace();
        let (Some(command), rest) = (parts.next(), parts.next()) else {
            return Input::Empty;
        };
        let trailing = parts.next().is_some();
        match (command, rest) {
            ("/regen", None) => Input::Regenerate(None),
            ("/regen", Some(n)) if !trailing => match n.parse::<usize>() {
                Ok(n) if n > 0 => Input::Regenerate(Some(n)),
                _ => Input::Usage("/regen [n], n counting replies from 1"),
            },
            ("/regen", Some(_)) => {
                Input::Usage("/regen [n], n counting replies from 1")
            }
            ("/history", None) => Input::History,
            ("/clear", None) => Input::Clear,
            ("/quit", None) => Input::Quit,
            _ => Input::Prompt(line.to_owned()),
        }
    }
}

/// Finds the assistant message `/regen` refers to.
///
/// `nth` counts assistant messages from 1; `None` means the last one.
pub fn regenerate_target(
    messages: &[MessageView],
    nth: Option<usize>,
) -> Option<&MessageId> {
    let mut replies = messages.iter().filter(|m| m.role == Role::Assistant);
    let target = match nth {
        Some(n) => replies.nth(n.checked_sub(1)?),
        None => replies.last(),
    };
    target.map(|m| &m.id)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Input::parse("  \n"), Input::Empty);
        assert_eq!(
            Input::parse(" hello world \n"),
            Input::Prompt("hello world".to_owned())
        );
        assert_eq!(Input::parse("/regen"), Input::Regenerate(None));
        assert_eq!(Input::parse("/regen 2"), Input::Regenerate(Some(2)));
        assert!(matches!(Input::parse("/regen 0"), Input::Usage(_)));
        assert!(matches!(Input::parse("/regen two"), Input::Usage(_)));
        assert!(matches!(Input::parse("/regen 1 2"), Input::Usage(_)));
        assert_eq!(Input::parse("/history"), Input::History);
        assert_eq!(Input::parse("/clear"), Input::Clear);
        assert_eq!(Input::parse("/quit"), Input::Quit);
        assert_eq!(
            Input::parse("/fail now"),
            Input::Prompt("/fail now".to_owned())
        );
        assert_eq!(
            Input::parse("/clear everything"),
            Input::Prompt("/clear everything".to_owned())
        );
    }

    fn view(id: &str, role: Role) -> MessageView {
        MessageView {
            id: id.into(),
            role,
            text: String::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            is_streaming: false,
            is_loading: false,
        }
    }

    #[test]
    fn test_regenerate_target() {
        let messages = [
            view("u1", Role::User),
            view("a1", Role::Assistant),
            view("u2", Role::User),
            view("a2", Role::Assistant),
        ];
        assert_eq!(
            regenerate_target(&messages, None).map(MessageId::as_str),
            Some("a2")
        );
        assert_eq!(
            regenerate_target(&messages, Some(1)).map(MessageId::as_str),
            Some("a1")
        );
        assert_eq!(regenerate_target(&messages, Some(3)), None);
        assert_eq!(regenerate_target(&messages, Some(0)), None);
        assert_eq!(regenerate_target(&[], None), None);
    }
}
