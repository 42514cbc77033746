//! Parser for the line protocol scripts speak on stdout.
//!
//! A command line looks like `Token: argument`. The token is one or more ASCII
//! letters anchored at the start of the line; the argument is everything after
//! the first `": "`, verbatim. Lines without that shape are ordinary script
//! chatter and are ignored.

use crate::command::{CommandError, RoutingCommand};
use crate::commands::{UrlOverride, UseApp};
use regex::Regex;
use std::sync::LazyLock;

static COMMAND_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+): (.+)$").expect("command pattern compiles"));

type ParseFn = fn(&str) -> Result<Box<dyn RoutingCommand>, CommandError>;

static REGISTRY: &[(&str, ParseFn)] = &[
    (UrlOverride::NAME, UrlOverride::parse_boxed),
    (UseApp::NAME, UseApp::parse_boxed),
];

/// Split a line into `(token, argument)` if it has the command shape.
pub fn split_command(line: &str) -> Option<(&str, &str)> {
    let captures = COMMAND_LINE.captures(line)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

/// Parse one line of script stdout.
///
/// Returns `None` for lines that are not shaped like a command, and
/// `Some(Err(_))` for command-shaped lines that are unknown or carry an
/// invalid argument.
///
/// # Example
///
/// ```
/// use urlscript::parser::parse_line;
///
/// let cmd = parse_line("Use: com.example.Browser").unwrap().unwrap();
/// assert_eq!(cmd.name(), "Use");
/// assert!(parse_line("hello world").is_none());
/// ```
pub fn parse_line(line: &str) -> Option<Result<Box<dyn RoutingCommand>, CommandError>> {
    let (token, argument) = split_command(line)?;
    let parsed = REGISTRY
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, parse)| parse(argument))
        .unwrap_or_else(|| Err(CommandError::Unrecognized(token.to_string())));
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RoutingState;

    fn apply(line: &str, state: &mut RoutingState) {
        parse_line(line).unwrap().unwrap().apply(state);
    }

    #[test]
    fn test_use_command() {
        let cmd = parse_line("Use: com.example.App").unwrap().unwrap();
        assert_eq!(cmd.name(), "Use");

        let mut state = RoutingState::default();
        cmd.apply(&mut state);
        assert!(state.handlers.iter().any(|h| h.as_str() == "com.example.App"));
    }

    #[test]
    fn test_url_command() {
        let mut state = RoutingState::default();
        apply("URL: http://example.com/x", &mut state);
        assert_eq!(
            state.target_url.as_ref().map(|u| u.as_str()),
            Some("http://example.com/x")
        );
    }

    #[test]
    fn test_invalid_url_reports_literal_argument() {
        let err = parse_line("URL: not a url??").unwrap().unwrap_err();
        assert_eq!(err, CommandError::InvalidUrl("not a url??".to_string()));
        assert!(err.to_string().contains("not a url??"));
    }

    #[test]
    fn test_unrecognized_token() {
        let err = parse_line("Open: appA").unwrap().unwrap_err();
        assert_eq!(err.to_string(), "\"Open\" is not a recognized command");
    }

    #[test]
    fn test_tokens_are_case_sensitive() {
        assert!(matches!(
            parse_line("use: appA"),
            Some(Err(CommandError::Unrecognized(_)))
        ));
    }

    #[test]
    fn test_non_command_lines_ignored() {
        for line in [
            "hello world",
            "",
            "Use:appA",
            " Use: appA",
            "Use2: appA",
            "Use: ",
            "com.example: x",
            "Test Routines Activated",
        ] {
            assert!(parse_line(line).is_none(), "expected {line:?} to be ignored");
        }
    }

    #[test]
    fn test_argument_is_verbatim() {
        assert_eq!(
            split_command("Use:  spaced app "),
            Some(("Use", " spaced app "))
        );
        assert_eq!(
            split_command("URL: http://a.example/?q=1: 2"),
            Some(("URL", "http://a.example/?q=1: 2"))
        );
    }
}
