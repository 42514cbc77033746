//! [`UrlOverride`] command: replaces the URL that will be opened.
//!
//! Script output: `URL: https://example.com/elsewhere`

use crate::command::{CommandError, RoutingCommand, RoutingState};
use url::Url;

/// Replaces the target URL. The last valid `URL:` line wins.
#[derive(Debug, Clone)]
pub struct UrlOverride {
    pub url: Url,
}

impl UrlOverride {
    pub const NAME: &'static str = "URL";
}

impl RoutingCommand for UrlOverride {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(argument: &str) -> Result<Self, CommandError> {
        Url::parse(argument)
            .map(|url| Self { url })
            .map_err(|_| CommandError::InvalidUrl(argument.to_string()))
    }

    fn apply(&self, state: &mut RoutingState) {
        state.target_url = Some(self.url.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_url() {
        let cmd = UrlOverride::parse("http://example.com/x").unwrap();
        assert_eq!(cmd.url.as_str(), "http://example.com/x");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = UrlOverride::parse("not a url??").unwrap_err();
        assert_eq!(err.to_string(), "\"not a url??\" is not a valid URL");
    }

    #[test]
    fn test_apply_replaces_target() {
        let mut state = RoutingState::new(Url::parse("http://example.com/a").ok());
        UrlOverride::parse("http://example.com/b")
            .unwrap()
            .apply(&mut state);
        assert_eq!(
            state.target_url.map(String::from).as_deref(),
            Some("http://example.com/b")
        );
    }
}
