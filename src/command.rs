//! The [`RoutingCommand`] trait and the [`RoutingState`] commands act on.

use crate::handler::HandlerId;
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Where the script has decided the URL should go so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingState {
    /// Starts as the requested URL; replaced by each `URL:` command.
    pub target_url: Option<Url>,
    /// Handlers nominated with `Use:`. Order is not significant.
    pub handlers: HashSet<HandlerId>,
}

impl RoutingState {
    pub fn new(target_url: Option<Url>) -> Self {
        Self {
            target_url,
            handlers: HashSet::new(),
        }
    }
}

/// A line of script output that matched the command grammar but could not be
/// applied. The display text is what gets reported back to the script author.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("\"{0}\" is not a valid URL")]
    InvalidUrl(String),

    #[error("\"{0}\" is not a valid app identifier")]
    InvalidAppId(String),

    #[error("\"{0}\" is not a recognized command")]
    Unrecognized(String),
}

/// A single command a script can print on stdout.
///
/// To add a command:
///
/// 1. Define `pub const NAME: &'static str` on your struct; this is the token
///    before `": "` on the output line.
/// 2. Re-export the struct from `src/commands/mod.rs`.
/// 3. Add `(MyCmd::NAME, MyCmd::parse_boxed)` to the registry in
///    [`crate::parser`].
pub trait RoutingCommand: fmt::Debug + Send + 'static {
    /// The command token, accessible through a trait object.
    fn name(&self) -> &'static str;

    /// Parse the argument (everything after `"<token>: "`, verbatim).
    fn parse(argument: &str) -> Result<Self, CommandError>
    where
        Self: Sized;

    /// Parse and box. This is the function-pointer type stored in the registry.
    fn parse_boxed(argument: &str) -> Result<Box<dyn RoutingCommand>, CommandError>
    where
        Self: Sized,
    {
        Ok(Box::new(Self::parse(argument)?))
    }

    /// Apply the command's effect.
    fn apply(&self, state: &mut RoutingState);
}
