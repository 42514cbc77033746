//! [`UseApp`] command: nominates an application to open the URL.
//!
//! Script output: `Use: com.example.Browser`

use crate::command::{CommandError, RoutingCommand, RoutingState};
use crate::handler::HandlerId;

/// Adds a handler to the chosen set. Repeating a handler has no extra effect.
#[derive(Debug, Clone)]
pub struct UseApp {
    pub handler: HandlerId,
}

impl UseApp {
    pub const NAME: &'static str = "Use";
}

impl RoutingCommand for UseApp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(argument: &str) -> Result<Self, CommandError> {
        HandlerId::new(argument)
            .map(|handler| Self { handler })
            .ok_or_else(|| CommandError::InvalidAppId(argument.to_string()))
    }

    fn apply(&self, state: &mut RoutingState) {
        state.handlers.insert(self.handler.clone());
    }
}
