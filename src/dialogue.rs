//! Tool-calling dialogue loop
//!
//! Implements the Elm Architecture pattern: a pure transition function over
//! [`LoopState`] plus an executor that performs the resulting effects.

mod effect;
mod error;
pub mod event;
mod executor;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use effect::Effect;
pub use error::DialogueError;
pub use event::Event;
pub use executor::DialogueLoop;
pub use state::{ExchangeOutcome, LoopConfig, LoopNotice, LoopState, ToolResult, FALLBACK_ANSWER};
pub use transition::{start, transition, TransitionError, TransitionResult};
