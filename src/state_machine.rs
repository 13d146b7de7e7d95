//! Dialogue turn-taking state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{BackendCall, Event};
pub use state::{DialogueState, SessionContext};
pub use transition::{transition, TransitionError};
