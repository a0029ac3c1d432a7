//! Session orchestration: the phase state machine and the service that hosts it.

mod connections;
mod machine;
mod memorization;
mod registry;
mod topics;

pub use crate::error::SessionError;
pub use machine::{Collaborators, PhaseStateMachine};
pub use registry::TutorService;
