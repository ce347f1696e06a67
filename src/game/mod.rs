//! Duel simulation modules

pub mod combat;
pub mod error;
pub mod geometry;
pub mod hit;
pub mod participant;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod spawn;
pub mod timers;

pub use error::RoomError;
pub use participant::ParticipantState;
pub use registry::{Requester, RoomRegistry};
pub use session::{Action, SessionHandle, SessionSettings};
