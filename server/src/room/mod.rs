//! Collaboration rooms: presence, slide locks and content relay for one document each.

pub mod locks;
pub mod names;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod state;

pub use locks::{LockOutcome, LockTable, ReleaseOutcome};
pub use registry::{RoomRegistry, RoomSlot};
pub use relay::RelayOutcome;
pub use state::{Outbound, Recipients, Room, RoomError, RoomParticipant, now_millis};
