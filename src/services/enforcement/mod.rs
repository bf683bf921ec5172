pub mod fanout;
pub mod reconciler;

pub use fanout::{FanoutOutcome, FanoutReport, RoomFailure};
pub use reconciler::{reconcile, reconcile_rooms, RoomReport, RoomStatus, SyncMode, SyncReport};
