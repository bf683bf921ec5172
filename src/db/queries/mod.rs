pub mod ban;
pub mod room;
