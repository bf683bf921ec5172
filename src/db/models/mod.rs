mod ban_record;
mod protected_room;

pub use ban_record::{nick_key, BanRecord, BanRow, BanSubject, Expiry};
pub use protected_room::ProtectedRoom;
