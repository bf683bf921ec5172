pub mod authorization;
pub mod enforcement;
pub mod expiry;
pub mod identity;
