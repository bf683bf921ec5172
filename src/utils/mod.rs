pub mod formatting;
pub mod jid;
