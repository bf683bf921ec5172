pub mod ban;
pub mod dispatcher;
pub mod info;
pub mod parser;
pub mod room;
pub mod sync;

pub use dispatcher::dispatch;
pub use parser::{Command, HELP_TEXT};
