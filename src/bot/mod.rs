pub mod console;
pub mod data;
pub mod error;
pub mod framework;

pub use data::Data;
pub use error::Error;
