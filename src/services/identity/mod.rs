pub mod resolver;

pub use resolver::{IdentityResolver, Occupant, Resolution};
