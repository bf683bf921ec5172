pub mod timeouts;
