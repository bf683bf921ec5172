pub mod bot;
pub mod commands;
pub mod config;
pub mod constants;
pub mod db;
pub mod gateway;
pub mod handlers;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;
