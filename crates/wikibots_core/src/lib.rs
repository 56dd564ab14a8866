pub mod api;
pub mod bots;
pub mod config;
pub mod confirm;
pub mod console;
pub mod error;
pub mod page;
pub mod pool;
pub mod prompt;
pub mod session;
pub mod signal;
pub mod source;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;
