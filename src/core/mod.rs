//! Core relay engine module

pub mod client;
pub mod config;
pub mod errors;
pub mod invoker;
pub mod key_pool;
pub mod models;
pub mod retrier;
pub mod translator;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
