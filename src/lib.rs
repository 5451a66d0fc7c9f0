#![forbid(unsafe_code)]

pub mod classify;
pub mod cli;
pub mod config;
pub mod dom;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod normalize;
pub mod scrape;
pub mod server;
pub mod static_fetch;
