pub mod commands;
pub mod config;
pub mod http;
pub mod location;
pub mod runtime;
