pub mod api;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod models;
pub mod session;
pub mod transport;
