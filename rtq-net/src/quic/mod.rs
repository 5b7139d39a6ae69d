pub mod config;
pub mod connection;
