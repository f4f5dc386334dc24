pub mod config;
pub mod http;
pub mod monitoring;
pub mod persistence;
pub mod upstream;
