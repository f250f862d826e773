pub mod config;
pub mod data;
pub mod forecast;
pub mod monitoring;
pub mod store;
