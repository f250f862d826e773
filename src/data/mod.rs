pub mod cache;
pub mod csv_input;
pub mod sanitize;
pub mod types;
