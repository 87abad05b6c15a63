pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod paths;
pub mod time;
pub mod types;
