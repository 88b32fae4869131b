pub mod catalog;
pub mod config;
pub mod error;
pub mod machine;
pub mod platform;
pub mod protocol;
pub mod quality;
pub mod state;
