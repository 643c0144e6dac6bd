pub mod api;
pub mod config;
pub mod monitor;
pub mod socket;
