//! Application module

pub mod args;
pub mod config;
pub mod sender;
pub mod startup;
pub mod status;
