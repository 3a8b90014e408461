pub mod app;
pub mod broker;
pub mod core;
pub mod lane;
pub mod pipeline;
pub mod store;
