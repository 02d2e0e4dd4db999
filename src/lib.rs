pub mod ai;
pub mod api;
pub mod bus;
pub mod chat;
pub mod client;
pub mod config;
pub mod entity;
pub mod store;
