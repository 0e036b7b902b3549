//! HTTP handlers, one module per surface area.

pub mod chat;
pub mod fsops;
pub mod git;
pub mod projects;
pub mod providers;
pub mod sessions;
pub mod terminal;
pub mod tools;
