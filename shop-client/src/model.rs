//! Client state model

pub mod api;
pub mod auth;
pub mod session;
pub mod storage;
pub mod totals;
pub mod users;
