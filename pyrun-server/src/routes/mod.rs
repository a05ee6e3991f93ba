//! HTTP route handlers

pub mod execute;
pub mod health;
