//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod events;
pub mod health;
pub mod orders;
pub mod tickets;

pub use health::health_check;
