//! # API Shared
//!
//! Shared utilities and definitions for the examflow HTTP surface.
//!
//! Contains:
//! - Wire DTOs with OpenAPI schemas (`dto` module)
//! - Shared services like `HealthService`
//! - Caller identity extraction from gateway headers (`auth` module)

pub mod auth;
pub mod dto;
pub mod health;

pub use health::HealthService;
