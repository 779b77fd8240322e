//! RENDERZ render service
//!
//! Accepts reference images and prompts, runs photorealistic generation and
//! optional upscaling through external AI vendors as background jobs, and
//! exposes each job's status for client-side polling.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

pub use routes::router;
