//! HTTP API: configuration, services, routing and request guards.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
