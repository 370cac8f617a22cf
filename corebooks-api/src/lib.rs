//! # Corebooks API Server Library
//!
//! HTTP surface of the Corebooks identity core: registration, login, token
//! refresh, sessions, password reset and tenant user administration under
//! `/v1`, backed by `corebooks-identity`.
//!
//! ## Modules
//!
//! - `app`: Application state, router builder and bearer authentication
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Client metadata, auth throttle and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
