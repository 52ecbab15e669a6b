//! Marigold storefront library.
//!
//! The order lifecycle HTTP service as a library: storage traits and their
//! `PostgreSQL` implementations, the payment authority client, the services
//! that drive carts and orders, and the axum routes on top. The binary in
//! `main.rs` wires these to real infrastructure; tests wire them to
//! in-memory stand-ins.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
