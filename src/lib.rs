//! Gatekeeper - Rate-Limited HTTP Front Door
//!
//! This crate implements a small HTTP API surface: schema-validated sign-in and
//! sign-up routes, an authentication gate in front of every other route, a
//! catch-all 404, and a per-client fixed-window rate limiter applied to all of it.

pub mod api;
pub mod config;
pub mod error;
pub mod ratelimit;
