//! Stylebooth
//!
//! A photo booth styling pipeline: a batch of captured photos goes to a
//! Gemini image model one photo at a time, every styled result is fitted to a
//! fixed print frame and published to R2, and the caller gets the public URLs
//! back. The crate carries both halves: the server worker behind
//! `/api/v1/style` and the client orchestrator the booth binary drives it
//! with.

pub mod app_state;
pub mod client;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod timing;
