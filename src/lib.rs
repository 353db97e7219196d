//! CPF lookup and SMS verification gateway.
//!
//! Proxies a CPF lookup provider and the Twilio Verify OTP service behind
//! one normalized JSON API.
//!
//! # Modules
//!
//! - `api`: Router assembly.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `input`: Query/body parameter normalization.
//! - `models`: Upstream responses and normalized results.
//! - `obs`: Tracing setup and log redaction.
//! - `services`: Provider clients.

pub mod api;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod input;
pub mod models;
pub mod obs;
pub mod services;
