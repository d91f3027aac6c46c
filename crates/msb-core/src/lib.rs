//! Core pipeline for the instance-control Telegram bot.
//!
//! Telegram and Compute Engine live behind ports (traits) implemented in
//! adapter crates; this crate only decides whether a webhook call is allowed to
//! touch the instance and what to reply.

pub mod actions;
pub mod authorizer;
pub mod commands;
pub mod config;
pub mod controller;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod ports;
pub mod testing;
pub mod waiter;

pub use errors::{Error, Result};
