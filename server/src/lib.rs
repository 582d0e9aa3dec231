//! Folio Server
//!
//! Contact form backend for a portfolio site. Visitor messages are relayed
//! over SMTP, guarded by sliding-window rate limits per sender email and per
//! client IP.

pub mod admin;
pub mod api;
pub mod config;
pub mod contact;
pub mod email;
pub mod ratelimit;
