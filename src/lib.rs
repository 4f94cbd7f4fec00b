//! # Dumpwatch Library
//!
//! Core of the dumpwatch service: the event/alert/location store, the
//! notification bus, the live stream broadcaster, device ingestion and the
//! HTTP surface built on top of them.

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod server;
pub mod store;
pub mod stream;
pub mod telemetry;
