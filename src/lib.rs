//! pressled daemon and client library
//!
//! The daemon owns a [`pressled_core::Driver`] and serves its control
//! surface over a Unix socket; the CLI talks to it through [`client::Client`].

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;

pub use client::{Client, ClientError};
pub use config::Config;
pub use server::ControlServer;
