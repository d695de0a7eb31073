//! Client for the DashScope (Bailian) generation platform.
//!
//! The core is [`AsyncTaskClient`]: submit a [`TaskRequest`], poll its
//! [`TaskHandle`] until it reaches a terminal state, get the [`TaskOutput`].
//! The synchronous endpoints ([`speech`], [`qwen_image`]), pre-signed
//! [`upload`]s and [`media`] persistence share its [`Connection`].

pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod polling;
pub mod preflight;
pub mod qwen_image;
pub mod request;
pub mod speech;
pub mod task;
pub mod upload;

pub use client::{AsyncTaskClient, Connection};
pub use config::Config;
pub use error::{ApiError, Error, Result, TransportError};
pub use polling::{Cadence, TaskBackend, TaskFamily};
pub use request::{Operation, Size, TaskRequest};
pub use task::{Asset, TaskHandle, TaskOutput, TaskResult};
