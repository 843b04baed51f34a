//! Jupyter kernel client
//!
//! This module implements the client side of the Jupyter messaging
//! protocol, just enough to execute cells and collect what they publish.

pub mod client;
pub mod fake;
pub mod launcher;
pub mod transport;
pub mod types;
pub mod wire;

pub use client::KernelClient;
pub use fake::{FakeKernel, IopubEvent};
pub use launcher::{ConnectionInfo, KernelSpec};
pub use transport::KernelTransport;
pub use types::{KernelMessage, PROTOCOL_VERSION};
