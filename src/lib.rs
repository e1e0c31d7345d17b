//! # traclink
//!
//! Remote-control client for a discrete-time traffic simulator.
//!
//! ## Components
//!
//! - `traclink-protocol`: value codec, commands, packet framing and response decoding
//! - `traclink-client`: connected session, simulation clock and speed-override scheduling
//!
//! ## Example
//!
//! See `demos/step_demo.rs` for a command-line walkthrough.

pub use traclink_client as client;
pub use traclink_protocol as protocol;
