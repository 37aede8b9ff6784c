//! Client library for NetSDR receivers.
//!
//! - [`messages`]: the wire format.
//! - [`network`]: control (TCP) and data (UDP) channels.
//! - [`session`]: request/response handling and the IQ streaming lifecycle.
//! - [`sinks`]: destinations for decoded samples.

pub mod config;
pub mod errors;
pub mod messages;
pub mod network;
pub mod session;
pub mod sinks;

#[cfg(test)]
mod test_utils;
