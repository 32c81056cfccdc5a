//! pulsemesh-probe: node-side telemetry agent.
//!
//! Collects host health samples on an interval, buffers them with a
//! hard cap, and pushes batches to the pulsemesh control plane over
//! HTTP. Failed batches stay at the front of the buffer for retry.

pub mod buffer;
pub mod config;
pub mod models;
pub mod pusher;
pub mod sampler;
