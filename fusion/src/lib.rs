//! Core of a dense depth-camera tracking and fusion pipeline.
//!
//! Stage outputs move between stages as [`PipelineValue`]s that live on the
//! host or on a compute device and synchronise lazily. Camera poses are
//! tracked with projective point-to-plane ICP, either on the host or on the
//! device with a parallel reduction.

mod common;
mod compute;
mod config;
mod frame;
mod icp;
mod math;
mod measurement;
mod pipeline;
mod source;
mod stage;
mod synthetic;
mod value;

#[cfg(test)]
mod testing;

pub mod prelude;

pub use prelude::*;
