//! hearth control plane library.
//!
//! This crate primarily ships a `control-plane` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod db;
pub mod gameservers;
pub mod games;
pub mod rpc;
pub mod scheduler;
pub mod state;
