//! Compiles container stack definitions into Podman Quadlet units and keeps
//! the systemd user instance in step with them.

pub mod backends;
pub mod changes;
pub mod config;
pub mod controller;
pub mod error;
pub mod frontends;
pub mod generate;
pub mod graph;
pub mod hasher;
pub mod models;
pub mod progress;
pub mod quadlet;
pub mod rules;
pub mod services;

pub use error::{Error, Result};
