//! Course-driven student quota service library.
//!
//! This crate primarily ships a `quota-api` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod db;
pub mod openstack;
pub mod state;
pub mod trigger;
