//! Core types and utilities for nodeflow.

pub mod config;
pub mod media;
pub mod store;
pub mod types;
