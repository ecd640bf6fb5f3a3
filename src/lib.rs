// src/lib.rs

//! Press Review pipeline library.
//!
//! Crawls channel sections into a deduplicated headline store, pushes
//! derived images to object storage and delivers per-reader digests.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
