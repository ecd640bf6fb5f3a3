// src/models/mod.rs

//! Domain models for the press review pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod channel;
mod config;
mod digest;
mod headline;
mod reader;

// Re-export all public types
pub use channel::{Channel, Section, SectionFormat};
pub use config::{
    Config, CrawlerConfig, DigestConfig, MailBackend, MailConfig, MediaConfig, ObjectBackend,
    StoreConfig,
};
pub use digest::{DigestHeadline, DigestPayload};
pub use headline::{HarvestedItem, Headline};
pub use reader::{Availability, Reader};
