// src/services/mod.rs

//! Service layer for the press review pipeline.
//!
//! This module contains the I/O-facing building blocks:
//! - Section harvesting (`SectionHarvester`)
//! - Link metadata resolution (`LinkResolver`)
//! - Image variant derivation (`MediaProcessor`)
//! - Templated email delivery (`Mailer`)
//! - Reader token signing

mod harvester;
mod links;
mod mailer;
mod media;
mod token;

pub use harvester::{SectionHarvester, extract_feed, extract_html};
pub use links::{HtmlLinkResolver, LinkResolver, ResolvedLinks, parse_link_metadata};
pub use mailer::{Envelope, HttpMailer, Mailer, OutboxMailer, create_mailer};
pub use media::{
    Fit, MediaAsset, MediaProcessor, VARIANTS, Variant, derive_variant, unique_file_name,
};
pub use token::{TokenClaims, TokenPurpose, sign_token, verify_token};
