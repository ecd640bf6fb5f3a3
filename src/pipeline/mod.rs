// src/pipeline/mod.rs

//! Pipeline entry points.
//!
//! - `run_sweep`: crawl due sections, persist headlines, upload media
//! - `Dispatcher`: deliver digests to due readers
//! - `run_reschedule`: recompute every reader's next send time

pub mod crawl;
pub mod dispatch;
pub mod persist;
pub mod schedule;
pub mod sweep;
pub mod upload;

pub use crawl::{CrawlOutcome, crawl_sections, run_crawl};
pub use dispatch::{DispatchReport, Dispatcher, select_headlines, subject_line, topic_label};
pub use persist::{Enrichment, LockStripes, PersistReport, Persister};
pub use schedule::{next_send, parse_timezone, run_reschedule};
pub use sweep::{SweepOptions, SweepReport, run_sweep};
pub use upload::{UploadOptions, UploadReport, run_upload_pool};
