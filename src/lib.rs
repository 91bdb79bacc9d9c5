#![forbid(unsafe_code)]

//! m2_janitor (m2j) — audits a local Maven artifact cache against observed
//! project usage and safely prunes what nothing declares.
//!
//! The pipeline:
//! 1. **Usage collection** — per-module dependency listings from the build
//!    tool (with tree and static-descriptor fallbacks) build the use-set.
//! 2. **Cache scan** — the artifact cache is walked into the installed set.
//! 3. **Reconciliation** — installed − used, filtered through the
//!    protection policy, yields used/unused/protected partitions.
//! 4. **Purge** — unused candidates are deleted in guarded, retried passes.
//! 5. **Reports & throttle** — timestamped CSV reports persist across runs;
//!    a last-run marker gates how often a deleting run may happen.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use m2_janitor::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use m2_janitor::core::config::Config;
//! use m2_janitor::scanner::walker::{CacheScanner, ScanConfig};
//! ```

pub mod prelude;

pub mod audit;
pub mod collector;
pub mod core;
pub mod logger;
pub mod scanner;
