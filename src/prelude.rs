//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use m2_janitor::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{M2jError, Result};

// Scanner
pub use crate::scanner::codec::ArtifactCoordinate;
pub use crate::scanner::protection::{ProtectionPolicy, ProtectionReason};
pub use crate::scanner::purge::{PurgeExecutor, PurgeOptions, PurgeReport};
pub use crate::scanner::walker::{CacheScan, CacheScanner, InstalledArtifact, ScanConfig};

// Collector
pub use crate::collector::{ListingSource, Provenance, UsageCollector, UsageRecord, UsageSet};

// Audit
pub use crate::audit::report::ReportStore;
pub use crate::audit::run_state::{RunThrottle, ThrottleDecision};
pub use crate::audit::{AuditSummary, ReconcileOutcome, reconcile};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
