//! In-memory package registry catalog that is rebuilt in the background and
//! handed to readers only once a build has fully succeeded.

pub mod builder;
pub mod core;
pub mod daemon;

pub use crate::builder::{CatalogBuilder, FolderScanBuilder};
pub use crate::core::models::{Catalog, CycleOutcome, PackageEntry, ProgressState, Snapshot};
pub use crate::core::settings::{BuildParameters, Settings, ShutdownMode};
pub use crate::core::store::{CacheHolder, CacheStatus};
pub use crate::daemon::{RefreshHandle, RefreshScheduler};
