mod folder;

use crate::core::models::Snapshot;
use crate::core::settings::BuildParameters;
use anyhow::Result;
use async_trait::async_trait;

pub use folder::{parse_package_file_name, BuildError, FolderScanBuilder};

/// Constructs a candidate catalog snapshot.
///
/// `on_progress(current, total)` is called from within `build`, on the same
/// task, zero or more times. A returned snapshot with `has_errors` set and an
/// `Err` are both treated as a failed build.
#[async_trait]
pub trait CatalogBuilder: Send + Sync {
    fn name(&self) -> &'static str;

    async fn build(
        &self,
        parameters: &BuildParameters,
        on_progress: &(dyn Fn(u32, u32) + Send + Sync),
    ) -> Result<Snapshot>;
}
