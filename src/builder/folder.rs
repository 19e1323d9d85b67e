use crate::builder::CatalogBuilder;
use crate::core::models::{Catalog, PackageEntry, PackageVersion, Snapshot};
use crate::core::settings::BuildParameters;
use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;

const PACKAGE_EXTENSION: &str = ".nupkg";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("package folder does not exist: {}", .0.display())]
    MissingFolder(PathBuf),

    #[error("failed to read package folder {}", .path.display())]
    ReadFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a package file: {0}")]
    NotAPackage(String),

    #[error("no version found in package file name: {0}")]
    MissingVersion(String),
}

/// Builds the catalog from the `*.nupkg` files of a local package folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct FolderScanBuilder;

impl FolderScanBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CatalogBuilder for FolderScanBuilder {
    fn name(&self) -> &'static str {
        "folder-scan"
    }

    async fn build(
        &self,
        parameters: &BuildParameters,
        on_progress: &(dyn Fn(u32, u32) + Send + Sync),
    ) -> Result<Snapshot> {
        let files = list_package_files(&parameters.package_folder).await?;
        let total = u32::try_from(files.len()).unwrap_or(u32::MAX);

        tracing::debug!(
            folder = %parameters.package_folder.display(),
            total,
            "Scanning package folder"
        );
        on_progress(0, total);

        let mut catalog = Catalog::new();
        let mut has_errors = false;

        for (index, path) in files.iter().enumerate() {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match parse_package_file_name(&file_name) {
                Ok((id, version)) => add_version(&mut catalog, parameters, &id, &version, &file_name),
                Err(e) => {
                    tracing::warn!(file = %file_name, error = %e, "Skipping unreadable package");
                    has_errors = true;
                }
            }

            on_progress(u32::try_from(index + 1).unwrap_or(total), total);
            tokio::task::yield_now().await;
        }

        if has_errors {
            tracing::warn!(
                packages = catalog.len(),
                "Package folder scan finished with errors"
            );
        }

        Ok(Snapshot::new(catalog, has_errors))
    }
}

async fn list_package_files(folder: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let read_error = |source: std::io::Error| BuildError::ReadFolder {
        path: folder.to_path_buf(),
        source,
    };

    if !tokio::fs::try_exists(folder).await.map_err(read_error)? {
        return Err(BuildError::MissingFolder(folder.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(folder).await.map_err(read_error)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();
        let is_package = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| strip_extension(n).is_some());

        if is_package && entry.file_type().await.map_err(read_error)?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn strip_extension(file_name: &str) -> Option<&str> {
    let split = file_name.len().checked_sub(PACKAGE_EXTENSION.len())?;
    if !file_name.is_char_boundary(split) {
        return None;
    }
    let (stem, extension) = file_name.split_at(split);
    extension
        .eq_ignore_ascii_case(PACKAGE_EXTENSION)
        .then_some(stem)
}

/// Splits `<Id>.<Version>.nupkg` into id and version. The version starts at
/// the first dot-separated segment (after the first) that begins with a digit.
pub fn parse_package_file_name(file_name: &str) -> Result<(String, String), BuildError> {
    let stem = strip_extension(file_name)
        .filter(|stem| !stem.is_empty() && !stem.starts_with('.'))
        .ok_or_else(|| BuildError::NotAPackage(file_name.to_string()))?;

    let parts: Vec<&str> = stem.split('.').collect();
    let version_start = parts
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, part)| part.starts_with(|c: char| c.is_ascii_digit()))
        .map(|(i, _)| i)
        .ok_or_else(|| BuildError::MissingVersion(file_name.to_string()))?;

    Ok((
        parts[..version_start].join("."),
        parts[version_start..].join("."),
    ))
}

/// `package_name_postfix` is display-only and never part of the registry name.
pub fn registry_name(scope: &str, id: &str) -> String {
    format!("{}.{}", scope, id.to_ascii_lowercase())
}

fn add_version(
    catalog: &mut Catalog,
    parameters: &BuildParameters,
    id: &str,
    version: &str,
    file_name: &str,
) {
    let name = registry_name(&parameters.scope, id);
    let package_version = PackageVersion {
        version: version.to_string(),
        file_name: file_name.to_string(),
        tarball: format!("{}/{name}/-/{name}-{version}.tgz", parameters.server_uri),
    };

    match catalog.get_mut(&name) {
        Some(entry) => {
            if entry.has_version(version) {
                tracing::debug!(package = %name, version, "Duplicate package version, keeping first");
                return;
            }
            entry.versions.push(package_version);
            entry
                .versions
                .sort_by(|a, b| compare_versions(&a.version, &b.version));
        }
        None => catalog.insert(PackageEntry {
            name,
            display_name: format!("{id}{}", parameters.display_postfix),
            source_id: id.to_string(),
            versions: vec![package_version],
            unity: parameters.minimum_unity_version.clone(),
            frameworks: parameters.target_frameworks.clone(),
        }),
    }
}

fn split_prerelease(version: &str) -> (&str, Option<&str>) {
    let version = version.split('+').next().unwrap_or(version);
    match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Numeric per-segment ordering; a prerelease sorts before its release.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_core, a_pre) = split_prerelease(a);
    let (b_core, b_pre) = split_prerelease(b);

    let mut a_parts = a_core.split('.');
    let mut b_parts = b_core.split('.');
    loop {
        match (a_parts.next(), b_parts.next()) {
            (None, None) => break,
            (a_part, b_part) => {
                let ord = compare_segment(a_part.unwrap_or("0"), b_part.unwrap_or("0"));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }

    match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    }
}
