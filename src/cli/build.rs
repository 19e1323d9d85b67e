use anyhow::Result;
use chrono::{DateTime, Utc};
use registry_cache::builder::{CatalogBuilder, FolderScanBuilder};
use registry_cache::core::models::{PackageEntry, Snapshot};
use registry_cache::core::settings::Settings;
use serde::Serialize;

#[derive(Serialize)]
struct BuildOutput {
    packages: Vec<PackageSummary>,
    versions: usize,
    has_errors: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    built_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct PackageSummary {
    name: String,
    display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<String>,
    versions: usize,
}

/// Runs one build against the configured package folder and prints the catalog.
pub async fn run(settings: &Settings, json: bool) -> Result<()> {
    let parameters = settings.build_parameters();
    tracing::info!(folder = %parameters.package_folder.display(), "Building registry catalog");

    let on_progress = |current: u32, total: u32| {
        tracing::debug!(current, total, "Build progress");
    };
    let snapshot = FolderScanBuilder::new()
        .build(&parameters, &on_progress)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&build_output(&snapshot))?);
    } else {
        print_text_output(&snapshot);
    }

    if snapshot.has_errors {
        anyhow::bail!("Catalog built with errors; it would not be published");
    }

    Ok(())
}

fn build_output(snapshot: &Snapshot) -> BuildOutput {
    BuildOutput {
        packages: snapshot.catalog.packages().map(package_summary).collect(),
        versions: snapshot.catalog.version_count(),
        has_errors: snapshot.has_errors,
        built_at: snapshot.built_at,
    }
}

fn package_summary(entry: &PackageEntry) -> PackageSummary {
    PackageSummary {
        name: entry.name.clone(),
        display_name: entry.display_name.clone(),
        latest: entry.latest_version().map(str::to_string),
        versions: entry.versions.len(),
    }
}

fn print_text_output(snapshot: &Snapshot) {
    println!(
        "{} packages, {} versions",
        snapshot.catalog.len(),
        snapshot.catalog.version_count()
    );

    for entry in snapshot.catalog.packages() {
        println!(
            "  {:<48} {:>12}  ({} versions)",
            entry.name,
            entry.latest_version().unwrap_or("-"),
            entry.versions.len()
        );
    }

    if snapshot.has_errors {
        println!();
        println!("Errors were reported during the build; see the log output above.");
    }
}
