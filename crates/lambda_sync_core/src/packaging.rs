//! Package Builder: archives a function's source directory into a zip
//! artifact that the deploy and update calls upload.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::{source_dir, SyncConfig};
use crate::contract::{FunctionName, PackageArtifact};
use crate::error::DeployError;

pub const MAX_COMPRESSION_LEVEL: i32 = 9;

#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Returns only once the artifact is fully written and closed.
    async fn build(&self, function: &FunctionName) -> Result<PackageArtifact, DeployError>;
}

#[derive(Debug, Clone)]
pub struct ZipPackager {
    workspace: PathBuf,
    source_root: String,
}

impl ZipPackager {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            workspace: config.workspace.clone(),
            source_root: config.source_root.clone(),
        }
    }
}

#[async_trait]
impl ArtifactBuilder for ZipPackager {
    async fn build(&self, function: &FunctionName) -> Result<PackageArtifact, DeployError> {
        let source_path = source_dir(&self.workspace, &self.source_root, function);
        let artifact_path = artifact_path(&source_path, function);
        debug!(
            event = "packaging_started",
            function = %function,
            source = %source_path.display(),
        );

        let source = source_path.clone();
        let destination = artifact_path.clone();
        let sha256 = tokio::task::spawn_blocking(move || package_directory(&source, &destination))
            .await
            .map_err(|error| format!("packaging task did not complete: {error}"))
            .and_then(|result| result)
            .map_err(|message| DeployError::Packaging {
                function: function.to_string(),
                source_path: source_path.clone(),
                message,
            })?;

        info!(
            event = "package_built",
            function = %function,
            artifact = %artifact_path.display(),
            sha256 = %sha256,
        );
        Ok(PackageArtifact {
            source_path,
            artifact_path,
            sha256,
        })
    }
}

pub fn artifact_path(source: &Path, function: &FunctionName) -> PathBuf {
    source.join(format!("{function}.zip"))
}

/// Archives the contents of `source` into `destination` with entries rooted
/// at `source` itself. Returns the hex sha256 of the finished artifact.
///
/// `destination` may live inside `source`; it is never archived into itself.
/// Symbolic links are not followed and not archived. Paths that are not
/// valid UTF-8 fail the build. A partially written artifact is removed on
/// failure.
pub fn package_directory(source: &Path, destination: &Path) -> Result<String, String> {
    if !source.is_dir() {
        return Err(format!(
            "source directory '{}' does not exist",
            source.display()
        ));
    }

    let mut entries = Vec::new();
    collect_entries(source, source, destination, &mut entries)?;

    if let Err(error) = write_archive(destination, &entries) {
        let _ = fs::remove_file(destination);
        return Err(error);
    }

    let bytes = fs::read(destination)
        .map_err(|error| format!("Failed to read finished artifact: {error}"))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

struct ArchiveEntry {
    path: PathBuf,
    name: String,
    is_dir: bool,
    mode: u32,
}

fn collect_entries(
    root: &Path,
    dir: &Path,
    destination: &Path,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<(), String> {
    let listing = fs::read_dir(dir)
        .map_err(|error| format!("Failed to read directory '{}': {error}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in listing {
        let entry = entry
            .map_err(|error| format!("Failed to read entry in '{}': {error}", dir.display()))?;
        paths.push(entry.path());
    }
    paths.sort();

    for path in paths {
        if path == destination {
            continue;
        }
        let metadata = fs::symlink_metadata(&path)
            .map_err(|error| format!("Failed to stat '{}': {error}", path.display()))?;
        if metadata.file_type().is_symlink() {
            debug!(event = "symlink_skipped", path = %path.display());
            continue;
        }
        let name = entry_name(root, &path)?;
        let is_dir = metadata.is_dir();
        entries.push(ArchiveEntry {
            path: path.clone(),
            name,
            is_dir,
            mode: permission_bits(&metadata),
        });
        if is_dir {
            collect_entries(root, &path, destination, entries)?;
        }
    }

    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> Result<String, String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|error| format!("'{}' is outside the source root: {error}", path.display()))?;
    let parts = relative
        .components()
        .map(|component| {
            component.as_os_str().to_str().ok_or_else(|| {
                format!("'{}' is not a valid UTF-8 entry name", path.display())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.is_dir() {
        0o755
    } else {
        0o644
    }
}

fn write_archive(destination: &Path, entries: &[ArchiveEntry]) -> Result<(), String> {
    let file = fs::File::create(destination).map_err(|error| {
        format!(
            "Failed to create artifact '{}': {error}",
            destination.display()
        )
    })?;
    let mut zip = ZipWriter::new(file);
    let base_options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(MAX_COMPRESSION_LEVEL));

    for entry in entries {
        let options = base_options.unix_permissions(entry.mode);
        if entry.is_dir {
            zip.add_directory(entry.name.as_str(), options)
                .map_err(|error| format!("Failed to add directory '{}': {error}", entry.name))?;
            continue;
        }

        zip.start_file(entry.name.as_str(), options)
            .map_err(|error| format!("Failed to start entry '{}': {error}", entry.name))?;
        let mut input = fs::File::open(&entry.path)
            .map_err(|error| format!("Failed to open '{}': {error}", entry.path.display()))?;
        io::copy(&mut input, &mut zip)
            .map_err(|error| format!("Failed to write entry '{}': {error}", entry.name))?;
    }

    let file = zip
        .finish()
        .map_err(|error| format!("Failed to finish artifact: {error}"))?;
    file.sync_all()
        .map_err(|error| format!("Failed to flush artifact: {error}"))
}
