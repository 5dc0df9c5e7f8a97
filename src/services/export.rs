//! Export packaging: trait metadata, renderer and archiver contracts.
//!
//! Image compositing is not done here. A [`Renderer`] turns a combination
//! into image bytes, an [`Archiver`] collects the files of a batch.
//! [`ZipArchiver`] is the bundled archiver.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::models::{Combination, Layer, TraitCatalog};
use crate::services::generator::CancelToken;

/// One `{trait_type, value}` entry of NFT metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitAttribute {
    /// Layer name
    pub trait_type: String,
    /// Item name
    pub value: String,
}

/// Metadata document written next to each exported image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftMetadata {
    /// `"<collection> #<n>"`
    pub name: String,
    /// Traits in stacking order
    pub attributes: Vec<TraitAttribute>,
}

impl NftMetadata {
    /// Builds the metadata of the `number`-th item of a collection.
    #[must_use]
    pub fn new(
        collection_name: &str,
        number: usize,
        catalog: &TraitCatalog,
        combination: &Combination,
    ) -> Self {
        Self {
            name: format!("{collection_name} #{number}"),
            attributes: trait_metadata(catalog, combination),
        }
    }
}

/// Lists the traits of a combination ordered by z-index.
///
/// Layers without a selection and ids unknown to the catalog are skipped.
#[must_use]
pub fn trait_metadata(catalog: &TraitCatalog, combination: &Combination) -> Vec<TraitAttribute> {
    stacked_layers(catalog, combination)
        .into_iter()
        .filter_map(|layer| {
            let item = layer.item(combination.get(layer.id)?)?;
            Some(TraitAttribute {
                trait_type: layer.name.clone(),
                value: item.name.clone(),
            })
        })
        .collect()
}

/// Layers of the combination, bottom first.
#[must_use]
pub fn stacked_layers<'c>(catalog: &'c TraitCatalog, combination: &Combination) -> Vec<&'c Layer> {
    catalog
        .layers_by_z()
        .into_iter()
        .filter(|layer| combination.contains_layer(layer.id))
        .collect()
}

/// Produces the raster image of a combination.
pub trait Renderer {
    /// Renders `combination` with `layers` stacked bottom first into a
    /// `size`x`size` image.
    fn render(&self, layers: &[&Layer], combination: &Combination, size: u32) -> Result<Vec<u8>>;

    /// File extension of rendered images.
    fn extension(&self) -> &str {
        "png"
    }
}

/// Collects the files of an exported batch.
pub trait Archiver {
    /// Adds a file under a relative name.
    fn add_file(&mut self, name: &str, content: &[u8]) -> Result<()>;

    /// Flushes the archive; no files may be added afterwards.
    fn finish(&mut self) -> Result<()>;
}

/// Rejects names that could escape the archive root.
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains("..") || name.starts_with('/') || name.starts_with('\\')
    {
        anyhow::bail!("Invalid filename in archive: {name}");
    }
    Ok(())
}

/// Zip archive written to disk with deflate compression.
pub struct ZipArchiver {
    path: PathBuf,
    zip: Option<ZipWriter<File>>,
    options: SimpleFileOptions,
    /// Entries already present when an existing archive was reopened
    existing: BTreeSet<String>,
}

impl ZipArchiver {
    /// Creates (or truncates) the zip file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        create_parent_dir(path)?;
        let file = File::create(path)
            .context(format!("Failed to create zip file: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            zip: Some(ZipWriter::new(file)),
            options: entry_options(),
            existing: BTreeSet::new(),
        })
    }

    /// Reopens the zip file at `path` to add more entries, creating it if missing.
    ///
    /// Entries already in the archive are kept; adding one of them again is a
    /// no-op, so a batch interrupted halfway can be exported again.
    pub fn append(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::create(path);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .context(format!("Failed to open zip file: {}", path.display()))?;
        let existing: BTreeSet<String> = {
            let reader = file
                .try_clone()
                .context(format!("Failed to open zip file: {}", path.display()))?;
            zip::ZipArchive::new(reader)
                .context(format!("Failed to read zip file: {}", path.display()))?
                .file_names()
                .map(str::to_string)
                .collect()
        };
        let zip = ZipWriter::new_append(file)
            .context(format!("Failed to reopen zip file: {}", path.display()))?;
        tracing::debug!(
            "Appending to {} ({} existing entries)",
            path.display(),
            existing.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            zip: Some(zip),
            options: entry_options(),
            existing,
        })
    }

    /// Path of the archive.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

impl Archiver for ZipArchiver {
    fn add_file(&mut self, name: &str, content: &[u8]) -> Result<()> {
        validate_entry_name(name)?;
        let zip = self
            .zip
            .as_mut()
            .context("Zip archive is already finished")?;
        if self.existing.contains(name) {
            tracing::debug!("Keeping existing archive entry {}", name);
            return Ok(());
        }

        zip.start_file(name, self.options)
            .context(format!("Failed to start file {name}"))?;
        zip.write_all(content)
            .context(format!("Failed to write file {name}"))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(zip) = self.zip.take() {
            zip.finish().context(format!(
                "Failed to finalize zip: {}",
                self.path.display()
            ))?;
        }
        Ok(())
    }
}

/// Settings of one exported batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Collection name used in metadata
    pub collection_name: String,
    /// Rendered image edge length in pixels
    pub image_size: u32,
    /// Index of the first combination within the collection (numbering starts at `offset + 1`)
    pub offset: usize,
}

/// Outcome of [`export_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Numbers of the exported items
    pub exported: Vec<usize>,
    /// Numbers of items skipped because rendering failed
    pub skipped: Vec<usize>,
    /// Whether the export stopped on cancellation
    pub cancelled: bool,
}

/// Exports a batch of combinations into `archiver`.
///
/// Item `n` becomes `<n>.json` plus, with a renderer, `<n>.<ext>`. A render
/// failure skips that item only. The archiver is left open so several
/// batches can share one archive.
///
/// # Errors
///
/// Archive and serialization failures abort the export.
pub fn export_batch(
    catalog: &TraitCatalog,
    combinations: &[Combination],
    options: &ExportOptions,
    renderer: Option<&dyn Renderer>,
    archiver: &mut dyn Archiver,
    cancel: &CancelToken,
) -> Result<ExportReport> {
    let mut report = ExportReport::default();

    for (index, combination) in combinations.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!("Export cancelled after {} items", report.exported.len());
            report.cancelled = true;
            return Ok(report);
        }

        let number = options.offset + index + 1;

        if let Some(renderer) = renderer {
            let layers = stacked_layers(catalog, combination);
            match renderer.render(&layers, combination, options.image_size) {
                Ok(image) => {
                    archiver.add_file(&format!("{number}.{}", renderer.extension()), &image)?;
                }
                Err(e) => {
                    tracing::warn!("Skipping item {}: render failed: {:#}", number, e);
                    report.skipped.push(number);
                    continue;
                }
            }
        }

        let metadata = NftMetadata::new(&options.collection_name, number, catalog, combination);
        let json = serde_json::to_string_pretty(&metadata)
            .context(format!("Failed to serialize metadata for item {number}"))?;
        archiver.add_file(&format!("{number}.json"), json.as_bytes())?;
        report.exported.push(number);
    }

    tracing::info!(
        "Exported {} items ({} skipped)",
        report.exported.len(),
        report.skipped.len()
    );
    Ok(report)
}
