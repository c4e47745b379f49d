//! Core functionality for enriching a photo collection with metadata.
//!
//! This library provides the building blocks of the pipeline:
//! - Directory scanning and registration of image files
//! - EXIF decoding into normalized camera and GPS fields
//! - Content analysis through a vision language model
//! - Tag derivation and persistence for search

// -- External Dependencies --
use log::{info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use batch::{BatchExecutor, BatchSummary, ErrorDetail};
pub use config::*;
pub use discovery::ScanSummary;
pub use error::{Error, Result};
pub use types::*;

// -- Public Modules --
pub mod batch;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod metadata;
pub mod persistence;
pub mod tags;
pub mod types;
pub mod vision;

use persistence::Store;
use vision::{OllamaClient, VisionAnalyzer, VisionService};

/// Which images an analysis run covers
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzeSelection {
    /// These image ids; unknown ids are skipped
    Ids(Vec<i64>),
    /// Every image without an analysis
    Missing,
    /// Every image, replacing earlier analyses
    All,
}

/// Results of each stage of `ImageEnricher::process_all`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessAllSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanSummary>,
    pub exif: BatchSummary,
    pub analysis: BatchSummary,
}

/// Main entry point for the enrichment pipeline
pub struct ImageEnricher {
    config: Config,
    store: Store,
    analyzer: VisionAnalyzer,
    executor: BatchExecutor,
    cancel: Arc<AtomicBool>,
}

impl ImageEnricher {
    /// Open the configured database and connect to the configured Ollama server
    pub fn new(config: Config) -> Result<Self> {
        let client = OllamaClient::new(&config)?;
        Self::with_service(config, Box::new(client))
    }

    /// Use a custom vision service instead of Ollama
    pub fn with_service(config: Config, service: Box<dyn VisionService>) -> Result<Self> {
        let store = Store::open(&config.database_path)?;
        Self::with_store(config, store, service)
    }

    /// Build from an already opened store
    pub fn with_store(config: Config, store: Store, service: Box<dyn VisionService>) -> Result<Self> {
        config.validate()?;
        let cancel = Arc::new(AtomicBool::new(false));

        Ok(Self {
            analyzer: VisionAnalyzer::new(service, &config),
            executor: BatchExecutor::new(&config, cancel.clone()),
            config,
            store,
            cancel,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Flag that stops running batches before their next item when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Register new images found under `folder`
    pub fn scan(&self, folder: &Path, recursive: bool) -> Result<ScanSummary> {
        discovery::scan_directory(folder, recursive, &self.store, &self.executor)
    }

    /// Decode EXIF for every image that has no EXIF record yet.
    ///
    /// An image without an EXIF block counts as a success and is left without
    /// a record; it will be looked at again on the next run.
    pub fn extract_missing_exif(&self) -> Result<BatchSummary> {
        let pending = self.store.find_assets_missing(MissingKind::Exif)?;

        let output = self.executor.run("extract-exif", &pending, |asset| {
            match metadata::decode_file(&asset.path) {
                Some(record) => {
                    self.store.insert_exif(asset.id, &record)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        });

        let with_exif = output.outputs.iter().filter(|stored| **stored).count();
        info!(
            "EXIF stored for {} of {} images",
            with_exif, output.summary.success
        );
        Ok(output.summary)
    }

    /// Run vision analysis on the selected images and rebuild their tags
    pub fn analyze(&self, selection: AnalyzeSelection) -> Result<BatchSummary> {
        let targets = match selection {
            AnalyzeSelection::Ids(ids) => self.store.assets_by_ids(&ids)?,
            AnalyzeSelection::Missing => self.store.find_assets_missing(MissingKind::Analysis)?,
            AnalyzeSelection::All => self.store.all_assets()?,
        };

        let output = self.executor.run("analyze", &targets, |asset| {
            // The model call holds no lock; only the write below is transactional
            let record = self.analyzer.analyze(&asset.path)?;
            let tags = tags::derive_tags(asset.id, &record.result);
            self.store.replace_analysis(asset.id, &record, &tags)?;
            Ok(())
        });

        Ok(output.summary)
    }

    /// Scan (when a folder is given), then extract missing EXIF, then analyze
    /// images that have no analysis yet.
    pub fn process_all(&self, folder: Option<&Path>) -> Result<ProcessAllSummary> {
        let scan = match folder {
            Some(folder) if folder.is_dir() => Some(self.scan(folder, true)?),
            Some(folder) => {
                warn!("Skipping scan, {} is not a directory", folder.display());
                None
            }
            None => None,
        };

        let exif = self.extract_missing_exif()?;
        let analysis = self.analyze(AnalyzeSelection::Missing)?;

        Ok(ProcessAllSummary {
            scan,
            exif,
            analysis,
        })
    }
}
