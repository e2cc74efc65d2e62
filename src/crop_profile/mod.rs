//! Crop profile resolution
//!
//! Maps a crop name (and optional soil type) onto optimal moisture and NPK
//! bands. Lookup order:
//!
//! 1. Dataset entry for `(crop, soil)`
//! 2. Dataset entry for `(crop, overall)`
//! 3. Built-in table entry for the crop
//! 4. Built-in `default` entry
//!
//! The dataset is read on first use and cached for the life of the process.
//! [`CropProfileResolver::reload`] re-reads it and swaps the cached copy.

mod builtin;
mod dataset;

pub use builtin::DEFAULT_CROP;
pub use dataset::{CropDataset, DatasetError, OVERALL};

use arc_swap::ArcSwapOption;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::types::CropProfile;

/// Lowercase, collapse non-alphanumeric runs to `_`, trim underscores.
///
/// `"Sandy Loam"` and `" sandy--loam "` both become `"sandy_loam"`.
pub fn canonicalize(raw: &str) -> String {
    static NON_ALNUM: OnceLock<Option<Regex>> = OnceLock::new();
    let lowered = raw.to_lowercase();
    let collapsed = match NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").ok()) {
        Some(re) => re.replace_all(&lowered, "_").into_owned(),
        None => lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_"),
    };
    collapsed.trim_matches('_').to_string()
}

/// Where a resolved profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    DatasetSoil,
    DatasetOverall,
    BuiltIn,
    Default,
}

impl std::fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileSource::DatasetSoil => write!(f, "dataset (soil)"),
            ProfileSource::DatasetOverall => write!(f, "dataset (overall)"),
            ProfileSource::BuiltIn => write!(f, "built-in"),
            ProfileSource::Default => write!(f, "default"),
        }
    }
}

/// Resolves crop profiles against the dataset and the built-in table
pub struct CropProfileResolver {
    dataset_path: Option<PathBuf>,
    dataset: ArcSwapOption<CropDataset>,
}

impl CropProfileResolver {
    /// Resolver backed by a dataset file, read lazily on first resolve.
    pub fn new(dataset_path: Option<PathBuf>) -> Self {
        Self {
            dataset_path,
            dataset: ArcSwapOption::empty(),
        }
    }

    /// Resolver using only the built-in table.
    pub fn builtin_only() -> Self {
        Self::new(None)
    }

    /// Resolver over an already-parsed dataset.
    pub fn with_dataset(dataset: CropDataset) -> Self {
        Self {
            dataset_path: None,
            dataset: ArcSwapOption::from_pointee(dataset),
        }
    }

    /// Re-read the dataset file and replace the cached copy.
    ///
    /// On failure the cached copy is kept and the error returned.
    pub fn reload(&self) -> Result<usize, DatasetError> {
        let Some(path) = &self.dataset_path else {
            return Ok(self.dataset().crop_count());
        };
        let fresh = CropDataset::load(path)?;
        let crops = fresh.crop_count();
        self.dataset.store(Some(Arc::new(fresh)));
        info!(path = %path.display(), crops, "Crop dataset reloaded");
        Ok(crops)
    }

    fn dataset(&self) -> Arc<CropDataset> {
        if let Some(ds) = self.dataset.load_full() {
            return ds;
        }
        let loaded = Arc::new(self.load_initial());
        self.dataset.store(Some(Arc::clone(&loaded)));
        loaded
    }

    fn load_initial(&self) -> CropDataset {
        let Some(path) = &self.dataset_path else {
            return CropDataset::empty();
        };
        load_or_empty(path)
    }

    /// Resolve a profile for `crop` on `soil`.
    pub fn resolve(&self, crop: Option<&str>, soil: Option<&str>) -> CropProfile {
        self.resolve_with_source(crop, soil).0
    }

    /// Resolve a profile and report which lookup step produced it.
    pub fn resolve_with_source(
        &self,
        crop: Option<&str>,
        soil: Option<&str>,
    ) -> (CropProfile, ProfileSource) {
        let crop_key = crop.map(canonicalize).filter(|c| !c.is_empty());
        let soil_key = soil.map(canonicalize).filter(|s| !s.is_empty());

        let Some(crop_key) = crop_key else {
            return (builtin::default_profile(), ProfileSource::Default);
        };

        let dataset = self.dataset();
        let lookup_key = builtin::unalias(&crop_key);
        for key in [crop_key.as_str(), lookup_key] {
            if let Some(profile) = soil_key.as_deref().and_then(|s| dataset.get_exact(key, s)) {
                return (profile.clone(), ProfileSource::DatasetSoil);
            }
            if let Some(profile) = dataset.get_exact(key, OVERALL) {
                return (profile.clone(), ProfileSource::DatasetOverall);
            }
        }

        if let Some(profile) = builtin::lookup(&crop_key) {
            return (profile, ProfileSource::BuiltIn);
        }

        debug!(crop = %crop_key, "Unknown crop, using default profile");
        (builtin::default_profile(), ProfileSource::Default)
    }
}

fn load_or_empty(path: &Path) -> CropDataset {
    match CropDataset::load(path) {
        Ok(ds) => {
            info!(
                path = %path.display(),
                crops = ds.crop_count(),
                repaired_bands = ds.repaired_bands(),
                "Crop dataset loaded"
            );
            ds
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Crop dataset unavailable, using built-in table");
            CropDataset::empty()
        }
    }
}
