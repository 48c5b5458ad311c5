//! Tabular listings of chip files, one row per sample.
//!
//! Rows are addressed by position. A [`LabelManifest`] is expected to line up
//! row for row with the [`FeatureManifest`] it accompanies; chip ids are not
//! cross-checked.

use std::{
    collections::BTreeMap,
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

const CHIP_ID: &str = "chip_id";
const LABEL_PATH: &str = "label_path";
const PATH_SUFFIX: &str = "_path";
const RASTER_EXTENSION: &str = "tif";

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub chip_id: String,
    band_paths: BTreeMap<String, PathBuf>,
}

impl FeatureRow {
    pub fn new(chip_id: impl Into<String>) -> Self {
        Self {
            chip_id: chip_id.into(),
            band_paths: BTreeMap::new(),
        }
    }

    pub fn with_band(mut self, band: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.band_paths.insert(band.into(), path.into());
        self
    }

    /// The `<band>_path` cell of this row.
    pub fn band_path(&self, band: &str) -> Option<&Path> {
        self.band_paths.get(band).map(PathBuf::as_path)
    }

    pub fn bands(&self) -> impl Iterator<Item = &str> {
        self.band_paths.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRow {
    pub chip_id: String,
    pub label_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureManifest {
    rows: Vec<FeatureRow>,
}

impl FeatureManifest {
    pub fn from_rows(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        Self::from_reader(fs::File::open(path)?)
    }

    /// Parses a CSV with a `chip_id` column; each `<band>_path` column
    /// supplies the file of that band. Empty cells are left out of the row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ManifestError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();

        let chip_id_idx = headers
            .iter()
            .position(|h| h == CHIP_ID)
            .ok_or_else(|| ManifestError::MissingColumn(CHIP_ID.to_string()))?;
        let band_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| {
                h.strip_suffix(PATH_SUFFIX)
                    .filter(|band| !band.is_empty())
                    .map(|band| (idx, band.to_string()))
            })
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let chip_id = record.get(chip_id_idx).unwrap_or_default();
            let row = band_columns
                .iter()
                .filter_map(|(idx, band)| {
                    record
                        .get(*idx)
                        .filter(|cell| !cell.is_empty())
                        .map(|cell| (band, cell))
                })
                .fold(FeatureRow::new(chip_id), |row, (band, cell)| {
                    row.with_band(band.as_str(), cell)
                });
            rows.push(row);
        }

        Ok(Self { rows })
    }

    /// Builds a manifest from a `<features_dir>/<chip_id>/<band>.tif` layout,
    /// one row per chip directory, ordered by chip id. The band files are not
    /// checked for existence.
    pub fn scan_chip_dirs(
        features_dir: impl AsRef<Path>,
        bands: &[String],
    ) -> Result<Self, ManifestError> {
        let mut chip_dirs: Vec<PathBuf> = fs::read_dir(features_dir)?
            .filter_map(|entry| {
                entry
                    .ok()
                    .filter(|item| item.file_type().is_ok_and(|t| t.is_dir()))
            })
            .map(|entry| entry.path())
            .collect();
        chip_dirs.sort();

        let mut rows = Vec::with_capacity(chip_dirs.len());
        for dir in chip_dirs {
            let chip_id = dir
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| ManifestError::NonUnicodePath(dir.clone()))?
                .to_string();
            let row = bands.iter().fold(FeatureRow::new(chip_id), |row, band| {
                let file = dir.join(format!("{band}.{RASTER_EXTENSION}"));
                row.with_band(band.as_str(), file)
            });
            rows.push(row);
        }

        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FeatureRow> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter()
    }

    pub fn chip_ids(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.chip_id.clone()).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelManifest {
    rows: Vec<LabelRow>,
}

impl LabelManifest {
    pub fn from_rows(rows: Vec<LabelRow>) -> Self {
        Self { rows }
    }

    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        Self::from_reader(fs::File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ManifestError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();
        for column in [CHIP_ID, LABEL_PATH] {
            if !headers.iter().any(|h| h == column) {
                return Err(ManifestError::MissingColumn(column.to_string()));
            }
        }

        let rows = reader
            .deserialize::<LabelRow>()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rows })
    }

    /// One `<labels_dir>/<chip_id>.tif` row per chip, in the order given.
    pub fn for_chips(labels_dir: impl AsRef<Path>, chip_ids: &[String]) -> Self {
        let labels_dir = labels_dir.as_ref();
        let rows = chip_ids
            .iter()
            .map(|chip_id| LabelRow {
                chip_id: chip_id.clone(),
                label_path: labels_dir.join(format!("{chip_id}.{RASTER_EXTENSION}")),
            })
            .collect();

        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LabelRow> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelRow> {
        self.rows.iter()
    }
}
