use std::path::PathBuf;

use thiserror::Error;

/// Failures while fetching a sample from a [`crate::ChipDataset`].
#[derive(Debug, Error)]
pub enum ChipError {
    #[error("index {index} is out of range for a manifest of {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("row {index} has no path for band `{band}`")]
    MissingBandPath { index: usize, band: String },

    #[error("failed to read raster {}", path.display())]
    Raster {
        path: PathBuf,
        #[source]
        source: RasterError,
    },

    #[error("band `{band}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        band: String,
        expected: [usize; 2],
        found: [usize; 2],
    },

    /// A transform needs a mask to work on, so it can't run without labels.
    #[error("a transform was configured but no label manifest was provided")]
    TransformWithoutLabels,

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("can't batch zero samples")]
    EmptyBatch,
}

impl ChipError {
    pub fn transform(reason: impl Into<String>) -> Self {
        Self::Transform(reason.into())
    }
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    #[error("band {band} requested from an image with {available} band(s)")]
    BandOutOfRange { band: usize, available: usize },

    #[error("{samples} samples can't be laid out as a {height}x{width} image")]
    Layout {
        samples: usize,
        height: usize,
        width: usize,
    },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("manifest has no `{0}` column")]
    MissingColumn(String),

    #[error("path {} is not valid unicode", .0.display())]
    NonUnicodePath(PathBuf),
}
