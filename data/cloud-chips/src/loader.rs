use std::{path::Path, sync::Arc};

use burn::{
    data::dataset::Dataset,
    tensor::{Data, Shape},
};

use crate::{
    error::ChipError,
    manifest::{FeatureManifest, FeatureRow, LabelManifest},
    raster::{BandReader, TiffReader},
    transform::ChipTransform,
    types::{ChipItem, ChipSample},
};

/// Rasters are single-band; band 1 is the data.
const DATA_BAND: usize = 1;

/// Serves chips listed in a [`FeatureManifest`], reading the band rasters
/// from disk on every fetch. Nothing is cached and a fetch never mutates the
/// dataset, so one instance can be shared between loader workers.
///
/// Construction does no validation: a manifest missing a band column, or
/// pointing at a file that isn't there, fails when that row is fetched.
pub struct ChipDataset<R = TiffReader> {
    features: FeatureManifest,
    bands: Vec<String>,
    labels: Option<LabelManifest>,
    transform: Option<Arc<dyn ChipTransform>>,
    reader: R,
}

/// Which parts of a fetch run, decided by what the dataset was built with.
enum Plan<'a> {
    FeaturesOnly,
    Labelled(&'a LabelManifest),
    Augmented(&'a LabelManifest, &'a dyn ChipTransform),
}

impl ChipDataset<TiffReader> {
    pub fn new(features: FeatureManifest, bands: Vec<String>) -> Self {
        tracing::debug!(
            "chip dataset over {} rows with bands {:?}",
            features.len(),
            bands
        );

        Self {
            features,
            bands,
            labels: None,
            transform: None,
            reader: TiffReader,
        }
    }
}

impl<R: BandReader> ChipDataset<R> {
    /// Label rows are matched to feature rows by position.
    pub fn with_labels(mut self, labels: LabelManifest) -> Self {
        if labels.len() != self.features.len() {
            tracing::debug!(
                "label manifest has {} rows, feature manifest has {}",
                labels.len(),
                self.features.len()
            );
        }
        self.labels = Some(labels);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ChipTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_reader<T: BandReader>(self, reader: T) -> ChipDataset<T> {
        ChipDataset {
            features: self.features,
            bands: self.bands,
            labels: self.labels,
            transform: self.transform,
            reader,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Reads row `index` into a sample with its bands stacked as
    /// `[height, width, bands]`, plus the mask when labels are configured,
    /// then runs the transform over both.
    pub fn fetch(&self, index: usize) -> Result<ChipSample, ChipError> {
        let plan = self.plan()?;
        let row = self
            .features
            .get(index)
            .ok_or(ChipError::IndexOutOfRange {
                index,
                len: self.features.len(),
            })?;

        let chip = self.read_chip(index, row)?;
        let (chip, label) = match plan {
            Plan::FeaturesOnly => (chip, None),
            Plan::Labelled(labels) => (chip, Some(self.read_label(index, labels)?)),
            Plan::Augmented(labels, transform) => {
                let mask = self.read_label(index, labels)?;
                let augmented = transform.apply(chip, mask)?;
                (augmented.image, Some(augmented.mask))
            }
        };

        Ok(ChipSample {
            chip_id: row.chip_id.clone(),
            chip,
            label,
        })
    }

    fn plan(&self) -> Result<Plan<'_>, ChipError> {
        match (self.labels.as_ref(), self.transform.as_deref()) {
            (None, None) => Ok(Plan::FeaturesOnly),
            (None, Some(_)) => Err(ChipError::TransformWithoutLabels),
            (Some(labels), None) => Ok(Plan::Labelled(labels)),
            (Some(labels), Some(transform)) => Ok(Plan::Augmented(labels, transform)),
        }
    }

    fn read_chip(&self, index: usize, row: &FeatureRow) -> Result<Data<f32, 3>, ChipError> {
        let mut planes = Vec::with_capacity(self.bands.len());
        let mut expected: Option<[usize; 2]> = None;

        for band in &self.bands {
            let path = row
                .band_path(band)
                .ok_or_else(|| ChipError::MissingBandPath {
                    index,
                    band: band.clone(),
                })?;
            let plane = self.read(path)?;

            let found = plane.shape.dims;
            match expected {
                Some(expected) if expected != found => {
                    return Err(ChipError::ShapeMismatch {
                        band: band.clone(),
                        expected,
                        found,
                    });
                }
                Some(_) => {}
                None => expected = Some(found),
            }
            planes.push(plane.value);
        }

        let [height, width] = expected.unwrap_or([0, 0]);
        Ok(stack_channels(planes, height, width))
    }

    fn read_label(&self, index: usize, labels: &LabelManifest) -> Result<Data<f32, 2>, ChipError> {
        let row = labels.get(index).ok_or(ChipError::IndexOutOfRange {
            index,
            len: labels.len(),
        })?;

        self.read(&row.label_path)
    }

    fn read(&self, path: &Path) -> Result<Data<f32, 2>, ChipError> {
        self.reader
            .read_band(path, DATA_BAND)
            .map_err(|source| ChipError::Raster {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// A row that fails to load is yielded as an error rather than `None`, since
/// burn's loaders stop the epoch at the first `None`.
impl<R: BandReader> Dataset<ChipItem> for ChipDataset<R> {
    fn get(&self, index: usize) -> Option<ChipItem> {
        if index >= self.features.len() {
            return None;
        }
        Some(self.fetch(index).map_err(Arc::new))
    }

    fn len(&self) -> usize {
        self.features.len()
    }
}

/// Interleaves equally sized planes into `[height, width, planes]`.
fn stack_channels(planes: Vec<Vec<f32>>, height: usize, width: usize) -> Data<f32, 3> {
    let channels = planes.len();
    let mut value = vec![0.0; height * width * channels];
    for (channel, plane) in planes.into_iter().enumerate() {
        for (pixel, sample) in plane.into_iter().enumerate() {
            value[pixel * channels + channel] = sample;
        }
    }

    Data::new(value, Shape::new([height, width, channels]))
}
