use std::sync::Arc;

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Tensor},
};

pub mod error;
mod loader;
pub mod manifest;
pub mod raster;
pub mod transform;
mod types;


pub use error::{ChipError, ManifestError, RasterError};
pub use loader::ChipDataset;
pub use manifest::{FeatureManifest, FeatureRow, LabelManifest, LabelRow};
pub use raster::{BandReader, TiffReader};
pub use transform::ChipTransform;
pub use types::{Augmented, ChipItem, ChipSample};

pub struct ChipBatcher<B: Backend> {
    device: B::Device,
}

/// A batch fails as a whole when any of its rows failed to load.
pub type ChipBatchResult<B> = Result<ChipBatch<B>, Arc<ChipError>>;

impl<B: Backend> Batcher<ChipItem, ChipBatchResult<B>> for ChipBatcher<B> {
    fn batch(&self, items: Vec<ChipItem>) -> ChipBatchResult<B> {
        let samples = items.into_iter().collect::<Result<Vec<_>, _>>()?;
        self.stack(samples).map_err(Arc::new)
    }
}

impl<B: Backend> ChipBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stacks samples of one shape into channels-first tensors.
    pub fn stack(&self, samples: Vec<ChipSample>) -> Result<ChipBatch<B>, ChipError> {
        if samples.is_empty() {
            return Err(ChipError::EmptyBatch);
        }
        let chip_ids = samples.iter().map(|sample| sample.chip_id.clone()).collect();
        let labelled = samples.iter().all(|sample| sample.label.is_some());

        let mut chip_tensors = Vec::with_capacity(samples.len());
        let mut label_tensors = Vec::with_capacity(samples.len());
        for sample in samples {
            let chip = Tensor::<B, 3>::from_data_device(sample.chip.convert(), &self.device);
            chip_tensors.push(chip.unsqueeze::<4>());
            if let (true, Some(label)) = (labelled, sample.label) {
                let label = Tensor::<B, 2>::from_data_device(label.convert(), &self.device);
                label_tensors.push(label.unsqueeze::<3>());
            }
        }

        let chips = Tensor::cat(chip_tensors, 0) // n, h, w, c
            .swap_dims(1, 3) // n, c, w, h
            .swap_dims(2, 3); // n, c, h, w
        let labels = labelled.then(|| Tensor::cat(label_tensors, 0));
        tracing::info!(
            "loaded batch of {:?} with labels {:?}",
            chips.shape(),
            labels.as_ref().map(|labels| labels.shape())
        );

        Ok(ChipBatch {
            chip_ids,
            chips,
            labels,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChipBatch<B: Backend> {
    pub chip_ids: Vec<String>,
    /// `[batch, bands, height, width]`
    pub chips: Tensor<B, 4>,
    /// `[batch, height, width]`, present when every sample had a mask.
    pub labels: Option<Tensor<B, 3>>,
}
