use std::sync::Arc;

use burn::tensor::Data;

use crate::error::ChipError;

/// What the dataset hands a data loader for one row. The error is shared so
/// the item stays `Clone`.
pub type ChipItem = Result<ChipSample, Arc<ChipError>>;

/// One fetched chip: bands stacked as `[height, width, channels]`, plus the
/// `[height, width]` mask when labels are available.
#[derive(Debug, Clone)]
pub struct ChipSample {
    pub chip_id: String,
    pub chip: Data<f32, 3>,
    pub label: Option<Data<f32, 2>>,
}

impl ChipSample {
    pub fn height(&self) -> usize {
        self.chip.shape.dims[0]
    }

    pub fn width(&self) -> usize {
        self.chip.shape.dims[1]
    }

    pub fn channels(&self) -> usize {
        self.chip.shape.dims[2]
    }
}

/// Image and mask after a transform ran over them.
#[derive(Debug, Clone)]
pub struct Augmented {
    pub image: Data<f32, 3>,
    pub mask: Data<f32, 2>,
}

impl Augmented {
    pub fn new(image: Data<f32, 3>, mask: Data<f32, 2>) -> Self {
        Self { image, mask }
    }
}
