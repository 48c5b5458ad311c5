use std::sync::Arc;

use anyhow::Context;
use burn::{
    backend::{ndarray::NdArrayDevice, NdArrayBackend},
    data::dataloader::DataLoaderBuilder,
};
use clap::Parser;
use cloud_chips::{
    transform::{Compose, HorizontalFlip, Resize, Rotate, VerticalFlip},
    ChipBatcher, ChipDataset, FeatureManifest, LabelManifest,
};
use log::info;

mod cli;
mod config;


fn main() -> anyhow::Result<()> {
    type MyBackend = NdArrayBackend<f32>;

    env_logger::init();
    let cmd = cli::Cli::parse();
    let config = config::get_config(cmd.config.as_deref())?;

    let features = match (&cmd.features, &cmd.features_dir) {
        (Some(csv), _) => FeatureManifest::from_csv(csv)
            .with_context(|| format!("reading feature manifest {}", csv.display()))?,
        (None, Some(dir)) => FeatureManifest::scan_chip_dirs(dir, &cmd.bands)
            .with_context(|| format!("scanning chip directories in {}", dir.display()))?,
        (None, None) => anyhow::bail!("either --features or --features-dir is required"),
    };
    let labels = match (&cmd.labels, &cmd.labels_dir) {
        (Some(csv), _) => Some(
            LabelManifest::from_csv(csv)
                .with_context(|| format!("reading label manifest {}", csv.display()))?,
        ),
        (None, Some(dir)) => Some(LabelManifest::for_chips(dir, &features.chip_ids())),
        (None, None) => None,
    };

    let mut dataset = ChipDataset::new(features, cmd.bands.clone());
    if let Some(labels) = labels {
        dataset = dataset.with_labels(labels);
    }
    let pipeline = transforms(&cmd);
    if !pipeline.is_empty() {
        dataset = dataset.with_transform(Arc::new(pipeline));
    }
    info!(
        "{} chips, bands {:?}, labels: {}, transform: {}",
        dataset.len(),
        dataset.bands(),
        dataset.has_labels(),
        dataset.has_transform()
    );

    let sample = dataset
        .fetch(cmd.index)
        .with_context(|| format!("fetching chip {}", cmd.index))?;
    println!(
        "chip {} ({}): image {:?}, label {:?}",
        cmd.index,
        sample.chip_id,
        sample.chip.shape.dims,
        sample.label.as_ref().map(|label| label.shape.dims)
    );

    let batcher = ChipBatcher::<MyBackend>::new(NdArrayDevice::Cpu);
    let mut builder = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .shuffle(config.seed);
    if config.num_workers > 0 {
        builder = builder.num_workers(config.num_workers);
    }
    let dataloader = builder.build(dataset);

    let mut batches = 0;
    for batch in dataloader.iter() {
        let batch = batch.with_context(|| format!("loading batch {batches}"))?;
        info!(
            "batch {batches}: chips {:?}, labels {:?}",
            batch.chips.dims(),
            batch.labels.as_ref().map(|labels| labels.dims())
        );
        batches += 1;
    }
    println!("iterated {batches} batches of up to {}", config.batch_size);

    Ok(())
}

fn transforms(cmd: &cli::Cli) -> Compose {
    let mut pipeline = Compose::new();
    if let Some(size) = cmd.resize {
        pipeline = pipeline.then(Resize::new(size, size));
    }
    if let Some(limit) = cmd.rotate {
        pipeline = pipeline.then(Rotate::new(limit, 1.0));
    }
    if cmd.flip {
        pipeline = pipeline
            .then(HorizontalFlip::new(0.5))
            .then(VerticalFlip::new(0.5));
    }
    pipeline
}
