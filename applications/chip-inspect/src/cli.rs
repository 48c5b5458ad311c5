use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Loads a chip manifest, fetches one sample and runs an epoch of batches.
#[derive(Parser)]
#[command(group(ArgGroup::new("feature_source").required(true).args(["features", "features_dir"])))]
pub struct Cli {
    /// CSV with `chip_id` and one `<band>_path` column per band.
    #[arg(long)]
    pub features: Option<PathBuf>,

    /// Directory with one `<chip_id>/<band>.tif` folder per chip.
    #[arg(long)]
    pub features_dir: Option<PathBuf>,

    /// CSV with `chip_id` and `label_path`, row-aligned with the features.
    #[arg(long, conflicts_with = "labels_dir")]
    pub labels: Option<PathBuf>,

    /// Directory with one `<chip_id>.tif` mask per chip.
    #[arg(long)]
    pub labels_dir: Option<PathBuf>,

    #[arg(long, value_delimiter = ',', default_value = "B02,B03,B04,B08")]
    pub bands: Vec<String>,

    /// JSON loader config; defaults are used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Resize chips and masks to this many pixels square.
    #[arg(long)]
    pub resize: Option<usize>,

    /// Randomly rotate chips by up to this many degrees either way.
    #[arg(long, allow_negative_numbers = true)]
    pub rotate: Option<f64>,

    /// Randomly flip chips horizontally and vertically.
    #[arg(long)]
    pub flip: bool,

    /// Sample to print.
    #[arg(long, default_value_t = 0)]
    pub index: usize,
}
