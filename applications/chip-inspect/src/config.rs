use std::path::Path;

use burn::config::Config;

#[derive(Config)]
pub struct ChipLoaderConfig {
    #[config(default = 8)]
    pub batch_size: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
}

pub fn get_config(config_path: Option<&Path>) -> anyhow::Result<ChipLoaderConfig> {
    match config_path {
        Some(path) => ChipLoaderConfig::load(path)
            .map_err(|err| anyhow::anyhow!("loading {}: {err}", path.display())),
        None => Ok(ChipLoaderConfig::new()),
    }
}
