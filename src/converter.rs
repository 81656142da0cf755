use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::data::loader::{load_file, LoadError};
use crate::data::model::MnistDataset;
use crate::output;

/// Where the dataset is expected, relative to the working directory.
pub const DEFAULT_INPUT: &str = "./data/mnist.pkl.gz";

/// Loads the pickled splits and prints them as three JSON lines.
#[derive(Debug, Clone)]
pub struct Converter {
    pub input: PathBuf,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT)
    }
}

impl Converter {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
        }
    }

    pub fn load(&self) -> Result<MnistDataset, LoadError> {
        load_file(&self.input)
    }

    /// Nothing is written unless the whole dataset loaded.
    pub fn run<W: Write>(&self, out: W) -> Result<()> {
        let dataset = self
            .load()
            .with_context(|| format!("loading MNIST data from {}", self.input.display()))?;
        output::write_dataset(&dataset, out).context("writing JSON lines")?;
        Ok(())
    }
}
