use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::RandomForest;

/// Save model to a JSON file
pub fn save_model<P: AsRef<Path>>(model: &RandomForest, path: P) -> Result<()> {
    let path = path.as_ref();
    debug!("Saving trained model to disk at {}.", path.display());
    let file = File::create(path).map_err(|e| PipelineError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, model)
        .map_err(|e| PipelineError::write(path, e.into()))?;
    writer.flush().map_err(|e| PipelineError::write(path, e))?;
    info!("Model saved.");
    Ok(())
}

/// Load model from a JSON file
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<RandomForest> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PipelineError::read(path, e))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| PipelineError::parse(path.display().to_string(), e))
}

/// Decode a model fetched from the object store.
pub fn model_from_bytes(bytes: &[u8]) -> Result<RandomForest> {
    serde_json::from_slice(bytes).map_err(|e| PipelineError::parse("model object", e))
}
