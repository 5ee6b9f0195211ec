//! YAML config source (`hdh-relay.yaml`).

use std::path::PathBuf;

use super::file_source::FileSource;
use crate::config::model::Config;

#[must_use]
pub fn new(path: PathBuf) -> FileSource {
    FileSource::new(path, "yaml", |content| {
        // An empty file is a valid "all defaults" config.
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yml::from_str::<Config>(content)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    })
}
