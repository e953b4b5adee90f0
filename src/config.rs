//! Runtime configuration, resolved once at startup and passed into the workflow.

use crate::templates::{ConfigurationError, TemplateStore};

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default machine profile file, relative to the working directory.
pub const PROFILES_FILE_NAME: &str = "machines.json";
/// Default private annex sidecar, relative to the working directory.
pub const ANNEX_FILE_NAME: &str = "annex.xml";

#[derive(Clone, Debug)]
pub struct Config {
    profiles_path: PathBuf,
    annex_path: PathBuf,
}

impl Config {
    pub fn new(profiles_path: PathBuf, annex_path: PathBuf) -> Self {
        Self {
            profiles_path,
            annex_path,
        }
    }

    /// Use the overrides when given, otherwise the default file names in the
    /// working directory.
    pub fn resolve(profiles_override: Option<PathBuf>, annex_override: Option<PathBuf>) -> Self {
        Self::new(
            profiles_override.unwrap_or_else(|| PathBuf::from(PROFILES_FILE_NAME)),
            annex_override.unwrap_or_else(|| PathBuf::from(ANNEX_FILE_NAME)),
        )
    }

    pub fn profiles_path(&self) -> &Path {
        &self.profiles_path
    }

    pub fn annex_path(&self) -> &Path {
        &self.annex_path
    }

    pub fn template_store(&self) -> Result<TemplateStore, ConfigurationError> {
        TemplateStore::load(&self.profiles_path)
    }

    pub fn read_annex(&self) -> Result<Vec<u8>, ConfigurationError> {
        fs::read(&self.annex_path).map_err(|source| ConfigurationError::Unreadable {
            path: self.annex_path.clone(),
            source,
        })
    }
}
