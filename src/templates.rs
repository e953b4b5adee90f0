use crate::{
    plan_io::{FormatError, PlanIo},
    record::{MachineIdentity, Plan},
};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no machine profile labelled '{0}'")]
    UnknownMachine(String),

    #[error("invalid machine profile: {0}")]
    InvalidProfile(String),

    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse machine profiles in {}: {source}", path.display())]
    ProfilesSyntax {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("template for '{label}' could not be loaded from {}: {source}", path.display())]
    Template {
        label: String,
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

/// A destination machine: label shown to the operator, the identity written
/// on every beam, and the baseline plan used as transplant target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineProfile {
    pub label: String,
    pub manufacturer: String,
    pub institution: String,
    pub model: String,
    pub serial: String,
    pub machine_name: String,
    pub template_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

impl MachineProfile {
    pub fn identity(&self) -> MachineIdentity {
        MachineIdentity {
            manufacturer: self.manufacturer.clone(),
            institution: self.institution.clone(),
            model: self.model.clone(),
            serial: self.serial.clone(),
            machine_name: self.machine_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ProfileFile {
    profiles: Vec<MachineProfile>,
}

/// The configured destination machines and their templates.
#[derive(Clone, Debug, Default)]
pub struct TemplateStore {
    profiles: Vec<MachineProfile>,
}

impl TemplateStore {
    /// # Errors
    ///
    /// Returns error if a label is empty or appears twice
    pub fn new(profiles: Vec<MachineProfile>) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        for profile in &profiles {
            if profile.label.trim().is_empty() {
                return Err(ConfigurationError::InvalidProfile(
                    "label cannot be empty".into(),
                ));
            }
            if profile.machine_name.trim().is_empty() {
                return Err(ConfigurationError::InvalidProfile(format!(
                    "machine name of '{}' cannot be empty",
                    profile.label
                )));
            }
            if !seen.insert(profile.label.as_str()) {
                return Err(ConfigurationError::InvalidProfile(format!(
                    "duplicate label '{}'",
                    profile.label
                )));
            }
        }
        Ok(Self { profiles })
    }

    /// Parse a profile file. Relative template paths resolve against `base_dir`.
    pub fn from_json(json: &str, source: &Path, base_dir: &Path) -> Result<Self, ConfigurationError> {
        let file: ProfileFile =
            serde_json::from_str(json).map_err(|source_err| ConfigurationError::ProfilesSyntax {
                path: source.to_path_buf(),
                source: source_err,
            })?;
        let profiles = file
            .profiles
            .into_iter()
            .map(|mut profile| {
                if profile.template_path.is_relative() {
                    profile.template_path = base_dir.join(&profile.template_path);
                }
                profile
            })
            .collect();
        Self::new(profiles)
    }

    /// Load profiles from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigurationError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let store = Self::from_json(&json, path, base_dir)?;
        info!(path = %path.display(), machines = store.profiles.len(), "loaded machine profiles");
        Ok(store)
    }

    pub fn profiles(&self) -> &[MachineProfile] {
        &self.profiles
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|profile| profile.label.as_str())
    }

    pub fn profile(&self, label: &str) -> Result<&MachineProfile, ConfigurationError> {
        self.profiles
            .iter()
            .find(|profile| profile.label == label)
            .ok_or_else(|| ConfigurationError::UnknownMachine(label.to_string()))
    }

    /// Read the baseline plan of a machine from storage.
    pub fn template(&self, label: &str) -> Result<Plan, ConfigurationError> {
        let profile = self.profile(label)?;
        PlanIo::open(&profile.template_path).map_err(|source| ConfigurationError::Template {
            label: label.to_string(),
            path: profile.template_path.clone(),
            source,
        })
    }
}
