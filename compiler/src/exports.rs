// exports.rs — Exported kernel list from the compile-unit descriptor
//
// An ordered `name -> signature` mapping. Prepare walks it in insertion
// order; names are unique by construction.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::signature::Signature;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportedKernelList {
    kernels: IndexMap<String, Signature>,
}

impl ExportedKernelList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `{"kernel": <signature bits>, ...}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Add or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, signature: Signature) {
        self.kernels.insert(name.into(), signature);
    }

    pub fn get(&self, name: &str) -> Option<Signature> {
        self.kernels.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Signature)> {
        self.kernels.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, Signature)> for ExportedKernelList {
    fn from_iter<T: IntoIterator<Item = (S, Signature)>>(iter: T) -> Self {
        ExportedKernelList {
            kernels: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
