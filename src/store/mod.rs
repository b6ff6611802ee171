//! Source and destination key-value collaborators.
//!
//! The migration only needs an ordered id scan, a point read and an upsert
//! that carries a durability requirement. Two implementations are provided:
//! a directory of JSON files and an in-memory map.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod directory;
pub mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document id: {0:?}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Type and variant name, free of any message text
    pub fn class(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "StoreError::NotFound",
            StoreError::InvalidId(_) => "StoreError::InvalidId",
            StoreError::Io(_) => "StoreError::Io",
            StoreError::Unavailable(_) => "StoreError::Unavailable",
        }
    }
}

/// Write acknowledgement requirement passed through to the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityLevel {
    None,
    #[default]
    Majority,
    MajorityAndPersistToActive,
    PersistToMajority,
}

impl DurabilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurabilityLevel::None => "NONE",
            DurabilityLevel::Majority => "MAJORITY",
            DurabilityLevel::MajorityAndPersistToActive => "MAJORITY_AND_PERSIST_TO_ACTIVE",
            DurabilityLevel::PersistToMajority => "PERSIST_TO_MAJORITY",
        }
    }
}

impl fmt::Display for DurabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown durability level: {0}")]
pub struct ParseDurabilityError(pub String);

impl FromStr for DurabilityLevel {
    type Err = ParseDurabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "NONE" => Ok(DurabilityLevel::None),
            "MAJORITY" => Ok(DurabilityLevel::Majority),
            "MAJORITY_AND_PERSIST_TO_ACTIVE" => Ok(DurabilityLevel::MajorityAndPersistToActive),
            "PERSIST_TO_MAJORITY" => Ok(DurabilityLevel::PersistToMajority),
            _ => Err(ParseDurabilityError(s.to_string())),
        }
    }
}

/// Read side of the migration
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Ids in ascending byte order, strictly greater than `after` when given
    fn scan_ids(&self, after: Option<String>) -> BoxStream<'_, Result<String, StoreError>>;

    async fn get(&self, id: &str) -> Result<Bytes, StoreError>;
}

/// Write side of the migration
#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn upsert(&self, id: &str, document: Bytes, durability: DurabilityLevel) -> Result<(), StoreError>;
}
