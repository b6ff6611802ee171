//! Append-only failure records for documents that could not be migrated.
//!
//! Records never contain document content or raw error messages. Each level
//! of the error's source chain is reduced to a type name, a presence flag and
//! a SHA-256 digest of its message.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_MAX_BYTES: usize = 64 * 1024;
pub const MAX_CAUSE_DEPTH: usize = 8;
const TRUNCATION_MARKER: &str = "\n... truncated ...\n";
const CREATE_ATTEMPTS: usize = 5;

#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Unable to write quarantine entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to write quarantine entry after {attempts} attempts: {source}")]
    Exhausted {
        attempts: usize,
        #[source]
        source: std::io::Error,
    },
}

impl QuarantineError {
    pub fn class(&self) -> &'static str {
        match self {
            QuarantineError::InvalidArgument(_) => "QuarantineError::InvalidArgument",
            QuarantineError::Io(_) => "QuarantineError::Io",
            QuarantineError::Exhausted { .. } => "QuarantineError::Exhausted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuarantineWriter {
    dir: PathBuf,
    max_bytes: usize,
}

impl QuarantineWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(dir: impl Into<PathBuf>, max_bytes: usize) -> Result<Self, QuarantineError> {
        if max_bytes == 0 {
            return Err(QuarantineError::InvalidArgument("max_bytes must be > 0"));
        }
        Ok(Self {
            dir: dir.into(),
            max_bytes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one failure record and return its location
    pub fn write(
        &self,
        document_id: &str,
        stage: &str,
        error: &(dyn StdError + 'static),
    ) -> Result<PathBuf, QuarantineError> {
        if document_id.trim().is_empty() {
            return Err(QuarantineError::InvalidArgument("document id must be non-blank"));
        }
        if stage.trim().is_empty() {
            return Err(QuarantineError::InvalidArgument("stage must be non-blank"));
        }

        fs::create_dir_all(&self.dir)?;

        let payload = self.build_payload(document_id, stage, error);
        let base_name = format!(
            "{}-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            stage_slug(stage),
            short_hash(document_id)
        );

        let mut last_err = None;
        for attempt in 0..CREATE_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.txt", base_name)
            } else {
                format!("{}-{}.txt", base_name, attempt)
            };
            let path = self.dir.join(name);
            match create_new(&path, payload.as_bytes()) {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }

        Err(QuarantineError::Exhausted {
            attempts: CREATE_ATTEMPTS,
            source: last_err
                .unwrap_or_else(|| std::io::Error::from(std::io::ErrorKind::AlreadyExists)),
        })
    }

    fn build_payload(&self, document_id: &str, stage: &str, error: &(dyn StdError + 'static)) -> String {
        let mut out = String::with_capacity(1024);
        let _ = writeln!(out, "docId={}", document_id.escape_debug());
        let _ = writeln!(out, "stage={}", stage.escape_debug());

        let mut current = Some(error);
        let mut depth = 0;
        while let Some(err) = current {
            if depth >= MAX_CAUSE_DEPTH {
                break;
            }
            let prefix = if depth == 0 {
                "exception".to_string()
            } else {
                format!("cause{}", depth)
            };
            let message = err.to_string();
            let _ = writeln!(out, "{}Class={}", prefix, error_class(err));
            let _ = writeln!(out, "{}MessagePresent={}", prefix, !message.trim().is_empty());
            let _ = writeln!(out, "{}MessageSha256={}", prefix, hex::encode(Sha256::digest(message.as_bytes())));
            current = err.source();
            depth += 1;
        }
        if current.is_some() {
            out.push_str("causeTruncated=true\n");
        }

        if out.len() > self.max_bytes {
            let mut cut = self.max_bytes;
            while !out.is_char_boundary(cut) {
                cut -= 1;
            }
            out.truncate(cut);
            out.push_str(TRUNCATION_MARKER);
        }
        out
    }
}

fn create_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Static class name for one level of an error chain. Errors from outside
/// this crate that are not listed here report as `Error`.
pub fn error_class(err: &(dyn StdError + 'static)) -> &'static str {
    use crate::config::ConfigError;
    use crate::encryption::EncryptionError;
    use crate::migrate::{MigrationError, StageError};
    use crate::ops::{CheckpointError, KillSwitchError, RateLimitError};
    use crate::pii::ScanError;
    use crate::store::StoreError;

    if err.is::<StageError>() {
        "StageError"
    } else if let Some(e) = err.downcast_ref::<StoreError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<ScanError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<EncryptionError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<RateLimitError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<MigrationError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<CheckpointError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<QuarantineError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<KillSwitchError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<ConfigError>() {
        e.class()
    } else if err.is::<std::io::Error>() {
        "std::io::Error"
    } else if err.is::<serde_json::Error>() {
        "serde_json::Error"
    } else if err.is::<regex::Error>() {
        "regex::Error"
    } else if err.is::<base64::DecodeError>() {
        "base64::DecodeError"
    } else if err.is::<tokio::task::JoinError>() {
        "tokio::task::JoinError"
    } else {
        "Error"
    }
}

fn stage_slug(stage: &str) -> String {
    let slug: String = stage
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if slug.trim().is_empty() {
        "stage".to_string()
    } else {
        slug
    }
}

/// First 8 bytes of the SHA-256 of the id, hex-encoded
pub fn short_hash(document_id: &str) -> String {
    hex::encode(&Sha256::digest(document_id.as_bytes())[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::EncryptionError;
    use crate::migrate::{Stage, StageError};
    use crate::pii::ScanError;
    use crate::store::StoreError;
    use regex::Regex;
    use std::fmt;

    #[derive(Error, Debug)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[derive(Error, Debug)]
    #[error("card 4111-1111-1111-1111 rejected")]
    struct Inner;

    #[derive(Error, Debug)]
    #[error("")]
    struct Silent;

    /// Debug output is the message itself
    #[derive(Error)]
    #[error("alice@x.com not found")]
    struct Forwarding;

    impl fmt::Debug for Forwarding {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Display::fmt(self, f)
        }
    }

    #[derive(Error, Debug)]
    #[error("level {depth}")]
    struct Chain {
        depth: usize,
        #[source]
        next: Option<Box<Chain>>,
    }

    fn chain(len: usize) -> Chain {
        let mut err = Chain { depth: len - 1, next: None };
        for depth in (0..len - 1).rev() {
            err = Chain {
                depth,
                next: Some(Box::new(err)),
            };
        }
        err
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    fn encrypt_failure() -> StageError {
        StageError::new(Stage::Encrypt, ScanError::Encryption(EncryptionError::AuthenticationFailed))
    }

    #[test]
    fn test_record_shape_and_filename() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::new(dir.path().join("q"));

        let path = writer.write("users/42", "ENCRYPT", &encrypt_failure()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let pattern = Regex::new(r"^\d+-ENCRYPT-[0-9a-f]{16}\.txt$").unwrap();
        assert!(pattern.is_match(&name), "unexpected name {}", name);
        assert!(!name.contains("users"));

        let body = read(&path);
        assert!(body.contains("docId=users/42\n"));
        assert!(body.contains("stage=ENCRYPT\n"));
        assert!(body.contains("exceptionClass=StageError\n"));
        assert!(body.contains("exceptionMessagePresent=true\n"));
        assert!(body.contains(&format!(
            "exceptionMessageSha256={}\n",
            hex::encode(Sha256::digest(b"ENCRYPT stage failed"))
        )));
        assert!(body.contains("cause1Class=ScanError::Encryption\n"));
        assert!(body.contains("cause2Class=EncryptionError::AuthenticationFailed\n"));
        assert!(!body.contains("causeTruncated"));
    }

    #[test]
    fn test_record_never_contains_message_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::new(dir.path());

        let path = writer.write("doc-1", "UPSERT", &Outer(Inner)).unwrap();
        let body = read(&path);
        assert!(!body.contains("4111-1111-1111-1111"));
        assert!(!body.contains("outer failure"));
        assert!(body.contains("cause1MessageSha256="));
    }

    #[test]
    fn test_class_never_taken_from_message() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::new(dir.path());

        let lookup = StageError::new(Stage::Get, StoreError::NotFound("alice@x.com".into()));
        let body = read(&writer.write("doc-1", "GET", &lookup).unwrap());
        assert!(body.contains("cause1Class=StoreError::NotFound\n"));
        assert!(!body.contains("alice"));

        let body = read(&writer.write("doc-1", "GET", &Forwarding).unwrap());
        assert!(body.contains("exceptionClass=Error\n"));
        assert!(!body.contains("alice"));
    }

    #[test]
    fn test_foreign_error_classes() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "alice@x.com");
        assert_eq!(error_class(&io), "std::io::Error");
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(error_class(&json), "serde_json::Error");
        assert_eq!(error_class(&Outer(Inner)), "Error");
    }

    #[test]
    fn test_blank_message_flagged_absent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::new(dir.path());

        let body = read(&writer.write("doc-1", "GET", &Silent).unwrap());
        assert!(body.contains("exceptionMessagePresent=false\n"));
    }

    #[test]
    fn test_cause_chain_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::new(dir.path());

        let body = read(&writer.write("doc-1", "GET", &chain(12)).unwrap());
        assert!(body.contains("cause7Class=Error\n"));
        assert!(!body.contains("cause8Class"));
        assert!(body.contains("causeTruncated=true\n"));
    }

    #[test]
    fn test_collision_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::new(dir.path());

        let paths: Vec<PathBuf> = (0..3)
            .map(|_| writer.write("same-doc", "GET", &Silent).unwrap())
            .collect();
        assert_ne!(paths[0], paths[1]);
        assert_ne!(paths[1], paths[2]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_stage_slug_sanitized() {
        assert_eq!(stage_slug("RATE LIMIT/x"), "RATE_LIMIT_x");
        assert_eq!(stage_slug("ok-stage_1"), "ok-stage_1");
        assert_eq!(stage_slug("é"), "_");
    }

    #[test]
    fn test_payload_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::with_max_bytes(dir.path(), 40).unwrap();

        let body = read(&writer.write("doc-1", "ENCRYPT", &chain(3)).unwrap());
        assert!(body.ends_with(TRUNCATION_MARKER));
        assert_eq!(body.len(), 40 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_blank_arguments_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QuarantineWriter::new(dir.path());
        assert!(matches!(
            writer.write(" ", "GET", &Silent),
            Err(QuarantineError::InvalidArgument(_))
        ));
        assert!(matches!(
            writer.write("doc", "", &Silent),
            Err(QuarantineError::InvalidArgument(_))
        ));
        assert!(QuarantineWriter::with_max_bytes(dir.path(), 0).is_err());
    }
}
