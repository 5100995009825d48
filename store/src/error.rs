use std::io;

/// Why a single store operation failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreFault {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("stored document is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("refusing to store non-finite number {0}")]
    NonFinite(f64),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read `{key}` from launch state store: {source}")]
    Read {
        key: String,
        #[source]
        source: StoreFault,
    },
    #[error("failed to write `{key}` to launch state store: {source}")]
    Write {
        key: String,
        #[source]
        source: StoreFault,
    },
}

impl StorageError {
    pub(crate) fn read(key: &str, source: impl Into<StoreFault>) -> Self {
        Self::Read {
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn write(key: &str, source: impl Into<StoreFault>) -> Self {
        Self::Write {
            key: key.to_string(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Read { key, .. } | Self::Write { key, .. } => key,
        }
    }

    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_accessor_covers_both_variants() {
        let read = StorageError::read("a", StoreFault::Unavailable("down".into()));
        let write = StorageError::write("b", StoreFault::NonFinite(f64::NAN));
        assert_eq!(read.key(), "a");
        assert_eq!(write.key(), "b");
        assert!(read.is_read());
        assert!(!write.is_read());
    }

    #[test]
    fn display_includes_key_and_cause() {
        let err = StorageError::read(
            "ns.crash_loop_timestamps",
            StoreFault::TypeMismatch {
                expected: "number list",
                found: "string",
            },
        );
        let text = err.to_string();
        assert!(text.contains("ns.crash_loop_timestamps"));
        assert!(text.contains("expected number list, found string"));
    }
}
