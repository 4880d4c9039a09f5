use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use sha2::Digest;
use sha2::Sha256;

/// One payload read from a source.
///
/// Carries the raw bytes together with the format name a decoder is looked
/// up by, the producing source's id, and a content checksum watchers use to
/// suppress no-change pushes. A source may attach leftover positional
/// arguments; they ride along with the payload and are stored on merge.
#[derive(Clone)]
pub struct DataSet {
    source: String,
    format: String,
    data: Vec<u8>,
    args: Vec<String>,
    timestamp: DateTime<Utc>,
    checksum: [u8; 32],
}

impl DataSet {
    pub fn new(source: impl Into<String>, format: impl Into<String>, data: Vec<u8>) -> Self {
        let checksum = checksum(&data);
        DataSet {
            source: source.into(),
            format: format.into(),
            data,
            args: Vec::new(),
            timestamp: Utc::now(),
            checksum,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Id of the source that produced this payload.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Format name a decoder is looked up by.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Positional arguments left over after the source parsed its input.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn checksum(&self) -> [u8; 32] {
        self.checksum
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("source", &self.source)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// SHA-256 over a raw payload.
pub(crate) fn checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
