//! Flat-file persistence.
//!
//! # Submodules
//!
//! - [`seen_links`]: the set of article links already selected, one per line
//! - [`subscribers`]: append-only `<timestamp>,<count>` channel size samples
//!
//! # Layout
//!
//! ```text
//! data_dir/
//! ├── seen_links.txt
//! └── subscribers.txt
//! ```

pub mod seen_links;
pub mod subscribers;

use thiserror::Error;

/// Errors raised by the flat-file stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record on line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
