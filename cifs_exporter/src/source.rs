//! Acquire the CIFS statistics report.
//!
//! The report is read whole into memory before parsing begins; the parser
//! never sees a file handle.

use std::path::{Path, PathBuf};

use tokio::fs;

#[derive(thiserror::Error, Debug)]
/// Errors produced by functions in this module
pub enum Error {
    /// Wrapper for [`std::io::Error`]
    #[error("Failed to read report {path:?}: {source}")]
    Io {
        /// Path of the report
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

/// Read the report at `path`.
///
/// # Errors
///
/// Function will error if the file cannot be opened or is not valid UTF-8.
pub async fn read_report(path: &Path) -> Result<String, Error> {
    // NOTE `read_to_string` uses as few IO operations as possible in its
    // implementation, procfs files are generated on open so one read gives a
    // consistent snapshot.
    fs::read_to_string(path).await.map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
