//! Parser for the Linux CIFS client statistics report.
//!
//! The kernel's SMB client publishes `/proc/fs/cifs/Stats`, a fixed-format
//! report of global counters followed by one block per mounted share. This
//! crate turns one snapshot of that text into a [`StatsSnapshot`]. Parsing is
//! a pure function of its input: no I/O, no caching, no global mutable
//! state, callers may parse concurrently.
//!
//! ```text
//! Resources in use
//! CIFS Session: 1
//! Share (unique mount targets): 2
//! SMB Request/Response Buffer: 1 Pool size: 5
//! SMB Small Req/Resp Buffer: 1 Pool size: 30
//! Operations (MIDs): 0
//!
//! 0 session 0 share reconnects
//! Total vfs operations: 16 maximum at one time: 2
//!
//! 1) \\server\share
//! SMBs: 9
//! Negotiates: 0 sent 0 failed
//! ...
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]

pub mod block;
pub mod header;
mod template;

use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

pub use block::{ConnectionBlock, Exchange, Fields, LegacyFields, ModernFields, Shape, Warning};
pub use header::{HEADER_LINES, Header};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors produced by [`parse`]
pub enum Error {
    /// Wrapper for [`header::Error`]
    #[error(transparent)]
    Header(#[from] header::Error),
}

/// The structured result of one parse.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Global counters
    pub header: Header,
    /// Per-share blocks in report order
    pub blocks: Vec<ConnectionBlock>,
}

/// A snapshot and the recoverable problems met while producing it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Parsed {
    /// The parsed report
    pub snapshot: StatsSnapshot,
    /// Blocks dropped or truncated, in report order
    pub warnings: Vec<Warning>,
}

impl Parsed {
    /// Number of blocks dropped because they matched no shape.
    #[must_use]
    pub fn skipped_blocks(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::BlockIdentityUnmatched { .. }))
            .count()
    }

    /// Number of blocks kept with fewer counters than their shape declares.
    #[must_use]
    pub fn truncated_blocks(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::BlockFieldTruncated { .. }))
            .count()
    }
}

/// Parse one report.
///
/// The first [`HEADER_LINES`] lines are scanned for global counters, stopping
/// early at a line that opens a block. Everything after is handed to the
/// block extractor.
///
/// # Errors
///
/// Returns [`Error::Header`] if a header line matches a template but carries
/// a token that is not a non-negative 64-bit integer. Problems with blocks
/// never fail the parse, they are reported in [`Parsed::warnings`].
pub fn parse(text: &str) -> Result<Parsed, Error> {
    let mut header = Header::default();
    let mut offset = 0;

    for line in text.split_inclusive('\n').take(HEADER_LINES) {
        if block::is_block_start(line) {
            break;
        }
        header.scan_line(line.trim_end_matches(['\r', '\n']))?;
        offset += line.len();
    }

    let remainder = &text[offset..];
    let mut warnings = Vec::new();
    let blocks = block::extract_all(remainder, &mut warnings);
    debug!(
        blocks = blocks.len(),
        warnings = warnings.len(),
        "parsed cifs stats"
    );

    Ok(Parsed {
        snapshot: StatsSnapshot { header, blocks },
        warnings,
    })
}

impl FromStr for StatsSnapshot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s).map(|parsed| parsed.snapshot)
    }
}
