//! SMB1 connection block
//!
//! ```text
//! 1) \\server\share
//! SMBs: 10 Oplocks breaks: 2
//! Reads:  100 Bytes: 5000
//! Writes: 50 Bytes: 8000
//! Flushes: 3
//! Locks: 0 HardLinks: 0 Symlinks: 0
//! Opens: 20 Closes: 18 Deletes: 1
//! Posix Opens: 0 Posix Mkdirs: 0
//! Mkdirs: 0 Rmdirs: 0
//! Renames: 2 T2 Renames 0
//! FindFirst: 1 FNext 1 FClose 1
//! ```

use serde::Serialize;

/// Counter lines following the identity line.
pub(crate) const LINES: [&str; 10] = [
    "SMBs: {smbs} Oplocks breaks: {oplock_breaks}",
    "Reads: {reads} Bytes: {read_bytes}",
    "Writes: {writes} Bytes: {write_bytes}",
    "Flushes: {flushes}",
    "Locks: {locks} HardLinks: {hardlinks} Symlinks: {symlinks}",
    "Opens: {opens} Closes: {closes} Deletes: {deletes}",
    "Posix Opens: {posix_opens} Posix Mkdirs: {posix_mkdirs}",
    "Mkdirs: {mkdirs} Rmdirs: {rmdirs}",
    "Renames: {renames} T2 Renames {t2_renames}",
    "FindFirst: {find_first} FNext {find_next} FClose {find_close}",
];

/// Counter names in report order.
pub const FIELDS: [&str; 22] = [
    "smbs",
    "oplock_breaks",
    "reads",
    "read_bytes",
    "writes",
    "write_bytes",
    "flushes",
    "locks",
    "hardlinks",
    "symlinks",
    "opens",
    "closes",
    "deletes",
    "posix_opens",
    "posix_mkdirs",
    "mkdirs",
    "rmdirs",
    "renames",
    "t2_renames",
    "find_first",
    "find_next",
    "find_close",
];

/// Named view of a complete SMB1 block.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegacyFields {
    pub smbs: u64,
    pub oplock_breaks: u64,
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub flushes: u64,
    pub locks: u64,
    pub hardlinks: u64,
    pub symlinks: u64,
    pub opens: u64,
    pub closes: u64,
    pub deletes: u64,
    pub posix_opens: u64,
    pub posix_mkdirs: u64,
    pub mkdirs: u64,
    pub rmdirs: u64,
    pub renames: u64,
    pub t2_renames: u64,
    pub find_first: u64,
    pub find_next: u64,
    pub find_close: u64,
}

impl LegacyFields {
    /// Build from a counter list. `None` unless all 22 counters are present.
    #[must_use]
    pub fn from_counters(counters: &[u64]) -> Option<Self> {
        let &[
            smbs,
            oplock_breaks,
            reads,
            read_bytes,
            writes,
            write_bytes,
            flushes,
            locks,
            hardlinks,
            symlinks,
            opens,
            closes,
            deletes,
            posix_opens,
            posix_mkdirs,
            mkdirs,
            rmdirs,
            renames,
            t2_renames,
            find_first,
            find_next,
            find_close,
        ] = counters
        else {
            return None;
        };

        Some(Self {
            smbs,
            oplock_breaks,
            reads,
            read_bytes,
            writes,
            write_bytes,
            flushes,
            locks,
            hardlinks,
            symlinks,
            opens,
            closes,
            deletes,
            posix_opens,
            posix_mkdirs,
            mkdirs,
            rmdirs,
            renames,
            t2_renames,
            find_first,
            find_next,
            find_close,
        })
    }
}
