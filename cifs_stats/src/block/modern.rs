//! SMB2/SMB3 connection block
//!
//! One `SMBs:` line followed by a `sent`/`failed` pair per command.

use serde::Serialize;

/// Counter lines following the identity line.
pub(crate) const LINES: [&str; 20] = [
    "SMBs: {smbs}",
    "Negotiates: {negotiates_sent} sent {negotiates_failed} failed",
    "SessionSetups: {session_setups_sent} sent {session_setups_failed} failed",
    "Logoffs: {logoffs_sent} sent {logoffs_failed} failed",
    "TreeConnects: {tree_connects_sent} sent {tree_connects_failed} failed",
    "TreeDisconnects: {tree_disconnects_sent} sent {tree_disconnects_failed} failed",
    "Creates: {creates_sent} sent {creates_failed} failed",
    "Closes: {closes_sent} sent {closes_failed} failed",
    "Flushes: {flushes_sent} sent {flushes_failed} failed",
    "Reads: {reads_sent} sent {reads_failed} failed",
    "Writes: {writes_sent} sent {writes_failed} failed",
    "Locks: {locks_sent} sent {locks_failed} failed",
    "IOCTLs: {ioctls_sent} sent {ioctls_failed} failed",
    "Cancels: {cancels_sent} sent {cancels_failed} failed",
    "Echos: {echos_sent} sent {echos_failed} failed",
    "QueryDirectories: {query_directories_sent} sent {query_directories_failed} failed",
    "ChangeNotifies: {change_notifies_sent} sent {change_notifies_failed} failed",
    "QueryInfos: {query_infos_sent} sent {query_infos_failed} failed",
    "SetInfos: {set_infos_sent} sent {set_infos_failed} failed",
    "OplockBreaks: {oplock_breaks_sent} sent {oplock_breaks_failed} failed",
];

/// Counter names in report order.
pub const FIELDS: [&str; 39] = [
    "smbs",
    "negotiates_sent",
    "negotiates_failed",
    "session_setups_sent",
    "session_setups_failed",
    "logoffs_sent",
    "logoffs_failed",
    "tree_connects_sent",
    "tree_connects_failed",
    "tree_disconnects_sent",
    "tree_disconnects_failed",
    "creates_sent",
    "creates_failed",
    "closes_sent",
    "closes_failed",
    "flushes_sent",
    "flushes_failed",
    "reads_sent",
    "reads_failed",
    "writes_sent",
    "writes_failed",
    "locks_sent",
    "locks_failed",
    "ioctls_sent",
    "ioctls_failed",
    "cancels_sent",
    "cancels_failed",
    "echos_sent",
    "echos_failed",
    "query_directories_sent",
    "query_directories_failed",
    "change_notifies_sent",
    "change_notifies_failed",
    "query_infos_sent",
    "query_infos_failed",
    "set_infos_sent",
    "set_infos_failed",
    "oplock_breaks_sent",
    "oplock_breaks_failed",
];

/// Requests of one command sent, and how many of them failed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Exchange {
    /// Requests sent
    pub sent: u64,
    /// Requests that failed
    pub failed: u64,
}

/// Named view of a complete SMB2/SMB3 block.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModernFields {
    pub smbs: u64,
    pub negotiates: Exchange,
    pub session_setups: Exchange,
    pub logoffs: Exchange,
    pub tree_connects: Exchange,
    pub tree_disconnects: Exchange,
    pub creates: Exchange,
    pub closes: Exchange,
    pub flushes: Exchange,
    pub reads: Exchange,
    pub writes: Exchange,
    pub locks: Exchange,
    pub ioctls: Exchange,
    pub cancels: Exchange,
    pub echos: Exchange,
    pub query_directories: Exchange,
    pub change_notifies: Exchange,
    pub query_infos: Exchange,
    pub set_infos: Exchange,
    pub oplock_breaks: Exchange,
}

impl ModernFields {
    /// Build from a counter list. `None` unless all 39 counters are present.
    #[must_use]
    pub fn from_counters(counters: &[u64]) -> Option<Self> {
        let (&smbs, rest) = counters.split_first()?;
        if counters.len() != FIELDS.len() {
            return None;
        }
        let mut pairs = rest.chunks_exact(2).map(|pair| Exchange {
            sent: pair[0],
            failed: pair[1],
        });
        let mut next = || pairs.next().unwrap_or_default();

        Some(Self {
            smbs,
            negotiates: next(),
            session_setups: next(),
            logoffs: next(),
            tree_connects: next(),
            tree_disconnects: next(),
            creates: next(),
            closes: next(),
            flushes: next(),
            reads: next(),
            writes: next(),
            locks: next(),
            ioctls: next(),
            cancels: next(),
            echos: next(),
            query_directories: next(),
            change_notifies: next(),
            query_infos: next(),
            set_infos: next(),
            oplock_breaks: next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template;

    #[test]
    fn line_placeholders_follow_field_order() {
        assert_eq!(template::compile_lines(&LINES).fields, FIELDS);
    }

    #[test]
    fn exchanges_pair_sent_with_failed() {
        let counters: Vec<u64> = (0..39).collect();
        let fields = ModernFields::from_counters(&counters).expect("39 counters");
        assert_eq!(fields.smbs, 0);
        assert_eq!(fields.negotiates, Exchange { sent: 1, failed: 2 });
        assert_eq!(fields.reads, Exchange { sent: 17, failed: 18 });
        assert_eq!(fields.oplock_breaks, Exchange { sent: 37, failed: 38 });

        assert_eq!(ModernFields::from_counters(&counters[..38]), None);
        assert_eq!(ModernFields::from_counters(&[]), None);
    }
}
