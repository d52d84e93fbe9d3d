//! Map a parsed report onto gauges.
//!
//! Header counters become unlabeled gauges, block counters become gauges
//! labeled with `server` and `share`. The names follow the ones the exporter
//! has always used, `cifs_total_<counter>`.
//!
//! A block series published on one tick but absent from the next, a counter
//! lost to truncation or a share that was unmounted, is set to zero once and
//! then left to the exporter's idle timeout to drop.

use cifs_stats::{Header, Parsed, Shape};
use metrics::{describe_counter, describe_gauge, gauge};
use rustc_hash::FxHashSet;

pub(crate) const UP: &str = "cifs_exporter_up";
pub(crate) const BLOCKS: &str = "cifs_exporter_blocks";
pub(crate) const BLOCKS_SKIPPED: &str = "cifs_exporter_blocks_skipped";
pub(crate) const BLOCKS_TRUNCATED: &str = "cifs_exporter_blocks_truncated";
pub(crate) const READ_ERRORS: &str = "cifs_exporter_read_errors_total";
pub(crate) const PARSE_ERRORS: &str = "cifs_exporter_parse_errors_total";

/// Prefix of every block gauge.
const BLOCK_PREFIX: &str = "cifs_total_";

/// Header gauges: name, description and the value taken from `header`.
fn header_gauges(header: &Header) -> [(&'static str, &'static str, u64); 11] {
    [
        ("cifs_total_cifs_sessions", "Total CIFS sessions", header.cifs_sessions),
        (
            "cifs_total_unique_mount_targets",
            "Total unique mount targets",
            header.unique_mount_targets,
        ),
        ("cifs_total_requests", "Total requests", header.request_buffers),
        ("cifs_total_buffer", "Total buffer", header.request_buffer_pool_size),
        (
            "cifs_total_small_requests",
            "Total small requests",
            header.small_request_buffers,
        ),
        (
            "cifs_total_small_buffer",
            "Total small buffer",
            header.small_request_buffer_pool_size,
        ),
        ("cifs_total_op", "Total op", header.operations),
        ("cifs_total_session", "Total session", header.session_reconnects),
        (
            "cifs_total_share_reconnects",
            "Total share reconnects",
            header.share_reconnects,
        ),
        ("cifs_total_max_op", "Total max op", header.vfs_operations),
        (
            "cifs_total_at_once",
            "Total operations at once",
            header.max_vfs_operations_at_once,
        ),
    ]
}

pub(crate) fn block_gauge_name(field: &str) -> String {
    format!("{BLOCK_PREFIX}{field}")
}

/// Register descriptions for every series this module and the observer
/// emit.
pub(crate) fn describe() {
    for (name, description, _) in header_gauges(&Header::default()) {
        describe_gauge!(name, description);
    }
    for shape in [Shape::Legacy, Shape::Modern] {
        for field in shape.fields() {
            describe_gauge!(
                block_gauge_name(field),
                format!("Total {} per CIFS share", field.replace('_', " "))
            );
        }
    }
    describe_gauge!(UP, "Whether the last report was read and parsed");
    describe_gauge!(BLOCKS, "Connection blocks in the last report");
    describe_gauge!(
        BLOCKS_SKIPPED,
        "Connection blocks in the last report that matched no known layout"
    );
    describe_gauge!(
        BLOCKS_TRUNCATED,
        "Connection blocks in the last report with fewer counters than their layout"
    );
    describe_counter!(READ_ERRORS, "Failed reads of the statistics report");
    describe_counter!(PARSE_ERRORS, "Statistics reports that failed to parse");
}

/// A block series: field, server and share.
type Series = (&'static str, String, String);

fn block_labels(server: &str, share: &str) -> [(String, String); 2] {
    [
        ("server".to_string(), server.to_string()),
        ("share".to_string(), share.to_string()),
    ]
}

/// Publishes parses, remembering which block series the last one set.
#[derive(Debug, Default)]
pub(crate) struct Publisher {
    live: FxHashSet<Series>,
}

impl Publisher {
    /// Publish one parse.
    pub(crate) fn publish(&mut self, parsed: &Parsed) {
        let snapshot = &parsed.snapshot;

        for (name, _, value) in header_gauges(&snapshot.header) {
            gauge!(name).set(value as f64);
        }

        let mut live = FxHashSet::default();
        for block in &snapshot.blocks {
            let labels = block_labels(&block.server, &block.share);
            // Truncated blocks carry fewer counters than their shape names,
            // only the ones present are published.
            for (field, value) in block.named_counters() {
                gauge!(block_gauge_name(field), &labels).set(value as f64);
                live.insert((field, block.server.clone(), block.share.clone()));
            }
        }

        for (field, server, share) in self.live.difference(&live) {
            gauge!(block_gauge_name(field), &block_labels(server, share)).set(0.0);
        }
        self.live = live;

        gauge!(BLOCKS).set(snapshot.blocks.len() as f64);
        gauge!(BLOCKS_SKIPPED).set(parsed.skipped_blocks() as f64);
        gauge!(BLOCKS_TRUNCATED).set(parsed.truncated_blocks() as f64);
    }
}
