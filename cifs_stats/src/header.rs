//! Header scanner
//!
//! The first lines of the report hold global counters, one or two per line.
//! Each line is tried against [`TEMPLATES`] in order and the first template
//! that matches fills its fields. Lines no template recognizes are skipped,
//! kernels have added and moved header lines over time. A template is
//! selected by its literal words alone, a recognized line with a missing
//! number is malformed rather than unrecognized.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::template::{self, Capture};

/// Number of report lines, blank ones included, that make up the header.
pub const HEADER_LINES: usize = 9;

/// Header line templates, in match order.
pub(crate) const TEMPLATES: [&str; 7] = [
    "CIFS Session: {cifs_sessions}",
    "Share (unique mount targets): {unique_mount_targets}",
    "SMB Request/Response Buffer: {request_buffers} Pool size: {request_buffer_pool_size}",
    "SMB Small Req/Resp Buffer: {small_request_buffers} Pool size: {small_request_buffer_pool_size}",
    "Operations (MIDs): {operations}",
    "{session_reconnects} session {share_reconnects} share reconnects",
    "Total vfs operations: {vfs_operations} maximum at one time: {max_vfs_operations_at_once}",
];

struct LineGrammar {
    regex: Regex,
    fields: Vec<&'static str>,
}

static GRAMMARS: Lazy<Vec<LineGrammar>> = Lazy::new(|| {
    TEMPLATES
        .iter()
        .map(|&tmpl| {
            let compiled = template::compile_line(tmpl, Capture::Optional);
            LineGrammar {
                regex: Regex::new(&format!("^[ \t]*{}", compiled.source))
                    .expect("header template must compile"),
                fields: compiled.fields,
            }
        })
        .collect()
});

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors produced while scanning the header
pub enum Error {
    /// A line matched a template's literal text but a captured token is not
    /// a non-negative 64-bit integer.
    #[error("header field {field} malformed, token '{token}' in line: {line}")]
    HeaderFieldMalformed {
        /// Header field the token was meant for
        field: &'static str,
        /// The token that failed to convert
        token: String,
        /// The full offending line
        line: String,
    },
}

/// Global counters from the top of the report. Absent lines leave their
/// fields at zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Header {
    /// Open CIFS sessions
    pub cifs_sessions: u64,
    /// Unique mount targets
    pub unique_mount_targets: u64,
    /// Request/response buffers in use
    pub request_buffers: u64,
    /// Request/response buffer pool size
    pub request_buffer_pool_size: u64,
    /// Small request/response buffers in use
    pub small_request_buffers: u64,
    /// Small request/response buffer pool size
    pub small_request_buffer_pool_size: u64,
    /// Operations (MIDs) in flight
    pub operations: u64,
    /// Session reconnects
    pub session_reconnects: u64,
    /// Share reconnects
    pub share_reconnects: u64,
    /// Total VFS operations
    pub vfs_operations: u64,
    /// Maximum VFS operations at one time
    pub max_vfs_operations_at_once: u64,
}

impl Header {
    /// Scan one header line, filling whichever fields its template names.
    ///
    /// Returns `Ok(false)` when no template recognizes the line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderFieldMalformed`] if the line matches a template
    /// but one of its numeric tokens is missing or does not convert to `u64`.
    /// A missing token is reported as the empty string.
    pub fn scan_line(&mut self, line: &str) -> Result<bool, Error> {
        let Some((grammar, caps)) = GRAMMARS
            .iter()
            .find_map(|g| g.regex.captures(line).map(|caps| (g, caps)))
        else {
            return Ok(false);
        };

        // Convert every capture before writing any so a malformed line never
        // leaves the header half updated.
        let mut values = Vec::with_capacity(grammar.fields.len());
        for &field in &grammar.fields {
            let token = caps.name(field).map_or("", |m| m.as_str());
            let value = token
                .parse::<u64>()
                .map_err(|_| Error::HeaderFieldMalformed {
                    field,
                    token: token.to_string(),
                    line: line.to_string(),
                })?;
            values.push((field, value));
        }
        for (field, value) in values {
            *self.slot(field) = value;
        }

        Ok(true)
    }

    fn slot(&mut self, field: &str) -> &mut u64 {
        match field {
            "cifs_sessions" => &mut self.cifs_sessions,
            "unique_mount_targets" => &mut self.unique_mount_targets,
            "request_buffers" => &mut self.request_buffers,
            "request_buffer_pool_size" => &mut self.request_buffer_pool_size,
            "small_request_buffers" => &mut self.small_request_buffers,
            "small_request_buffer_pool_size" => &mut self.small_request_buffer_pool_size,
            "operations" => &mut self.operations,
            "session_reconnects" => &mut self.session_reconnects,
            "share_reconnects" => &mut self.share_reconnects,
            "vfs_operations" => &mut self.vfs_operations,
            "max_vfs_operations_at_once" => &mut self.max_vfs_operations_at_once,
            unknown => unreachable!("header template names unknown field {unknown}"),
        }
    }
}
