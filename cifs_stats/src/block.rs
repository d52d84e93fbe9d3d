//! Block extractor
//!
//! Everything after the header is a sequence of per-share blocks, each
//! opened by an identity line `<id>) \\<server><share>`. A block comes in one
//! of two shapes, SMB1 ([`legacy`]) or SMB2/3 ([`modern`]), and nothing but
//! the counter lines themselves tell them apart.
//!
//! The remainder of the report is cut at every line that opens like an
//! identity line. Each piece is offered to the shape grammars in order and the
//! first grammar that matches the whole piece wins. A piece no grammar
//! accepts is dropped and reported, it never fails the parse.

pub mod legacy;
pub mod modern;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::template;

pub use legacy::LegacyFields;
pub use modern::{Exchange, ModernFields};

/// Start of anything that looks like a block identity line.
static BLOCK_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[0-9]+\) \\\\").expect("block start regex must compile"));

/// Identity line captures, shared by every shape.
const IDENTITY: &str = r"(?P<id>[0-9]+)\) \\\\(?P<server>[A-Za-z0-9.-]+)(?P<share>[^\r\n]+)";

/// Shape grammars in the order they are tried.
static GRAMMARS: Lazy<[Grammar; 2]> = Lazy::new(|| {
    [
        Grammar::new(Shape::Legacy, &legacy::LINES),
        Grammar::new(Shape::Modern, &modern::LINES),
    ]
});

/// Which field layout a block uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// SMB1 layout, 22 counters
    Legacy,
    /// SMB2/SMB3 layout, 39 counters
    Modern,
}

impl Shape {
    /// Counter names of this shape, in report order.
    #[must_use]
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Shape::Legacy => &legacy::FIELDS,
            Shape::Modern => &modern::FIELDS,
        }
    }

    /// Number of counters a complete block of this shape carries.
    #[must_use]
    pub fn field_count(self) -> usize {
        self.fields().len()
    }
}

/// Named view of a complete block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fields {
    /// SMB1 counters
    Legacy(LegacyFields),
    /// SMB2/SMB3 counters
    Modern(ModernFields),
}

/// One server/share pairing and its counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionBlock {
    /// Block number as printed by the kernel. An identity line whose number
    /// does not fit a `u64` is not an identity line, the block is skipped as
    /// unmatched.
    pub id: u64,
    /// Server name, without the leading `\\`
    pub server: String,
    /// Share, including its leading separator
    pub share: String,
    /// Field layout of `counters`
    pub shape: Shape,
    /// Counters in the order of [`Shape::fields`]. Shorter than
    /// [`Shape::field_count`] when the block was truncated.
    pub counters: Vec<u64>,
}

impl ConnectionBlock {
    /// Whether every counter of the shape is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.counters.len() == self.shape.field_count()
    }

    /// Counters paired with their names. Only counters actually present are
    /// yielded, so this is safe on truncated blocks.
    pub fn named_counters(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.shape
            .fields()
            .iter()
            .copied()
            .zip(self.counters.iter().copied())
    }

    /// Look up a counter by name.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.named_counters()
            .find_map(|(field, value)| (field == name).then_some(value))
    }

    /// Named view of the counters, `None` if the block is truncated.
    #[must_use]
    pub fn fields(&self) -> Option<Fields> {
        match self.shape {
            Shape::Legacy => LegacyFields::from_counters(&self.counters).map(Fields::Legacy),
            Shape::Modern => ModernFields::from_counters(&self.counters).map(Fields::Modern),
        }
    }
}

/// Recoverable conditions met while extracting blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    /// An identity line was found but the block matched no shape. The block
    /// was dropped.
    BlockIdentityUnmatched {
        /// The identity line as it appears in the report
        line: String,
    },
    /// A counter failed to convert. The block was kept with the counters
    /// before it.
    BlockFieldTruncated {
        /// Server of the truncated block
        server: String,
        /// Share of the truncated block
        share: String,
        /// Shape of the truncated block
        shape: Shape,
        /// Name of the first counter that failed to convert
        field: &'static str,
        /// Counters kept
        kept: usize,
    },
}

/// A shape's compiled grammar.
#[derive(Debug)]
struct Grammar {
    shape: Shape,
    regex: Regex,
}

impl Grammar {
    fn new(shape: Shape, lines: &[&'static str]) -> Self {
        let body = template::compile_lines(lines);
        debug_assert_eq!(body.fields, shape.fields());
        let source = format!(r"\A{IDENTITY}[ \t]*\r?\n{}", body.source);
        Self {
            shape,
            regex: Regex::new(&source).expect("shape grammar must compile"),
        }
    }

    /// Match `text`, one block's worth of report, against this grammar.
    fn extract(&self, text: &str) -> Option<(ConnectionBlock, Option<Warning>)> {
        let caps = self.regex.captures(text)?;
        // Identity is part of the shape: an id out of range matches nothing.
        let id = caps["id"].parse::<u64>().ok()?;
        let server = caps["server"].to_string();
        let share = caps["share"].to_string();

        let mut counters = Vec::with_capacity(self.shape.field_count());
        let mut warning = None;
        for &field in self.shape.fields() {
            match caps[field].parse::<u64>() {
                Ok(value) => counters.push(value),
                Err(_) => {
                    warning = Some(Warning::BlockFieldTruncated {
                        server: server.clone(),
                        share: share.clone(),
                        shape: self.shape,
                        field,
                        kept: counters.len(),
                    });
                    break;
                }
            }
        }

        let block = ConnectionBlock {
            id,
            server,
            share,
            shape: self.shape,
            counters,
        };
        Some((block, warning))
    }
}

/// Offer one block's text to each shape in turn.
///
/// Returns `None` if no shape accepts it. A returned block may be truncated,
/// in which case the accompanying warning says where.
#[must_use]
pub fn extract(text: &str) -> Option<(ConnectionBlock, Option<Warning>)> {
    GRAMMARS.iter().find_map(|grammar| grammar.extract(text))
}

/// Split `remainder` at identity lines, yielding each block's text in report
/// order. Text ahead of the first identity line is not part of any block.
fn block_texts(remainder: &str) -> Vec<&str> {
    let mut texts = Vec::new();
    let mut starts = BLOCK_START.find_iter(remainder).map(|m| m.start());

    if let Some(mut start) = starts.next() {
        for next in starts {
            texts.push(&remainder[start..next]);
            start = next;
        }
        texts.push(&remainder[start..]);
    }

    texts
}

/// Whether `line` opens like a block identity line.
pub(crate) fn is_block_start(line: &str) -> bool {
    BLOCK_START.is_match(line)
}

/// Extract every block from the text following the header.
pub(crate) fn extract_all(remainder: &str, warnings: &mut Vec<Warning>) -> Vec<ConnectionBlock> {
    let mut blocks = Vec::new();

    for text in block_texts(remainder) {
        if let Some((block, warning)) = extract(text) {
            debug!(
                server = block.server.as_str(),
                share = block.share.as_str(),
                shape = ?block.shape,
                counters = block.counters.len(),
                "extracted block"
            );
            warnings.extend(warning);
            blocks.push(block);
        } else {
            let line = text.lines().next().unwrap_or_default().to_string();
            debug!(line = line.as_str(), "block matched no shape");
            warnings.push(Warning::BlockIdentityUnmatched { line });
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const LEGACY_BLOCK: &str = r"1) \\SRV1\share1
SMBs: 10 Oplocks breaks: 2
Reads:  100 Bytes: 5000
Writes: 50 Bytes: 8000
Flushes: 3
Locks: 0 HardLinks: 0 Symlinks: 0
Opens: 20 Closes: 18 Deletes: 1
Posix Opens: 0 Posix Mkdirs: 0
Mkdirs: 0 Rmdirs: 0
Renames: 2 T2 Renames 0
FindFirst: 1 FNext 1 FClose 1
";

    const MODERN_BLOCK: &str = r"2) \\fileserver.example.com\projects
SMBs: 9
Negotiates: 0 sent 0 failed
SessionSetups: 1 sent 0 failed
Logoffs: 0 sent 0 failed
TreeConnects: 1 sent 0 failed
TreeDisconnects: 0 sent 0 failed
Creates: 12 sent 2 failed
Closes: 10 sent 0 failed
Flushes: 0 sent 0 failed
Reads: 4 sent 0 failed
Writes: 3 sent 0 failed
Locks: 0 sent 0 failed
IOCTLs: 1 sent 1 failed
Cancels: 0 sent 0 failed
Echos: 0 sent 0 failed
QueryDirectories: 2 sent 0 failed
ChangeNotifies: 0 sent 0 failed
QueryInfos: 5 sent 0 failed
SetInfos: 0 sent 0 failed
OplockBreaks: 0 sent 0 failed
";

    /// Render a block of `shape` with the given counter tokens.
    fn render(shape: Shape, id: u64, server: &str, share: &str, tokens: &[String]) -> String {
        let lines: &[&str] = match shape {
            Shape::Legacy => &legacy::LINES,
            Shape::Modern => &modern::LINES,
        };
        let mut tokens = tokens.iter();
        let mut out = format!("{id}) \\\\{server}{share}\n");
        for line in lines {
            let rendered: Vec<String> = line
                .split_ascii_whitespace()
                .map(|t| {
                    if t.starts_with('{') {
                        tokens.next().expect("enough tokens").clone()
                    } else {
                        t.to_string()
                    }
                })
                .collect();
            out.push_str(&rendered.join(" "));
            out.push('\n');
        }
        out
    }

    #[test]
    fn legacy_block_all_fields() {
        let (block, warning) = extract(LEGACY_BLOCK).expect("legacy block matches");
        assert_eq!(warning, None);
        assert_eq!(
            block,
            ConnectionBlock {
                id: 1,
                server: "SRV1".to_string(),
                share: r"\share1".to_string(),
                shape: Shape::Legacy,
                counters: vec![
                    10, 2, 100, 5000, 50, 8000, 3, 0, 0, 0, 20, 18, 1, 0, 0, 0, 0, 2, 0, 1, 1, 1
                ],
            }
        );
        assert!(block.is_complete());
        assert_eq!(block.counter("write_bytes"), Some(8000));

        let Some(Fields::Legacy(fields)) = block.fields() else {
            panic!("expected legacy fields");
        };
        assert_eq!(fields.opens, 20);
        assert_eq!(fields.closes, 18);
    }

    #[test]
    fn legacy_block_truncated_at_last_field() {
        let text = LEGACY_BLOCK.replace("FClose 1", "FClose n/a");
        let (block, warning) = extract(&text).expect("legacy block still matches");

        assert_eq!(block.shape, Shape::Legacy);
        assert_eq!(block.counters.len(), 21);
        assert!(!block.is_complete());
        assert_eq!(block.fields(), None);
        assert_eq!(block.counter("find_next"), Some(1));
        assert_eq!(block.counter("find_close"), None);
        assert_eq!(
            warning,
            Some(Warning::BlockFieldTruncated {
                server: "SRV1".to_string(),
                share: r"\share1".to_string(),
                shape: Shape::Legacy,
                field: "find_close",
                kept: 21,
            })
        );
    }

    #[test]
    fn truncation_stops_at_first_bad_field() {
        let text = LEGACY_BLOCK.replace("Flushes: 3", "Flushes: 3x");
        let (block, _) = extract(&text).expect("legacy block matches");
        assert_eq!(block.counters, vec![10, 2, 100, 5000, 50, 8000]);
        assert_eq!(block.named_counters().count(), 6);
    }

    #[test]
    fn overflowing_counter_truncates() {
        let text = MODERN_BLOCK.replace("SMBs: 9", "SMBs: 99999999999999999999");
        let (block, warning) = extract(&text).expect("modern block matches");
        assert_eq!(block.shape, Shape::Modern);
        assert!(block.counters.is_empty());
        assert!(matches!(
            warning,
            Some(Warning::BlockFieldTruncated { field: "smbs", kept: 0, .. })
        ));
    }

    #[test]
    fn modern_block_all_fields() {
        let (block, warning) = extract(MODERN_BLOCK).expect("modern block matches");
        assert_eq!(warning, None);
        assert_eq!(block.id, 2);
        assert_eq!(block.server, "fileserver.example.com");
        assert_eq!(block.share, r"\projects");
        assert_eq!(block.shape, Shape::Modern);
        assert_eq!(block.counters.len(), 39);

        let Some(Fields::Modern(fields)) = block.fields() else {
            panic!("expected modern fields");
        };
        assert_eq!(fields.smbs, 9);
        assert_eq!(fields.creates, Exchange { sent: 12, failed: 2 });
        assert_eq!(fields.ioctls, Exchange { sent: 1, failed: 1 });
        assert_eq!(fields.query_infos.sent, 5);
    }

    #[test]
    fn share_is_kept_verbatim() {
        let text = LEGACY_BLOCK.replace(r"\\SRV1\share1", r"\\10.0.0.7\data\sub dir  ");
        let (block, _) = extract(&text).expect("block matches");
        assert_eq!(block.server, "10.0.0.7");
        assert_eq!(block.share, r"\data\sub dir  ");
    }

    #[test]
    fn crlf_line_endings() {
        let text = MODERN_BLOCK.replace('\n', "\r\n");
        let (block, warning) = extract(&text).expect("block matches");
        assert_eq!(warning, None);
        assert_eq!(block.share, r"\projects");
        assert!(block.is_complete());
    }

    #[test]
    fn out_of_range_id_is_unmatched() {
        let text = LEGACY_BLOCK.replacen("1)", "18446744073709551616)", 1);
        assert_eq!(extract(&text), None);

        let mut warnings = Vec::new();
        assert!(extract_all(&text, &mut warnings).is_empty());
        assert_eq!(
            warnings,
            vec![Warning::BlockIdentityUnmatched {
                line: r"18446744073709551616) \\SRV1\share1".to_string()
            }]
        );

        let text = LEGACY_BLOCK.replacen("1)", "18446744073709551615)", 1);
        let (block, _) = extract(&text).expect("largest id still matches");
        assert_eq!(block.id, u64::MAX);
    }

    #[test]
    fn missing_counter_line_matches_no_shape() {
        let text = LEGACY_BLOCK.replace("Flushes: 3\n", "");
        assert_eq!(extract(&text), None);
    }

    #[test]
    fn server_with_invalid_character_matches_no_shape() {
        let text = LEGACY_BLOCK.replace("SRV1", "SRV_1");
        assert_eq!(extract(&text), None);
    }

    #[test]
    fn extract_all_keeps_order_and_reports_unmatched() {
        let broken = "3) \\\\SRV3\\gone\nSMBs: 1\n";
        let remainder = format!("Max requests in flight: 2\n{LEGACY_BLOCK}{broken}\n{MODERN_BLOCK}");
        let mut warnings = Vec::new();
        let blocks = extract_all(&remainder, &mut warnings);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].shape, Shape::Legacy);
        assert_eq!(blocks[0].counters.len(), 22);
        assert_eq!(blocks[1].shape, Shape::Modern);
        assert_eq!(blocks[1].counters.len(), 39);
        assert_eq!(
            warnings,
            vec![Warning::BlockIdentityUnmatched {
                line: r"3) \\SRV3\gone".to_string()
            }]
        );
    }

    #[test]
    fn empty_remainder_has_no_blocks() {
        let mut warnings = Vec::new();
        assert!(extract_all("", &mut warnings).is_empty());
        assert!(extract_all("\n\nMax requests in flight: 0\n", &mut warnings).is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn grammars_are_tried_in_shape_order() {
        let shapes: Vec<Shape> = GRAMMARS.iter().map(|g| g.shape).collect();
        assert_eq!(shapes, vec![Shape::Legacy, Shape::Modern]);
    }

    fn shape_strategy() -> impl Strategy<Value = Shape> {
        prop_oneof![Just(Shape::Legacy), Just(Shape::Modern)]
    }

    proptest! {
        #[test]
        fn shapes_are_mutually_exclusive(
            shape in shape_strategy(),
            values in prop::collection::vec(any::<u64>(), 39),
            server in "[A-Za-z0-9][A-Za-z0-9.-]{0,20}",
            share in r"\\[a-z0-9$ ]{1,20}",
        ) {
            let tokens: Vec<String> = values.iter().map(u64::to_string).collect();
            let text = render(shape, 1, &server, &share, &tokens);

            let accepting: Vec<Shape> = GRAMMARS
                .iter()
                .filter(|g| g.regex.is_match(&text))
                .map(|g| g.shape)
                .collect();
            prop_assert_eq!(accepting, vec![shape]);

            let (block, warning) = extract(&text).expect("rendered block matches");
            prop_assert_eq!(warning, None);
            prop_assert_eq!(block.shape, shape);
            prop_assert_eq!(&block.server, &server);
            prop_assert_eq!(&block.share, &share);
            prop_assert_eq!(&block.counters[..], &values[..shape.field_count()]);
        }

        #[test]
        fn bad_token_truncates_to_its_position(
            shape in shape_strategy(),
            values in prop::collection::vec(any::<u64>(), 39),
            bad in 0usize..39,
        ) {
            let bad = bad % shape.field_count();
            let mut tokens: Vec<String> = values.iter().map(u64::to_string).collect();
            tokens[bad] = "-".to_string();
            let text = render(shape, 7, "srv", r"\share", &tokens);

            let (block, warning) = extract(&text).expect("rendered block matches");
            prop_assert_eq!(block.shape, shape);
            prop_assert_eq!(block.counters.len(), bad);
            prop_assert!(block.counters.len() <= shape.field_count());
            let is_truncated = matches!(warning, Some(Warning::BlockFieldTruncated { kept, .. }) if kept == bad);
            prop_assert!(is_truncated);
        }
    }
}
