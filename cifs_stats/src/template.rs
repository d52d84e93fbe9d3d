//! Line templates
//!
//! The report is written by `seq_printf` calls in the kernel and every
//! counter line is a handful of literal words with numbers in between. We
//! describe those lines with a small notation, `"Reads: {reads} Bytes:
//! {read_bytes}"`, and compile them into regular expressions with one named
//! capture per `{placeholder}`. Literal tokens are matched exactly, runs of
//! blanks between tokens are flexible and a placeholder captures a single
//! whitespace-free token. Conversion of the captured token is left to the
//! caller so that "the text is there but it isn't a number" can be told
//! apart from "the text isn't there".
//!
//! With [`Capture::Optional`] the literal words alone select a line and a
//! missing token leaves its capture unset, so the caller can reject a line
//! like `"CIFS Session:"` instead of never seeing it.

/// Regex fragment separating two tokens on the same line.
const BLANKS: &str = r"[ \t]+";
/// Regex fragment ending one line and starting the next.
const LINE_BREAK: &str = r"[ \t]*\r?\n";

/// How placeholders take part in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capture {
    /// The line matches only when every placeholder has a token.
    Required,
    /// The line matches on its literal words, placeholders may be absent.
    Optional,
}

/// A compiled template: its regex source and the placeholder names in the
/// order they appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Compiled {
    pub(crate) source: String,
    pub(crate) fields: Vec<&'static str>,
}

/// Compile one line template into a regex fragment. The fragment is not
/// anchored.
pub(crate) fn compile_line(template: &'static str, capture: Capture) -> Compiled {
    let mut source = String::with_capacity(template.len() * 2);
    let mut fields = Vec::new();
    // An optional leading placeholder carries its own trailing blanks.
    let mut separated = false;

    for (idx, token) in template.split_ascii_whitespace().enumerate() {
        let sep = if idx > 0 && !separated { BLANKS } else { "" };
        separated = false;
        match (placeholder(token), capture) {
            (Some(name), Capture::Required) => {
                source.push_str(sep);
                source.push_str(&format!(r"(?P<{name}>\S+)"));
                fields.push(name);
            }
            (Some(name), Capture::Optional) if idx == 0 => {
                source.push_str(&format!(r"(?:(?P<{name}>\S+){BLANKS})?"));
                separated = true;
                fields.push(name);
            }
            (Some(name), Capture::Optional) => {
                source.push_str(&format!(r"(?:{sep}(?P<{name}>\S+))?"));
                fields.push(name);
            }
            (None, _) => {
                source.push_str(sep);
                source.push_str(&regex::escape(token));
            }
        }
    }

    Compiled { source, fields }
}

/// Compile consecutive line templates into one fragment matching them on
/// consecutive lines.
pub(crate) fn compile_lines(templates: &[&'static str]) -> Compiled {
    let mut source = String::new();
    let mut fields = Vec::new();

    for (idx, template) in templates.iter().copied().enumerate() {
        if idx > 0 {
            source.push_str(LINE_BREAK);
        }
        let line = compile_line(template, Capture::Required);
        source.push_str(&line.source);
        fields.extend(line.fields);
    }

    Compiled { source, fields }
}

fn placeholder(token: &'static str) -> Option<&'static str> {
    token.strip_prefix('{')?.strip_suffix('}')
}
