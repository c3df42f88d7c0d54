//! Crontab document model.
//!
//! A crontab is treated as an ordered sequence of opaque lines. Vexo owns
//! only its *managed blocks*: a marker line (`# vexo: <name>`) immediately
//! followed by a directive line (`<5 schedule fields> <command>`), the latter
//! optionally commented out once to mark the job disabled. Every other line
//! is foreign and is preserved verbatim in content and position.
//!
//! ```text
//! # header comment                       <- foreign
//! 0 3 * * * /usr/bin/old-job             <- foreign
//! # vexo: db-backup                      <- marker
//! # 0 2 * * * pg_dump db > /backups/x    <- directive (disabled)
//! ```
//!
//! Parsing produces a read-only projection ([`ParsedCrontab`]); all edits go
//! through the pure functions in [`reconcile`] and are installed by a
//! [`store::CrontabStore`].

pub mod reconcile;
pub mod store;

use crate::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Default literal tag written into marker lines.
pub const DEFAULT_MARKER_TAG: &str = "vexo";

/// Default line-comment prefix.
pub const DEFAULT_COMMENT_PREFIX: &str = "# ";

/// Maximum length of a job name.
pub const MAX_NAME_LEN: usize = 64;

/// Marker and comment tokens that define the managed-block grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrontabFormat {
    /// Literal tag following the comment prefix on marker lines
    pub tag: String,
    /// Prefix that comments a line out
    pub comment_prefix: String,
}

impl Default for CrontabFormat {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_TAG, DEFAULT_COMMENT_PREFIX)
    }
}

impl CrontabFormat {
    pub fn new(tag: &str, comment_prefix: &str) -> Self {
        Self {
            tag: tag.to_string(),
            comment_prefix: comment_prefix.to_string(),
        }
    }

    /// Render the marker line for a job.
    pub fn marker_line(&self, name: &str) -> String {
        format!("{}{}: {}", self.comment_prefix, self.tag, name)
    }

    /// Extract the job name if `line` is exactly a marker line.
    ///
    /// The whole line must be `<prefix><tag>: <name>` with a valid name and
    /// nothing else; near misses are foreign lines.
    pub fn marker_name<'a>(&self, line: &'a str) -> Option<&'a str> {
        let rest = line.strip_prefix(self.comment_prefix.as_str())?;
        let rest = rest.strip_prefix(self.tag.as_str())?;
        let name = rest.strip_prefix(": ")?;
        is_valid_name(name).then_some(name)
    }

    /// Whether a directive line is commented out.
    pub fn is_disabled(&self, directive: &str) -> bool {
        directive.starts_with(self.comment_prefix.as_str())
    }

    /// Directive text with one comment prefix removed, if present.
    pub fn strip_comment<'a>(&self, directive: &'a str) -> &'a str {
        directive
            .strip_prefix(self.comment_prefix.as_str())
            .unwrap_or(directive)
    }
}

/// Check a job name against the marker grammar `[A-Za-z0-9][A-Za-z0-9._-]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    name.len() <= MAX_NAME_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Validate a job name, returning `InvalidInput` with the grammar on failure.
pub fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Job name must match [A-Za-z0-9][A-Za-z0-9._-]* (max {} chars), got: '{}'",
            MAX_NAME_LEN, name
        )))
    }
}

const MONTHS: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAYS: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Label, bounds and symbolic names of each schedule field, in order.
const SCHEDULE_FIELDS: [(&str, u32, u32, &[&str]); 5] = [
    ("minute", 0, 59, &[]),
    ("hour", 0, 23, &[]),
    ("day-of-month", 1, 31, &[]),
    ("month", 1, 12, MONTHS),
    ("day-of-week", 0, 7, WEEKDAYS),
];

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.len() <= 2 && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_field_value(token: &str, min: u32, max: u32, names: &[&str]) -> bool {
    if is_number(token) {
        return token
            .parse::<u32>()
            .is_ok_and(|v| (min..=max).contains(&v));
    }
    names.iter().any(|n| n.eq_ignore_ascii_case(token))
}

/// Check one schedule field: `*`, values, ranges `a-b`, steps `/n` and
/// comma lists. Names are accepted only in the month and day-of-week fields.
fn is_schedule_field(field: &str, index: usize) -> bool {
    let Some(&(_, min, max, names)) = SCHEDULE_FIELDS.get(index) else {
        return false;
    };
    field.split(',').all(|item| {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };
        if let Some(step) = step {
            if !is_number(step) || !step.parse::<u32>().is_ok_and(|s| s > 0) {
                return false;
            }
        }
        if base == "*" {
            return true;
        }
        match base.split_once('-') {
            Some((lo, hi)) => {
                is_field_value(lo, min, max, names) && is_field_value(hi, min, max, names)
            }
            None => is_field_value(base, min, max, names),
        }
    })
}

/// Split an (uncommented) directive into its five schedule fields and command.
///
/// Returns `None` unless there are exactly five cron fields followed by a
/// non-empty command.
pub fn split_directive(text: &str) -> Option<(String, String)> {
    let mut rest = text.trim_start();
    let mut fields = Vec::with_capacity(5);
    for _ in 0..5 {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    let command = rest.trim_end();
    if command.is_empty()
        || !fields
            .iter()
            .enumerate()
            .all(|(i, f)| is_schedule_field(f, i))
    {
        return None;
    }
    Some((fields.join(" "), command.to_string()))
}

/// Normalize a user-supplied schedule to five single-space separated fields.
pub fn normalize_schedule(schedule: &str) -> Result<String> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(Error::InvalidInput(format!(
            "Schedule must have exactly 5 fields (minute hour day-of-month month day-of-week), got {}: '{}'",
            fields.len(),
            schedule
        )));
    }
    for (i, field) in fields.iter().enumerate() {
        if !is_schedule_field(field, i) {
            return Err(Error::InvalidInput(format!(
                "Invalid {} field '{}' in schedule '{}'",
                SCHEDULE_FIELDS[i].0, field, schedule
            )));
        }
    }
    Ok(fields.join(" "))
}

/// Line terminator of a crontab file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// Detect from the first terminated line; text without one is `Lf`.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(i) if text[..i].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// The full crontab text at a point in time.
///
/// Treated as an immutable value; edits produce new line sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    raw: String,
    lines: Vec<String>,
    fingerprint: String,
    line_ending: LineEnding,
}

impl Document {
    /// Build a document from raw crontab text exactly as read.
    pub fn from_text(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            lines: raw.lines().map(|l| l.to_string()).collect(),
            fingerprint: fingerprint(raw),
            line_ending: LineEnding::detect(raw),
        }
    }

    /// Build a document from lines, using the canonical rendering as raw text.
    pub fn from_lines(lines: Vec<String>) -> Self {
        let raw = render(&lines);
        Self {
            fingerprint: fingerprint(&raw),
            raw,
            lines,
            line_ending: LineEnding::Lf,
        }
    }

    pub fn empty() -> Self {
        Self::from_text("")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Raw text as read from the store.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// SHA-256 of the raw text.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Parse managed blocks out of this document.
    pub fn parse(&self, format: &CrontabFormat) -> ParsedCrontab {
        parse(&self.lines, format)
    }
}

/// Render lines as installable crontab text (trailing newline required by cron).
pub fn render(lines: &[String]) -> String {
    render_with(lines, LineEnding::Lf)
}

/// Render lines with an explicit terminator after every line.
pub fn render_with(lines: &[String], ending: LineEnding) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push_str(ending.as_str());
    }
    text
}

/// Hex SHA-256 of crontab text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One job owned by vexo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedBlock {
    pub name: String,
    /// Five schedule fields joined by single spaces
    pub schedule: String,
    pub command: String,
    pub enabled: bool,
    /// 0-based index of the marker line
    pub line: usize,
    /// Directive line exactly as stored
    pub directive: String,
}

/// A marker line without a valid directive after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedBlock {
    pub name: String,
    /// 0-based index of the marker line
    pub line: usize,
    pub reason: String,
}

impl MalformedBlock {
    pub fn to_error(&self) -> Error {
        Error::MalformedBlock {
            name: self.name.clone(),
            line: self.line + 1,
            reason: self.reason.clone(),
        }
    }
}

/// Read-only projection of a crontab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCrontab {
    pub blocks: Vec<ManagedBlock>,
    /// Foreign lines with their 0-based positions
    pub foreign: Vec<(usize, String)>,
    pub malformed: Vec<MalformedBlock>,
}

impl ParsedCrontab {
    pub fn find(&self, name: &str) -> Option<&ManagedBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn find_malformed(&self, name: &str) -> Option<&MalformedBlock> {
        self.malformed.iter().find(|m| m.name == name)
    }

    /// Look up a job for an operation that needs a well-formed block.
    pub fn lookup(&self, name: &str) -> Result<&ManagedBlock> {
        if let Some(block) = self.find(name) {
            return Ok(block);
        }
        match self.find_malformed(name) {
            Some(malformed) => Err(malformed.to_error()),
            None => Err(Error::NotFound(name.to_string())),
        }
    }
}

/// Scan lines into managed blocks, foreign lines and malformed markers.
///
/// A marker consumes the following line only when it is a valid directive;
/// otherwise the marker is reported as malformed and scanning resumes at the
/// next line, which is classified on its own.
pub fn parse(lines: &[String], format: &CrontabFormat) -> ParsedCrontab {
    let mut parsed = ParsedCrontab::default();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        let Some(name) = format.marker_name(line) else {
            parsed.foreign.push((i, line.clone()));
            i += 1;
            continue;
        };

        match read_directive(lines.get(i + 1), format) {
            Ok((schedule, command, enabled)) => {
                parsed.blocks.push(ManagedBlock {
                    name: name.to_string(),
                    schedule,
                    command,
                    enabled,
                    line: i,
                    directive: lines[i + 1].clone(),
                });
                i += 2;
            }
            Err(reason) => {
                parsed.malformed.push(MalformedBlock {
                    name: name.to_string(),
                    line: i,
                    reason,
                });
                i += 1;
            }
        }
    }

    parsed
}

fn read_directive(
    line: Option<&String>,
    format: &CrontabFormat,
) -> std::result::Result<(String, String, bool), String> {
    let line = line.ok_or_else(|| "marker is the last line of the crontab".to_string())?;
    if format.marker_name(line).is_some() {
        return Err("marker is followed by another marker".to_string());
    }
    let enabled = !format.is_disabled(line);
    let (schedule, command) = split_directive(format.strip_comment(line))
        .ok_or_else(|| format!("line after marker is not a cron entry: '{}'", line))?;
    Ok((schedule, command, enabled))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_marker_line_format() {
        let format = CrontabFormat::default();
        assert_eq!(format.marker_line("db-backup"), "# vexo: db-backup");
        assert_eq!(format.marker_name("# vexo: db-backup"), Some("db-backup"));
    }

    #[test]
    fn test_marker_requires_exact_grammar() {
        let format = CrontabFormat::default();
        assert_eq!(format.marker_name("# vexo: two words"), None);
        assert_eq!(format.marker_name("# vexo:db"), None);
        assert_eq!(format.marker_name("#vexo: db"), None);
        assert_eq!(format.marker_name("  # vexo: db"), None);
        assert_eq!(format.marker_name("# vexo: db "), None);
        assert_eq!(format.marker_name("# vexo: "), None);
        assert_eq!(format.marker_name("# vexonet: db"), None);
    }

    #[test]
    fn test_custom_format() {
        let format = CrontabFormat::new("ops", "## ");
        assert_eq!(format.marker_line("a"), "## ops: a");
        assert_eq!(format.marker_name("## ops: a"), Some("a"));
        assert_eq!(format.marker_name("# vexo: a"), None);
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("db-backup"));
        assert!(is_valid_name("a"));
        assert!(is_valid_name("job_1.v2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-leading"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("slash/name"));
        assert!(!is_valid_name(&"x".repeat(MAX_NAME_LEN + 1)));
    }

    #[test]
    fn test_split_directive() {
        let (schedule, command) = split_directive("0 2 * * * pg_dump db > /b.sql").unwrap();
        assert_eq!(schedule, "0 2 * * *");
        assert_eq!(command, "pg_dump db > /b.sql");

        let (schedule, command) = split_directive("*/5  1-5 *  JAN MON-FRI   run.sh  ").unwrap();
        assert_eq!(schedule, "*/5 1-5 * JAN MON-FRI");
        assert_eq!(command, "run.sh");
    }

    #[test]
    fn test_split_directive_rejects_incomplete() {
        assert_eq!(split_directive("0 2 * * *"), None);
        assert_eq!(split_directive("0 2 * *"), None);
        assert_eq!(split_directive("@daily backup.sh"), None);
        assert_eq!(split_directive(""), None);
    }

    #[test]
    fn test_normalize_schedule() {
        assert_eq!(normalize_schedule(" 0  2 * * * ").unwrap(), "0 2 * * *");
        assert!(matches!(
            normalize_schedule("0 2 * *"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_schedule("@daily"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_schedule("0 2 * * ?"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_schedule_field_grammar() {
        for good in [
            "0 0 1 1 0",
            "*/15 9-17 * * MON-FRI",
            "0,30 */2 1-31/3 jan,jul sun",
            "59 23 31 DEC 7",
        ] {
            assert!(normalize_schedule(good).is_ok(), "{}", good);
        }
        for bad in [
            "foo bar baz qux quux",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "MON * * * *",
            "* * * * JAN",
            "* * * MON *",
            "*/0 * * * *",
            "1,,2 * * * *",
            "1- * * * *",
        ] {
            assert!(
                matches!(normalize_schedule(bad), Err(Error::InvalidInput(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_prose_comment_after_marker_is_malformed() {
        let doc = lines(&["# vexo: x", "# run the nightly report job daily"]);
        let parsed = parse(&doc, &CrontabFormat::default());

        assert!(parsed.blocks.is_empty());
        assert_eq!(parsed.malformed.len(), 1);
        assert_eq!(parsed.malformed[0].name, "x");
        assert_eq!(
            parsed.foreign,
            vec![(1, "# run the nightly report job daily".to_string())]
        );
    }

    #[test]
    fn test_parse_mixed_document() {
        let doc = lines(&[
            "# header comment",
            "0 3 * * * /usr/bin/old-job",
            "# vexo: db-backup",
            "0 2 * * * pg_dump db > /backups/db.sql.gz",
            "",
            "# vexo: cleanup",
            "# 30 4 * * 0 find /tmp -mtime +7 -delete",
        ]);
        let parsed = parse(&doc, &CrontabFormat::default());

        assert_eq!(parsed.blocks.len(), 2);
        assert!(parsed.malformed.is_empty());

        let backup = parsed.find("db-backup").unwrap();
        assert!(backup.enabled);
        assert_eq!(backup.schedule, "0 2 * * *");
        assert_eq!(backup.command, "pg_dump db > /backups/db.sql.gz");
        assert_eq!(backup.line, 2);

        let cleanup = parsed.find("cleanup").unwrap();
        assert!(!cleanup.enabled);
        assert_eq!(cleanup.schedule, "30 4 * * 0");
        assert_eq!(cleanup.command, "find /tmp -mtime +7 -delete");
        assert_eq!(cleanup.directive, "# 30 4 * * 0 find /tmp -mtime +7 -delete");

        let foreign: Vec<usize> = parsed.foreign.iter().map(|(i, _)| *i).collect();
        assert_eq!(foreign, vec![0, 1, 4]);
    }

    #[test]
    fn test_parse_marker_at_end_is_malformed() {
        let doc = lines(&["0 3 * * * job", "# vexo: orphan"]);
        let parsed = parse(&doc, &CrontabFormat::default());

        assert!(parsed.blocks.is_empty());
        assert_eq!(parsed.malformed.len(), 1);
        assert_eq!(parsed.malformed[0].name, "orphan");
        assert_eq!(parsed.malformed[0].line, 1);
        assert!(parsed.malformed[0].reason.contains("last line"));
    }

    #[test]
    fn test_parse_marker_followed_by_foreign_line() {
        let doc = lines(&["# vexo: broken", "MAILTO=root", "# vexo: ok", "* * * * * true"]);
        let parsed = parse(&doc, &CrontabFormat::default());

        assert_eq!(parsed.malformed.len(), 1);
        assert_eq!(parsed.malformed[0].name, "broken");
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.blocks[0].name, "ok");
        // The line after a malformed marker is still classified normally.
        assert_eq!(parsed.foreign, vec![(1, "MAILTO=root".to_string())]);
    }

    #[test]
    fn test_parse_marker_followed_by_marker() {
        let doc = lines(&["# vexo: first", "# vexo: second", "0 1 * * * run"]);
        let parsed = parse(&doc, &CrontabFormat::default());

        assert_eq!(parsed.malformed.len(), 1);
        assert_eq!(parsed.malformed[0].name, "first");
        assert_eq!(parsed.find("second").unwrap().line, 1);
    }

    #[test]
    fn test_lookup_errors() {
        let doc = lines(&["# vexo: orphan"]);
        let parsed = parse(&doc, &CrontabFormat::default());

        assert!(matches!(parsed.lookup("missing"), Err(Error::NotFound(_))));
        assert!(matches!(
            parsed.lookup("orphan"),
            Err(Error::MalformedBlock { line: 1, .. })
        ));
    }

    #[test]
    fn test_document_fingerprint_tracks_raw_text() {
        let a = Document::from_text("0 1 * * * a\n");
        let b = Document::from_text("0 1 * * * a");
        assert_eq!(a.lines(), b.lines());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), Document::from_lines(a.lines().to_vec()).fingerprint());
    }

    #[test]
    fn test_line_ending_detection() {
        assert_eq!(LineEnding::detect(""), LineEnding::Lf);
        assert_eq!(LineEnding::detect("a\nb\n"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("a\r\nb\r\n"), LineEnding::CrLf);

        let doc = Document::from_text("MAILTO=root\r\n0 1 * * * x\r\n");
        assert_eq!(doc.line_ending(), LineEnding::CrLf);
        assert_eq!(doc.lines(), &lines(&["MAILTO=root", "0 1 * * * x"])[..]);
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&[]), "");
        assert_eq!(render(&lines(&["a", "b"])), "a\nb\n");
        assert_eq!(
            render_with(&lines(&["a", "b"]), LineEnding::CrLf),
            "a\r\nb\r\n"
        );
    }
}
