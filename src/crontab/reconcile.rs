//! Pure transformations over crontab line sequences.
//!
//! Each function takes the current lines and an intent and returns a new
//! line sequence, or an error with nothing applied. Nothing here touches the
//! OS; installing the result is the store's job.

use super::{CrontabFormat, normalize_schedule, parse, validate_name};
use crate::{Error, Result};

/// Append a new managed block at the end of the document.
///
/// Leading blank lines are dropped; every other existing line keeps its
/// content and relative order.
pub fn add(
    lines: &[String],
    name: &str,
    schedule: &str,
    command: &str,
    format: &CrontabFormat,
) -> Result<Vec<String>> {
    validate_name(name)?;
    let schedule = normalize_schedule(schedule)?;
    let command = command.trim();
    if command.is_empty() {
        return Err(Error::EmptyCommand(name.to_string()));
    }
    if command.contains('\n') || command.contains('\r') {
        return Err(Error::InvalidInput(
            "Command must be a single line".to_string(),
        ));
    }

    let parsed = parse(lines, format);
    if parsed.find(name).is_some() {
        return Err(Error::DuplicateName(name.to_string()));
    }
    if let Some(malformed) = parsed.find_malformed(name) {
        return Err(malformed.to_error());
    }

    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let mut result = Vec::with_capacity(lines.len() - start + 2);
    result.extend_from_slice(&lines[start..]);
    result.push(format.marker_line(name));
    result.push(format!("{} {}", schedule, command));
    Ok(result)
}

/// Delete a managed block (marker and directive).
///
/// A malformed block with this name loses only its marker line; the line
/// after it is not ours and stays.
pub fn remove(lines: &[String], name: &str, format: &CrontabFormat) -> Result<Vec<String>> {
    let parsed = parse(lines, format);

    let (start, count) = if let Some(block) = parsed.find(name) {
        (block.line, 2)
    } else if let Some(malformed) = parsed.find_malformed(name) {
        (malformed.line, 1)
    } else {
        return Err(Error::NotFound(name.to_string()));
    };

    let mut result = Vec::with_capacity(lines.len() - count);
    result.extend_from_slice(&lines[..start]);
    result.extend_from_slice(&lines[start + count..]);
    Ok(result)
}

/// Enable or disable a managed block by editing only its directive line.
///
/// Already in the requested state is a no-op.
pub fn toggle(
    lines: &[String],
    name: &str,
    enable: bool,
    format: &CrontabFormat,
) -> Result<Vec<String>> {
    let parsed = parse(lines, format);
    let block = parsed.lookup(name)?;

    let index = block.line + 1;
    let directive = &lines[index];
    let mut result = lines.to_vec();

    if enable && !block.enabled {
        result[index] = format.strip_comment(directive).to_string();
    } else if !enable && block.enabled {
        result[index] = format!("{}{}", format.comment_prefix, directive);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fmt() -> CrontabFormat {
        CrontabFormat::default()
    }

    fn base() -> Vec<String> {
        lines(&["# header comment", "0 3 * * * /usr/bin/old-job"])
    }

    #[test]
    fn test_add_appends_block() {
        let result = add(
            &base(),
            "db-backup",
            "0 2 * * *",
            "pg_dump db > /backups/db.sql.gz",
            &fmt(),
        )
        .unwrap();

        assert_eq!(
            result,
            lines(&[
                "# header comment",
                "0 3 * * * /usr/bin/old-job",
                "# vexo: db-backup",
                "0 2 * * * pg_dump db > /backups/db.sql.gz",
            ])
        );
    }

    #[test]
    fn test_add_to_empty_document() {
        let result = add(&[], "a", "* * * * *", "true", &fmt()).unwrap();
        assert_eq!(result, lines(&["# vexo: a", "* * * * * true"]));
    }

    #[test]
    fn test_add_strips_only_leading_blank_lines() {
        let doc = lines(&["", "  ", "MAILTO=root", "", "0 1 * * * x"]);
        let result = add(&doc, "a", "* * * * *", "true", &fmt()).unwrap();
        assert_eq!(
            result,
            lines(&["MAILTO=root", "", "0 1 * * * x", "# vexo: a", "* * * * * true"])
        );
    }

    #[test]
    fn test_add_normalizes_schedule_whitespace() {
        let result = add(&[], "a", " 0   2 * *  * ", "  run.sh ", &fmt()).unwrap();
        assert_eq!(result[1], "0 2 * * * run.sh");
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let once = add(&base(), "db-backup", "0 2 * * *", "pg_dump db", &fmt()).unwrap();
        let err = add(&once, "db-backup", "0 4 * * *", "other", &fmt()).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(ref n) if n == "db-backup"));
    }

    #[test]
    fn test_add_duplicate_of_disabled_block_rejected() {
        let doc = lines(&["# vexo: a", "# * * * * * true"]);
        assert!(matches!(
            add(&doc, "a", "* * * * *", "true", &fmt()),
            Err(Error::DuplicateName(_))
        ));
    }

    #[test]
    fn test_add_over_malformed_marker_rejected() {
        let doc = lines(&["# vexo: a"]);
        assert!(matches!(
            add(&doc, "a", "* * * * *", "true", &fmt()),
            Err(Error::MalformedBlock { .. })
        ));
    }

    #[test]
    fn test_add_validates_input() {
        assert!(matches!(
            add(&[], "bad name", "* * * * *", "true", &fmt()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            add(&[], "a", "* * * *", "true", &fmt()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            add(&[], "y", "foo bar baz qux quux", "true", &fmt()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            add(&[], "a", "* * * * *", "   ", &fmt()),
            Err(Error::EmptyCommand(_))
        ));
        assert!(matches!(
            add(&[], "a", "* * * * *", "echo a\necho b", &fmt()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_remove_restores_document() {
        let original = base();
        let added = add(&original, "db-backup", "0 2 * * *", "pg_dump db", &fmt()).unwrap();
        assert_eq!(remove(&added, "db-backup", &fmt()).unwrap(), original);
    }

    #[test]
    fn test_remove_from_middle_keeps_order() {
        let doc = lines(&[
            "MAILTO=root",
            "# vexo: a",
            "* * * * * a",
            "# keep me",
            "# vexo: b",
            "# 0 0 * * * b",
            "0 1 * * * tail",
        ]);
        let result = remove(&doc, "a", &fmt()).unwrap();
        assert_eq!(
            result,
            lines(&[
                "MAILTO=root",
                "# keep me",
                "# vexo: b",
                "# 0 0 * * * b",
                "0 1 * * * tail",
            ])
        );
    }

    #[test]
    fn test_remove_not_found() {
        assert!(matches!(
            remove(&base(), "ghost", &fmt()),
            Err(Error::NotFound(ref n)) if n == "ghost"
        ));
    }

    #[test]
    fn test_remove_malformed_deletes_only_marker() {
        let doc = lines(&["# vexo: broken", "MAILTO=root", "0 1 * * * x"]);
        let result = remove(&doc, "broken", &fmt()).unwrap();
        assert_eq!(result, lines(&["MAILTO=root", "0 1 * * * x"]));
    }

    #[test]
    fn test_toggle_disable_and_enable() {
        let original = add(&base(), "db-backup", "0 2 * * *", "pg_dump db", &fmt()).unwrap();

        let disabled = toggle(&original, "db-backup", false, &fmt()).unwrap();
        assert_eq!(disabled[3], "# 0 2 * * * pg_dump db");
        assert_eq!(disabled[2], "# vexo: db-backup");
        assert_eq!(disabled[..2], original[..2]);

        let enabled = toggle(&disabled, "db-backup", true, &fmt()).unwrap();
        assert_eq!(enabled, original);
    }

    #[test]
    fn test_toggle_is_idempotent() {
        let doc = lines(&["# vexo: a", "* * * * * a"]);
        assert_eq!(toggle(&doc, "a", true, &fmt()).unwrap(), doc);

        let disabled = toggle(&doc, "a", false, &fmt()).unwrap();
        assert_eq!(toggle(&disabled, "a", false, &fmt()).unwrap(), disabled);
    }

    #[test]
    fn test_toggle_doubly_commented_directive_is_malformed() {
        let doc = lines(&["# vexo: a", "# # * * * * * a"]);
        // "# * * * * * a" is not a cron entry, so the block is malformed.
        assert!(matches!(
            toggle(&doc, "a", true, &fmt()),
            Err(Error::MalformedBlock { .. })
        ));
    }

    #[test]
    fn test_toggle_leaves_prose_comment_after_marker() {
        let doc = lines(&["# vexo: x", "# run the nightly report job daily"]);
        assert!(matches!(
            toggle(&doc, "x", true, &fmt()),
            Err(Error::MalformedBlock { .. })
        ));
        assert_eq!(
            remove(&doc, "x", &fmt()).unwrap(),
            lines(&["# run the nightly report job daily"])
        );
    }

    #[test]
    fn test_toggle_errors() {
        assert!(matches!(
            toggle(&base(), "ghost", true, &fmt()),
            Err(Error::NotFound(_))
        ));
        let doc = lines(&["# vexo: orphan"]);
        assert!(matches!(
            toggle(&doc, "orphan", false, &fmt()),
            Err(Error::MalformedBlock { .. })
        ));
    }

    #[test]
    fn test_end_to_end_scenario() {
        let original = base();
        let added = add(
            &original,
            "db-backup",
            "0 2 * * *",
            "pg_dump db > /backups/db.sql.gz",
            &fmt(),
        )
        .unwrap();
        assert_eq!(
            added[2..],
            lines(&[
                "# vexo: db-backup",
                "0 2 * * * pg_dump db > /backups/db.sql.gz",
            ])
        );

        let disabled = toggle(&added, "db-backup", false, &fmt()).unwrap();
        assert_eq!(
            disabled.last().unwrap(),
            "# 0 2 * * * pg_dump db > /backups/db.sql.gz"
        );

        let removed = remove(&disabled, "db-backup", &fmt()).unwrap();
        assert_eq!(removed, original);
    }
}
