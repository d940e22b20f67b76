//! Text, console and JSON renderings of a [`LogForest`].
//!
//! Text layout, with one space of indent per depth level:
//!
//! ```text
//! ** (unnamed scope) **
//!  ** build **
//!    WARN: disk low
//!
//!   INFO: done
//!
//! ```

use colored::Colorize;
use std::io::{self, Write};

use super::{EntryNode, LogForest, LogNode, ScopeNode};
use crate::level::MessageLevel;

const UNNAMED_SCOPE: &str = "(unnamed scope)";

/// Full dump, every scope and entry.
pub fn write_text<W: Write>(forest: &LogForest, out: &mut W) -> io::Result<()> {
    for root in &forest.roots {
        write_scope(out, root, 0, false)?;
    }
    Ok(())
}

/// One unindented line per warning or error, in display order.
pub fn write_errors<W: Write>(forest: &LogForest, out: &mut W) -> io::Result<()> {
    for entry in forest.problems() {
        writeln!(out, "{}", entry_line(entry, 0, false))?;
    }
    Ok(())
}

/// Like [`write_text`] (or [`write_errors`]) with terminal colors: warnings
/// yellow, errors red, scope titles bold.
///
/// Colors follow `colored`'s global control (`NO_COLOR`, `CLICOLOR_FORCE`,
/// tty detection).
pub fn write_console<W: Write>(
    forest: &LogForest,
    out: &mut W,
    errors_only: bool,
) -> io::Result<()> {
    if errors_only {
        for entry in forest.problems() {
            writeln!(out, "{}", entry_line(entry, 0, true))?;
        }
        return Ok(());
    }
    for root in &forest.roots {
        write_scope(out, root, 0, true)?;
    }
    Ok(())
}

pub fn to_json(forest: &LogForest) -> serde_json::Result<String> {
    serde_json::to_string_pretty(forest)
}

/// Render to a string; see [`write_text`].
pub fn text(forest: &LogForest) -> String {
    let mut buf = Vec::new();
    // writing to a Vec cannot fail
    let _ = write_text(forest, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn errors(forest: &LogForest) -> String {
    let mut buf = Vec::new();
    let _ = write_errors(forest, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_scope<W: Write>(
    out: &mut W,
    scope: &ScopeNode,
    depth: usize,
    color: bool,
) -> io::Result<()> {
    let name = if scope.name.is_empty() {
        UNNAMED_SCOPE
    } else {
        scope.name.as_str()
    };
    let title = format!("{}** {} **", " ".repeat(depth), name);
    if color {
        writeln!(out, "{}", title.bold())?;
    } else {
        writeln!(out, "{}", title)?;
    }

    for child in &scope.children {
        match child {
            LogNode::Scope(inner) => write_scope(out, inner, depth + 1, color)?,
            LogNode::Entry(entry) => writeln!(out, "{}", entry_line(entry, depth + 1, color))?,
        }
    }

    writeln!(out)
}

fn entry_line(entry: &EntryNode, depth: usize, color: bool) -> String {
    let line = format!("{}{}: {}", " ".repeat(depth), entry.level.label(), entry.text);
    if !color {
        return line;
    }
    match entry.level {
        MessageLevel::Warning => line.yellow().to_string(),
        MessageLevel::Error => line.red().to_string(),
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ExecutionLogRows, LogEntryRow, LogScopeRow};
    use chrono::{Duration, TimeZone, Utc};

    fn sample() -> LogForest {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let rows = ExecutionLogRows {
            scopes: vec![
                LogScopeRow {
                    execution_id: 1,
                    scope_sequence: 1,
                    parent_scope_sequence: None,
                    name: String::new(),
                    start_time: t0,
                    end_time: Some(t0 + Duration::seconds(9)),
                },
                LogScopeRow {
                    execution_id: 1,
                    scope_sequence: 2,
                    parent_scope_sequence: Some(1),
                    name: "build".to_string(),
                    start_time: t0 + Duration::seconds(2),
                    end_time: Some(t0 + Duration::seconds(5)),
                },
            ],
            entries: vec![
                LogEntryRow {
                    execution_id: 1,
                    entry_sequence: 1,
                    scope_sequence: 1,
                    level: MessageLevel::Information,
                    text: "starting".to_string(),
                    timestamp: t0 + Duration::seconds(1),
                },
                LogEntryRow {
                    execution_id: 1,
                    entry_sequence: 2,
                    scope_sequence: 2,
                    level: MessageLevel::Warning,
                    text: "disk low".to_string(),
                    timestamp: t0 + Duration::seconds(3),
                },
                LogEntryRow {
                    execution_id: 1,
                    entry_sequence: 3,
                    scope_sequence: 1,
                    level: MessageLevel::Error,
                    text: "deploy failed".to_string(),
                    timestamp: t0 + Duration::seconds(6),
                },
            ],
        };
        LogForest::build(&rows)
    }

    #[test]
    fn test_text_layout() {
        let expected = "\
** (unnamed scope) **
  INFO: starting
 ** build **
   WARN: disk low

 ERROR: deploy failed

";
        assert_eq!(text(&sample()), expected);
    }

    #[test]
    fn test_errors_only() {
        assert_eq!(errors(&sample()), " WARN: disk low\nERROR: deploy failed\n");
        assert_eq!(errors(&LogForest::default()), "");
    }

    #[test]
    fn test_console_without_colors_matches_text() {
        colored::control::set_override(false);
        let forest = sample();

        let mut buf = Vec::new();
        write_console(&forest, &mut buf, false).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), text(&forest));

        let mut buf = Vec::new();
        write_console(&forest, &mut buf, true).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), errors(&forest));
    }

    #[test]
    fn test_json_is_tagged() {
        let json = to_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let root = &value["roots"][0];
        assert_eq!(root["sequence"], 1);
        assert!(root.get("parent_sequence").is_none());
        assert_eq!(root["children"][0]["kind"], "entry");
        assert_eq!(root["children"][0]["level"], "info");
        assert_eq!(root["children"][1]["kind"], "scope");
        assert_eq!(root["children"][1]["name"], "build");
    }
}
