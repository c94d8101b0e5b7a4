//! Row transcoders.
//!
//! Each submodule decodes one legacy row shape into a typed struct and turns
//! it into the parameter list of a target statement. Transcoders never touch
//! a store; id translation uses maps built beforehand by [`crate::resolve`].

pub mod junction;
pub mod person;
pub mod refs;
pub mod title;

use crate::core::SqlValue;

/// Result of transcoding one source row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Parameters for the table's write statement.
    Write(Vec<SqlValue>),
    /// Recoverable condition; the row is counted under this category and dropped.
    Skip(&'static str),
}

/// Trim optional text; blank becomes `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// First maximal run of ASCII digits, e.g. "Season 12B" -> 12.
pub fn season_number(raw: Option<&str>) -> Option<i64> {
    let s = raw?;
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let run = &s[start..];
    let end = run
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(run.len());
    run[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_number() {
        assert_eq!(season_number(Some("Season 12B")), Some(12));
        assert_eq!(season_number(Some("S1E4")), Some(1));
        assert_eq!(season_number(Some("7")), Some(7));
        assert_eq!(season_number(Some("TBD")), None);
        assert_eq!(season_number(Some("")), None);
        assert_eq!(season_number(None), None);
    }

    #[test]
    fn test_season_number_overflow_is_omitted() {
        assert_eq!(season_number(Some("99999999999999999999999")), None);
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  a b ".into())), Some("a b".into()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
