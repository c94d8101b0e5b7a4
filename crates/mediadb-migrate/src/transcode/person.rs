//! `"Tables"."CastTable"` -> `person`.
//!
//! The legacy CastID is reused as `person.id`. Reference tables get fresh ids
//! matched by name; persons and titles keep their legacy ids so that
//! junctions and parent links can use them verbatim.

use crate::core::{Row, SqlValue};
use crate::error::Result;

/// One legacy cast row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyPerson {
    pub cast_id: i64,
    pub name: Option<String>,
    pub is_director: Option<bool>,
    pub is_writer: Option<bool>,
    pub is_character: Option<bool>,
}

impl LegacyPerson {
    /// Decode `CastID, CastName, IsDirector, IsWriter, IsCharacter`.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            cast_id: row.i64(0, "CastID")?,
            name: row.opt_text(1, "CastName")?,
            is_director: row.opt_bool(2, "IsDirector")?,
            is_writer: row.opt_bool(3, "IsWriter")?,
            is_character: row.opt_bool(4, "IsCharacter")?,
        })
    }
}

/// Target `person` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonRow {
    pub id: i64,
    pub name: String,
    pub primary_profession: String,
}

impl PersonRow {
    /// Parameters for `(id, name, primary_profession)`.
    pub fn into_params(self) -> Vec<SqlValue> {
        vec![
            SqlValue::I64(self.id),
            SqlValue::Text(self.name),
            SqlValue::Text(self.primary_profession),
        ]
    }
}

impl From<LegacyPerson> for PersonRow {
    fn from(p: LegacyPerson) -> Self {
        PersonRow {
            id: p.cast_id,
            name: p.name.unwrap_or_default(),
            primary_profession: profession(
                p.is_director.unwrap_or(false),
                p.is_writer.unwrap_or(false),
                p.is_character.unwrap_or(false),
            ),
        }
    }
}

/// Comma-joined labels, always in director, writer, actor order.
pub fn profession(director: bool, writer: bool, character: bool) -> String {
    [(director, "director"), (writer, "writer"), (character, "actor")]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, label)| *label)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profession_order() {
        assert_eq!(profession(true, true, false), "director,writer");
        assert_eq!(profession(false, true, true), "writer,actor");
        assert_eq!(profession(true, true, true), "director,writer,actor");
        assert_eq!(profession(false, false, false), "");
    }

    #[test]
    fn test_person_keeps_legacy_id() {
        let row = Row::new(vec![
            SqlValue::I32(42),
            "Jane Doe".into(),
            SqlValue::Null,
            SqlValue::Bool(true),
            SqlValue::Bool(true),
        ]);
        let person = PersonRow::from(LegacyPerson::from_row(&row).unwrap());
        assert_eq!(person.id, 42);
        assert_eq!(person.primary_profession, "writer,actor");
    }

    #[test]
    fn test_null_person_fields_get_defaults() {
        let row = Row::new(vec![
            SqlValue::I64(1),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
        ]);
        let params = PersonRow::from(LegacyPerson::from_row(&row).unwrap()).into_params();
        assert!(params.iter().all(|v| !v.is_null()));
    }
}
