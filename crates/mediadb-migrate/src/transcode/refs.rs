//! `"References".*Ref` -> `*_ref` lookup tables.
//!
//! Reference rows get fresh surrogate ids in the target and are matched by
//! name, so only the natural key and code columns are carried.

use super::non_blank;
use crate::core::{Row, SqlValue};
use crate::error::Result;

/// Trimmed name of a `(id, name)` legacy reference row; `None` when blank.
pub fn reference_name(row: &Row) -> Result<Option<String>> {
    Ok(non_blank(row.opt_text(1, "Name")?))
}

/// Shape of a legacy country code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountryCode {
    Absent,
    Iso2(String),
    Iso3(String),
    /// Neither 2 nor 3 characters; kept for the warning.
    Unrecognized(String),
}

impl CountryCode {
    /// Classify a raw legacy code by length after trimming.
    pub fn parse(raw: Option<&str>) -> Self {
        let code = match raw.map(str::trim) {
            None | Some("") => return CountryCode::Absent,
            Some(c) => c,
        };
        match code.chars().count() {
            2 => CountryCode::Iso2(code.to_uppercase()),
            3 => CountryCode::Iso3(code.to_uppercase()),
            _ => CountryCode::Unrecognized(code.to_string()),
        }
    }
}

/// Target `country_ref` row.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRow {
    pub name: String,
    pub code: CountryCode,
}

impl CountryRow {
    /// Decode `CountryID, CountryName, CountryCode`; `None` when the name is blank.
    pub fn from_row(row: &Row) -> Result<Option<Self>> {
        let name = match reference_name(row)? {
            Some(n) => n,
            None => return Ok(None),
        };
        let code = CountryCode::parse(row.opt_text(2, "CountryCode")?.as_deref());
        Ok(Some(CountryRow { name, code }))
    }

    /// Parameters for `(name, iso2_code, iso3_code)`.
    pub fn into_params(self) -> Vec<SqlValue> {
        let (iso2, iso3) = match self.code {
            CountryCode::Iso2(c) => (SqlValue::Text(c), SqlValue::Null),
            CountryCode::Iso3(c) => (SqlValue::Null, SqlValue::Text(c)),
            CountryCode::Absent | CountryCode::Unrecognized(_) => (SqlValue::Null, SqlValue::Null),
        };
        vec![SqlValue::Text(self.name), iso2, iso3]
    }
}

/// Legacy placeholder for "no language code".
pub const UNDEFINED_CODE: &str = "undefined";

/// Target `language_ref` row.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageRow {
    pub name: String,
    pub iso_code: Option<String>,
}

impl LanguageRow {
    /// Decode `LanguageID, LanguageName, LanguageCode`; `None` when the name is blank.
    pub fn from_row(row: &Row) -> Result<Option<Self>> {
        let name = match reference_name(row)? {
            Some(n) => n,
            None => return Ok(None),
        };
        let iso_code = non_blank(row.opt_text(2, "LanguageCode")?)
            .filter(|c| !c.eq_ignore_ascii_case(UNDEFINED_CODE));
        Ok(Some(LanguageRow { name, iso_code }))
    }

    /// Parameters for `(name, iso_code)`.
    pub fn into_params(self) -> Vec<SqlValue> {
        vec![SqlValue::Text(self.name), self.iso_code.into()]
    }
}

/// Legacy `CertificateCountryRef` row with legacy reference ids.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyCertificateCountry {
    pub country_id: i64,
    pub certificate_id: i64,
    pub age: Option<i64>,
}

impl LegacyCertificateCountry {
    /// Decode `CountryID, CertificateID, Age`.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            country_id: row.i64(0, "CountryID")?,
            certificate_id: row.i64(1, "CertificateID")?,
            age: row.opt_i64(2, "Age")?,
        })
    }
}
