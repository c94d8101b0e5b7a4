//! `"Lines".*TitleLine` -> title junction tables.
//!
//! `title_id` is the legacy TitleID verbatim. Reference ids go through a
//! [`LegacyIdMap`]; a row whose reference has no mapping is skipped.

use super::{non_blank, RowOutcome};
use crate::core::{Row, SqlValue};
use crate::error::Result;
use crate::resolve::{LegacyIdMap, NaturalKeyMap};

/// `(TitleID, RefID)` -> `(title_id, ref_id, extra...)`.
pub fn title_link(
    row: &Row,
    refs: &LegacyIdMap,
    skip: &'static str,
    extra: &[SqlValue],
) -> Result<RowOutcome> {
    let title_id = row.i64(0, "TitleID")?;
    let legacy_ref = row.opt_i64(1, "RefID")?;
    Ok(match legacy_ref.and_then(|id| refs.get(id)) {
        Some(ref_id) => {
            let mut params = vec![SqlValue::I64(title_id), SqlValue::I64(ref_id)];
            params.extend_from_slice(extra);
            RowOutcome::Write(params)
        }
        None => RowOutcome::Skip(skip),
    })
}

/// `(TitleID, CertificateID, CountryID)` -> `(title_id, certificate_id, country_id)`.
pub fn certificate_link(
    row: &Row,
    certificates: &LegacyIdMap,
    countries: &LegacyIdMap,
) -> Result<RowOutcome> {
    let title_id = row.i64(0, "TitleID")?;
    let certificate = row.opt_i64(1, "CertificateID")?.and_then(|id| certificates.get(id));
    let country = row.opt_i64(2, "CountryID")?.and_then(|id| countries.get(id));
    Ok(match (certificate, country) {
        (None, _) => RowOutcome::Skip("unmapped-certificate"),
        (_, None) => RowOutcome::Skip("unmapped-country"),
        (Some(cert), Some(country)) => RowOutcome::Write(vec![
            SqlValue::I64(title_id),
            SqlValue::I64(cert),
            SqlValue::I64(country),
        ]),
    })
}

/// `(IMDbID, KnownAsTitle)` -> `(title_id, alias)`, titles found by IMDb id.
pub fn alias(row: &Row, titles: &NaturalKeyMap) -> Result<RowOutcome> {
    let imdb_id = row.opt_text(0, "IMDbID")?;
    let alias = match non_blank(row.opt_text(1, "KnownAsTitle")?) {
        Some(a) => a,
        None => return Ok(RowOutcome::Skip("empty-alias")),
    };
    Ok(match imdb_id.as_deref().and_then(|id| titles.get(id)) {
        Some(title_id) => RowOutcome::Write(vec![SqlValue::I64(title_id), SqlValue::Text(alias)]),
        None => RowOutcome::Skip("unknown-imdb-id"),
    })
}
