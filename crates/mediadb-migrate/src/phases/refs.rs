//! `refs`: lookup tables, then `certificate_country`.

use tracing::info;

use super::PhaseContext;
use crate::core::{ConflictAction, SourceQuery, SqlValue, Statement, TableScan, Upsert};
use crate::error::Result;
use crate::resolve::{resolve_legacy, Reference};
use crate::transcode::refs::{reference_name, CountryCode, CountryRow, LanguageRow, LegacyCertificateCountry};
use crate::transcode::RowOutcome;
use crate::transfer::{load, LoadJob, LoadStats};

pub const COUNTRY: Reference = Reference {
    name: "country",
    target: TableScan {
        table: "country_ref",
        columns: &["id", "name"],
        non_null: None,
    },
    legacy: SourceQuery {
        name: "country-ref-keys",
        sql: r#"SELECT "CountryID", "CountryName" FROM "References"."CountryRef" ORDER BY "CountryID""#,
        count_sql: r#"SELECT COUNT(*) FROM "References"."CountryRef""#,
    },
    sentinel: None,
};

pub const LANGUAGE: Reference = Reference {
    name: "language",
    target: TableScan {
        table: "language_ref",
        columns: &["id", "iso_code", "name"],
        non_null: None,
    },
    legacy: SourceQuery {
        name: "language-ref-keys",
        sql: r#"SELECT "LanguageID", "LanguageCode", "LanguageName" FROM "References"."LanguageRef" ORDER BY "LanguageID""#,
        count_sql: r#"SELECT COUNT(*) FROM "References"."LanguageRef""#,
    },
    sentinel: Some(crate::transcode::refs::UNDEFINED_CODE),
};

pub const GENRE: Reference = Reference {
    name: "genre",
    target: TableScan {
        table: "genre_ref",
        columns: &["id", "name"],
        non_null: None,
    },
    legacy: SourceQuery {
        name: "genre-ref-keys",
        sql: r#"SELECT "GenreID", "GenreName" FROM "References"."GenreRef" ORDER BY "GenreID""#,
        count_sql: r#"SELECT COUNT(*) FROM "References"."GenreRef""#,
    },
    sentinel: None,
};

pub const CERTIFICATE: Reference = Reference {
    name: "certificate",
    target: TableScan {
        table: "certificate_ref",
        columns: &["id", "name"],
        non_null: None,
    },
    legacy: SourceQuery {
        name: "certificate-ref-keys",
        sql: r#"SELECT "CertificateID", "CertificateName" FROM "References"."CertificateRef" ORDER BY "CertificateID""#,
        count_sql: r#"SELECT COUNT(*) FROM "References"."CertificateRef""#,
    },
    sentinel: None,
};

pub const TITLE_TYPE: Reference = Reference {
    name: "title type",
    target: TableScan {
        table: "title_type_ref",
        columns: &["id", "name"],
        non_null: None,
    },
    legacy: SourceQuery {
        name: "title-type-ref-keys",
        sql: r#"SELECT "TypeID", "TypeName" FROM "References"."TitleTypeRef" ORDER BY "TypeID""#,
        count_sql: r#"SELECT COUNT(*) FROM "References"."TitleTypeRef""#,
    },
    sentinel: None,
};

const COUNTRY_QUERY: SourceQuery = SourceQuery {
    name: "country-ref",
    sql: r#"SELECT "CountryID", "CountryName", "CountryCode" FROM "References"."CountryRef" ORDER BY "CountryID""#,
    count_sql: r#"SELECT COUNT(*) FROM "References"."CountryRef""#,
};

const COUNTRY_UPSERT: Statement = Statement::Upsert(Upsert {
    table: "country_ref",
    columns: &["name", "iso2_code", "iso3_code"],
    conflict: &["name"],
    action: ConflictAction::Widen(&["iso2_code", "iso3_code"]),
    defaults: &[],
});

const LANGUAGE_QUERY: SourceQuery = SourceQuery {
    name: "language-ref",
    sql: r#"SELECT "LanguageID", "LanguageName", "LanguageCode" FROM "References"."LanguageRef" ORDER BY "LanguageID""#,
    count_sql: r#"SELECT COUNT(*) FROM "References"."LanguageRef""#,
};

const LANGUAGE_UPSERT: Statement = Statement::Upsert(Upsert {
    table: "language_ref",
    columns: &["name", "iso_code"],
    conflict: &["name"],
    action: ConflictAction::Widen(&["iso_code"]),
    defaults: &[],
});

/// A `(id, name)` legacy table copied into a name-keyed target table.
struct NamedRef {
    query: SourceQuery,
    statement: Statement,
    /// Constant trailing parameters, e.g. `is_series`.
    params: fn(String) -> Vec<SqlValue>,
}

fn name_only(name: String) -> Vec<SqlValue> {
    vec![SqlValue::Text(name)]
}

fn not_series(name: String) -> Vec<SqlValue> {
    vec![SqlValue::Text(name), SqlValue::Bool(false)]
}

macro_rules! named_ref {
    ($query:literal, $legacy:literal, $id:literal, $name:literal, $target:literal) => {
        NamedRef {
            query: SourceQuery {
                name: $query,
                sql: concat!(
                    "SELECT \"", $id, "\", \"", $name, "\" FROM \"References\".\"",
                    $legacy, "\" ORDER BY \"", $id, "\""
                ),
                count_sql: concat!("SELECT COUNT(*) FROM \"References\".\"", $legacy, "\""),
            },
            statement: Statement::Upsert(Upsert {
                table: $target,
                columns: &["name"],
                conflict: &["name"],
                action: ConflictAction::DoNothing,
                defaults: &[],
            }),
            params: name_only,
        }
    };
}

const NAMED_REFS: &[NamedRef] = &[
    named_ref!("genre-ref", "GenreRef", "GenreID", "GenreName", "genre_ref"),
    named_ref!("certificate-ref", "CertificateRef", "CertificateID", "CertificateName", "certificate_ref"),
    NamedRef {
        query: SourceQuery {
            name: "title-type-ref",
            sql: r#"SELECT "TypeID", "TypeName" FROM "References"."TitleTypeRef" ORDER BY "TypeID""#,
            count_sql: r#"SELECT COUNT(*) FROM "References"."TitleTypeRef""#,
        },
        statement: Statement::Upsert(Upsert {
            table: "title_type_ref",
            columns: &["name", "is_series"],
            conflict: &["name"],
            action: ConflictAction::DoNothing,
            defaults: &[],
        }),
        params: not_series,
    },
    named_ref!(
        "connection-type-ref",
        "ConnectionTypeRef",
        "ConnectionTypeID",
        "ConnectionTypeDescription",
        "connection_type_ref"
    ),
    named_ref!(
        "parent-guide-ref",
        "ParentGuideRef",
        "ParentGuideID",
        "ParentGuideDescription",
        "parental_guide_category_ref"
    ),
    named_ref!("quality-ref", "QualityRef", "QualityID", "QualityName", "quality_ref"),
    named_ref!("display-ref", "DisplayRef", "DisplayID", "DisplayType", "display_ref"),
    named_ref!("cast-type-ref", "CastTypeRef", "CastTypeID", "CastTypeDescription", "cast_role_type_ref"),
    named_ref!("award-event-ref", "AwardEventRef", "EventID", "EventName", "award_event_ref"),
    named_ref!(
        "award-nomination-type-ref",
        "AwardNominationTypeRef",
        "NominationTypeID",
        "NominationType",
        "award_nomination_type_ref"
    ),
];

const CERTIFICATE_COUNTRY_QUERY: SourceQuery = SourceQuery {
    name: "certificate-country-ref",
    sql: r#"SELECT "CountryID", "CertificateID", "Age" FROM "References"."CertificateCountryRef" ORDER BY "CountryID", "CertificateID""#,
    count_sql: r#"SELECT COUNT(*) FROM "References"."CertificateCountryRef""#,
};

const CERTIFICATE_COUNTRY_UPSERT: Statement = Statement::Upsert(Upsert {
    table: "certificate_country",
    columns: &["country_id", "certificate_id", "min_age"],
    conflict: &["country_id", "certificate_id"],
    action: ConflictAction::Overwrite(&["min_age"]),
    defaults: &[],
});

pub(super) async fn run(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    let mut tables = Vec::with_capacity(NAMED_REFS.len() + 3);

    tables.push(
        load(
            ctx.source,
            ctx.target,
            LoadJob {
                label: "country_ref",
                query: &COUNTRY_QUERY,
                statement: &COUNTRY_UPSERT,
            },
            &ctx.transfer,
            &ctx.control,
            |row, warnings| {
                Ok(match CountryRow::from_row(row)? {
                    Some(country) => {
                        if let CountryCode::Unrecognized(code) = &country.code {
                            warnings.warn(
                                "unrecognized-country-code",
                                format!("{:?} for {:?}", code, country.name),
                            );
                        }
                        RowOutcome::Write(country.into_params())
                    }
                    None => RowOutcome::Skip("empty-name"),
                })
            },
        )
        .await?,
    );

    tables.push(
        load(
            ctx.source,
            ctx.target,
            LoadJob {
                label: "language_ref",
                query: &LANGUAGE_QUERY,
                statement: &LANGUAGE_UPSERT,
            },
            &ctx.transfer,
            &ctx.control,
            |row, _| {
                Ok(match LanguageRow::from_row(row)? {
                    Some(lang) => RowOutcome::Write(lang.into_params()),
                    None => RowOutcome::Skip("empty-name"),
                })
            },
        )
        .await?,
    );

    for named in NAMED_REFS {
        let to_params = named.params;
        tables.push(
            load(
                ctx.source,
                ctx.target,
                LoadJob {
                    label: named.statement.table(),
                    query: &named.query,
                    statement: &named.statement,
                },
                &ctx.transfer,
                &ctx.control,
                |row, _| {
                    Ok(match reference_name(row)? {
                        Some(name) => RowOutcome::Write(to_params(name)),
                        None => RowOutcome::Skip("empty-name"),
                    })
                },
            )
            .await?,
        );
    }

    tables.push(certificate_country(ctx).await?);
    Ok(tables)
}

/// Needs country and certificate rows in the target; both legacy ids are
/// translated by name.
async fn certificate_country(ctx: &PhaseContext<'_>) -> Result<LoadStats> {
    if ctx.transfer.dry_run {
        info!("certificate_country: dry-run resolves against the current target reference rows");
    }
    let limit = ctx.transfer.log_limit;
    let countries = resolve_legacy(ctx.source, ctx.target, &COUNTRY, limit, &ctx.control).await?;
    let certificates =
        resolve_legacy(ctx.source, ctx.target, &CERTIFICATE, limit, &ctx.control).await?;

    load(
        ctx.source,
        ctx.target,
        LoadJob {
            label: "certificate_country",
            query: &CERTIFICATE_COUNTRY_QUERY,
            statement: &CERTIFICATE_COUNTRY_UPSERT,
        },
        &ctx.transfer,
        &ctx.control,
        |row, _| {
            let legacy = LegacyCertificateCountry::from_row(row)?;
            Ok(
                match (countries.get(legacy.country_id), certificates.get(legacy.certificate_id)) {
                    (None, _) => RowOutcome::Skip("unmapped-country"),
                    (_, None) => RowOutcome::Skip("unmapped-certificate"),
                    (Some(country), Some(cert)) => RowOutcome::Write(vec![
                        SqlValue::I64(country),
                        SqlValue::I64(cert),
                        legacy.age.into(),
                    ]),
                },
            )
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RunControl;
    use crate::store::memory::{MemorySource, MemoryTarget};
    use crate::transfer::TransferConfig;

    fn legacy() -> MemorySource {
        MemorySource::new()
            .with_rows(
                "country-ref",
                vec![
                    vec![SqlValue::I32(1), "France".into(), "FR".into()],
                    vec![SqlValue::I32(2), "Soviet Union".into(), "SUHH".into()],
                    vec![SqlValue::I32(3), "  ".into(), "XX".into()],
                ],
            )
            .with_rows(
                "country-ref-keys",
                vec![
                    vec![SqlValue::I32(1), "France".into()],
                    vec![SqlValue::I32(2), "Soviet Union".into()],
                ],
            )
            .with_rows(
                "language-ref",
                vec![vec![SqlValue::I32(1), "French".into(), "fr".into()]],
            )
            .with_rows(
                "certificate-ref",
                vec![
                    vec![SqlValue::I32(7), "PG-13".into()],
                    vec![SqlValue::I32(8), "R".into()],
                ],
            )
            .with_rows(
                "certificate-ref-keys",
                vec![
                    vec![SqlValue::I32(7), "PG-13".into()],
                    vec![SqlValue::I32(8), "R".into()],
                ],
            )
            .with_rows(
                "title-type-ref",
                vec![vec![SqlValue::I32(1), "Movie".into()]],
            )
            .with_rows(
                "certificate-country-ref",
                vec![
                    vec![SqlValue::I32(1), SqlValue::I32(7), SqlValue::I32(13)],
                    vec![SqlValue::I32(2), SqlValue::I32(8), SqlValue::I32(17)],
                    vec![SqlValue::I32(9), SqlValue::I32(8), SqlValue::I32(18)],
                ],
            )
    }

    fn ctx<'a>(source: &'a MemorySource, target: &'a MemoryTarget, dry_run: bool) -> PhaseContext<'a> {
        PhaseContext {
            source,
            target,
            transfer: TransferConfig {
                dry_run,
                ..TransferConfig::default()
            },
            control: RunControl::unbounded(),
        }
    }

    #[tokio::test]
    async fn test_refs_loads_lookup_tables_then_certificate_country() {
        let source = legacy();
        let target = MemoryTarget::new();
        let stats = run(&ctx(&source, &target, false)).await.unwrap();

        assert_eq!(stats.len(), NAMED_REFS.len() + 3);
        assert_eq!(stats.last().unwrap().table, "certificate_country");

        let france = target.find("country_ref", "name", "France".into()).unwrap();
        assert_eq!(france.get("iso2_code"), Some(&SqlValue::Text("FR".into())));

        let soviet = target.find("country_ref", "name", "Soviet Union".into()).unwrap();
        assert_eq!(soviet.get("iso2_code"), Some(&SqlValue::Null));
        assert_eq!(soviet.get("iso3_code"), Some(&SqlValue::Null));
        assert_eq!(stats[0].warnings.get("unrecognized-country-code"), Some(&1));
        assert_eq!(stats[0].skips.get("empty-name"), Some(&1));

        let movie = target.find("title_type_ref", "name", "Movie".into()).unwrap();
        assert_eq!(movie.get("is_series"), Some(&SqlValue::Bool(false)));

        assert_eq!(target.row_count("certificate_country"), 2);
        let cc = stats.last().unwrap();
        assert_eq!(cc.skips.get("unmapped-country"), Some(&1));
    }

    #[tokio::test]
    async fn test_refs_is_idempotent() {
        let source = legacy();
        let target = MemoryTarget::new();
        run(&ctx(&source, &target, false)).await.unwrap();
        let first: Vec<_> = ["country_ref", "certificate_ref", "certificate_country"]
            .iter()
            .map(|t| target.rows(t))
            .collect();

        run(&ctx(&source, &target, false)).await.unwrap();
        let second: Vec<_> = ["country_ref", "certificate_ref", "certificate_country"]
            .iter()
            .map(|t| target.rows(t))
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_refs_dry_run_writes_nothing() {
        let source = legacy();
        let target = MemoryTarget::new();
        let stats = run(&ctx(&source, &target, true)).await.unwrap();

        assert_eq!(target.writes(), 0);
        assert_eq!(stats[0].processed, 3);
        assert_eq!(stats[0].written, 0);
        // Nothing in the target yet, so every certificate_country row is unmapped.
        assert_eq!(stats.last().unwrap().skipped, 3);
    }
}
