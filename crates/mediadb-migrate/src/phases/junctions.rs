//! `junctions-*`: `"Lines".*TitleLine` -> title junction tables.
//!
//! Every junction phase resolves the legacy reference ids it needs before
//! the first write, then streams its line table once.

use super::refs::{CERTIFICATE, COUNTRY, GENRE, LANGUAGE};
use super::PhaseContext;
use crate::core::{ConflictAction, SourceQuery, SqlValue, Statement, Upsert};
use crate::error::Result;
use crate::resolve::{resolve_legacy, Reference};
use crate::transcode::junction::{certificate_link, title_link};
use crate::transfer::{load, LoadJob, LoadStats};

/// A `(TitleID, RefID)` line table and where it goes.
struct TitleLine {
    reference: &'static Reference,
    query: SourceQuery,
    statement: Statement,
    skip: &'static str,
    extra: &'static [SqlValue],
}

const COUNTRY_LINE: TitleLine = TitleLine {
    reference: &COUNTRY,
    query: SourceQuery {
        name: "country-title-line",
        sql: r#"SELECT "TitleID", "CountryID" FROM "Lines"."CountryTitleLine" ORDER BY "TitleID", "CountryID""#,
        count_sql: r#"SELECT COUNT(*) FROM "Lines"."CountryTitleLine""#,
    },
    statement: Statement::Upsert(Upsert {
        table: "title_country",
        columns: &["title_id", "country_id"],
        conflict: &["title_id", "country_id"],
        action: ConflictAction::DoNothing,
        defaults: &[],
    }),
    skip: "unmapped-country",
    extra: &[],
};

const LANGUAGE_LINE: TitleLine = TitleLine {
    reference: &LANGUAGE,
    query: SourceQuery {
        name: "language-title-line",
        sql: r#"SELECT "TitleID", "LanguageID" FROM "Lines"."LanguageTitleLine" ORDER BY "TitleID", "LanguageID""#,
        count_sql: r#"SELECT COUNT(*) FROM "Lines"."LanguageTitleLine""#,
    },
    statement: Statement::Upsert(Upsert {
        table: "title_language",
        columns: &["title_id", "language_id", "is_original"],
        conflict: &["title_id", "language_id"],
        action: ConflictAction::DoNothing,
        defaults: &[],
    }),
    skip: "unmapped-language",
    extra: &[SqlValue::Bool(false)],
};

const GENRE_LINE: TitleLine = TitleLine {
    reference: &GENRE,
    query: SourceQuery {
        name: "genre-title-line",
        sql: r#"SELECT "TitleID", "GenreID" FROM "Lines"."GenreTitleLine" ORDER BY "TitleID", "GenreID""#,
        count_sql: r#"SELECT COUNT(*) FROM "Lines"."GenreTitleLine""#,
    },
    statement: Statement::Upsert(Upsert {
        table: "title_genre",
        columns: &["title_id", "genre_id"],
        conflict: &["title_id", "genre_id"],
        action: ConflictAction::DoNothing,
        defaults: &[],
    }),
    skip: "unmapped-genre",
    extra: &[],
};

const CERTIFICATE_QUERY: SourceQuery = SourceQuery {
    name: "certificate-title-line",
    sql: r#"SELECT "TitleID", "CertificateID", "CountryID" FROM "Lines"."CertificateTitleLine" ORDER BY "TitleID", "CertificateID", "CountryID""#,
    count_sql: r#"SELECT COUNT(*) FROM "Lines"."CertificateTitleLine""#,
};

const CERTIFICATE_UPSERT: Statement = Statement::Upsert(Upsert {
    table: "title_certificate",
    columns: &["title_id", "certificate_id", "country_id"],
    conflict: &["title_id", "certificate_id", "country_id"],
    action: ConflictAction::DoNothing,
    defaults: &[],
});

pub(super) async fn run_country(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    run_line(ctx, &COUNTRY_LINE).await
}

pub(super) async fn run_language(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    run_line(ctx, &LANGUAGE_LINE).await
}

pub(super) async fn run_genre(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    run_line(ctx, &GENRE_LINE).await
}

async fn run_line(ctx: &PhaseContext<'_>, line: &TitleLine) -> Result<Vec<LoadStats>> {
    let refs = resolve_legacy(
        ctx.source,
        ctx.target,
        line.reference,
        ctx.transfer.log_limit,
        &ctx.control,
    )
    .await?;

    let stats = load(
        ctx.source,
        ctx.target,
        LoadJob {
            label: line.statement.table(),
            query: &line.query,
            statement: &line.statement,
        },
        &ctx.transfer,
        &ctx.control,
        |row, _| title_link(row, &refs, line.skip, line.extra),
    )
    .await?;
    Ok(vec![stats])
}

pub(super) async fn run_certificate(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    let limit = ctx.transfer.log_limit;
    let countries = resolve_legacy(ctx.source, ctx.target, &COUNTRY, limit, &ctx.control).await?;
    let certificates =
        resolve_legacy(ctx.source, ctx.target, &CERTIFICATE, limit, &ctx.control).await?;

    let stats = load(
        ctx.source,
        ctx.target,
        LoadJob {
            label: "title_certificate",
            query: &CERTIFICATE_QUERY,
            statement: &CERTIFICATE_UPSERT,
        },
        &ctx.transfer,
        &ctx.control,
        |row, _| certificate_link(row, &certificates, &countries),
    )
    .await?;
    Ok(vec![stats])
}
