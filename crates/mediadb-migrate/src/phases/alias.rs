//! `junctions-alias`: `KnownAsTitleLine` -> `title_alias`.
//!
//! Aliases are matched to target titles by IMDb id, not by legacy TitleID.

use tracing::info;

use super::PhaseContext;
use crate::core::{ConflictAction, SourceQuery, Statement, TableScan, Upsert};
use crate::error::Result;
use crate::resolve::build_key_map;
use crate::transcode::junction::alias;
use crate::transfer::{load, LoadJob, LoadStats};

const TITLE_IMDB: TableScan = TableScan {
    table: "title",
    columns: &["id", "imdb_id"],
    non_null: Some("imdb_id"),
};

const ALIAS_QUERY: SourceQuery = SourceQuery {
    name: "known-as-title-line",
    sql: r#"SELECT t."IMDbID", k."KnownAsTitle"
FROM "Lines"."KnownAsTitleLine" k
LEFT JOIN "Tables"."TitleTable" t ON t."TitleID" = k."TitleID"
ORDER BY k."TitleID", k."KnownAsTitle""#,
    count_sql: r#"SELECT COUNT(*) FROM "Lines"."KnownAsTitleLine""#,
};

const ALIAS_UPSERT: Statement = Statement::Upsert(Upsert {
    table: "title_alias",
    columns: &["title_id", "alias"],
    conflict: &["title_id", "alias"],
    action: ConflictAction::DoNothing,
    defaults: &[],
});

pub(super) async fn run(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    let titles = build_key_map(ctx.target, &TITLE_IMDB, &ctx.control).await?;
    info!("title imdb map: {} ids", titles.len());

    let stats = load(
        ctx.source,
        ctx.target,
        LoadJob {
            label: "title_alias",
            query: &ALIAS_QUERY,
            statement: &ALIAS_UPSERT,
        },
        &ctx.transfer,
        &ctx.control,
        |row, _| alias(row, &titles),
    )
    .await?;
    Ok(vec![stats])
}
