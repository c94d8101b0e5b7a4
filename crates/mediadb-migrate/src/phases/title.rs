//! `core-title`: `TitleTable` -> `title` in two passes.
//!
//! Pass one upserts every title with `parent_title_id` left alone. Pass two
//! backfills `parent_title_id` once every title id exists, so a child may be
//! loaded before its parent.

use super::refs::{COUNTRY, TITLE_TYPE};
use super::PhaseContext;
use crate::core::{ConflictAction, SourceQuery, Statement, Update, Upsert};
use crate::error::Result;
use crate::resolve::{resolve_legacy, LegacyIdMap};
use crate::transcode::title::{parent_link, LegacyTitle, TitleRow, TITLE_COLUMNS};
use crate::transcode::RowOutcome;
use crate::transfer::{load, LoadJob, LoadStats, Warnings};

const TITLE_QUERY: SourceQuery = SourceQuery {
    name: "title-table",
    sql: r#"SELECT "TitleID", "TitleType", "IMDbID", "TitleName", "OriginalTitle", "TitleYear",
       "TitleLength", "TitleCountry", "PosterURL", "MetacriticRating", "Revenue",
       "IMDbRating", "IMDbVotes", "Popularity", "ParentID", "EpisodeSeason",
       "EpisodeNumber", "TotalSeasons", "TotalEpisodes", "DateReleased", "DateAdded",
       "DateUpdated", "Available", "Viewed", "Played", "Liked", "UnLiked",
       "FolderName", "FolderPath"
FROM "Tables"."TitleTable" ORDER BY "TitleID""#,
    count_sql: r#"SELECT COUNT(*) FROM "Tables"."TitleTable""#,
};

/// Every title column but `id`.
const TITLE_OVERWRITE: &[&str] = match TITLE_COLUMNS.split_first() {
    Some((_, rest)) => rest,
    None => &[],
};

const TITLE_UPSERT: Statement = Statement::Upsert(Upsert {
    table: "title",
    columns: TITLE_COLUMNS,
    conflict: &["id"],
    action: ConflictAction::Overwrite(TITLE_OVERWRITE),
    defaults: &[],
});

const PARENT_QUERY: SourceQuery = SourceQuery {
    name: "title-parents",
    sql: r#"SELECT "TitleID", "ParentID" FROM "Tables"."TitleTable" WHERE "ParentID" > 0 ORDER BY "TitleID""#,
    count_sql: r#"SELECT COUNT(*) FROM "Tables"."TitleTable" WHERE "ParentID" > 0"#,
};

const PARENT_UPDATE: Statement = Statement::Update(Update {
    table: "title",
    set: &["parent_title_id"],
    key: &["id"],
});

pub(super) async fn run(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    let limit = ctx.transfer.log_limit;
    let types = resolve_legacy(ctx.source, ctx.target, &TITLE_TYPE, limit, &ctx.control).await?;
    let countries = resolve_legacy(ctx.source, ctx.target, &COUNTRY, limit, &ctx.control).await?;

    let titles = load(
        ctx.source,
        ctx.target,
        LoadJob {
            label: "title",
            query: &TITLE_QUERY,
            statement: &TITLE_UPSERT,
        },
        &ctx.transfer,
        &ctx.control,
        |row, warnings| {
            let legacy = LegacyTitle::from_row(row)?;
            let id = legacy.title_id;
            let type_id = translate(&types, legacy.title_type, "unmapped-title-type", id, warnings);
            let country_id =
                translate(&countries, legacy.title_country, "unmapped-country", id, warnings);
            Ok(RowOutcome::Write(
                TitleRow::new(legacy, type_id, country_id).into_params(),
            ))
        },
    )
    .await?;

    let parents = load(
        ctx.source,
        ctx.target,
        LoadJob {
            label: "title.parent_title_id",
            query: &PARENT_QUERY,
            statement: &PARENT_UPDATE,
        },
        &ctx.transfer,
        &ctx.control,
        |row, _| {
            Ok(match parent_link(row)? {
                Some((title_id, parent)) => RowOutcome::Write(vec![parent.into(), title_id.into()]),
                None => RowOutcome::Skip("no-parent"),
            })
        },
    )
    .await?;

    Ok(vec![titles, parents])
}

/// Soft lookup: an unmapped legacy reference becomes NULL with a warning.
fn translate(
    map: &LegacyIdMap,
    legacy: Option<i64>,
    category: &'static str,
    title_id: i64,
    warnings: &mut Warnings,
) -> Option<i64> {
    let legacy = legacy?;
    let mapped = map.get(legacy);
    if mapped.is_none() {
        warnings.warn(category, format!("title {} references legacy id {}", title_id, legacy));
    }
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RunControl;
    use crate::core::SqlValue;
    use crate::store::memory::{MemorySource, MemoryTarget};
    use crate::transfer::TransferConfig;
    use chrono::NaiveDate;

    fn title(id: i64, title_type: i64, country: Option<i64>, parent: i64) -> Vec<SqlValue> {
        let added = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let mut values = vec![SqlValue::Null; 29];
        values[0] = SqlValue::I64(id);
        values[1] = SqlValue::I32(title_type as i32);
        values[2] = format!("tt{:07}", id).into();
        values[3] = format!("Title {}", id).into();
        values[7] = country.map(|c| SqlValue::I32(c as i32)).unwrap_or(SqlValue::Null);
        values[14] = SqlValue::I32(parent as i32);
        values[15] = "Season 2".into();
        values[20] = SqlValue::DateTime(added);
        values
    }

    fn legacy() -> MemorySource {
        MemorySource::new()
            .with_rows(
                "title-table",
                vec![title(1, 2, Some(1), 0), title(5, 2, Some(4), 1)],
            )
            .with_rows(
                "title-parents",
                vec![vec![SqlValue::I64(5), SqlValue::I32(1)]],
            )
            .with_rows("title-type-ref-keys", vec![vec![SqlValue::I32(2), "Series".into()]])
            .with_rows("country-ref-keys", vec![vec![SqlValue::I32(1), "France".into()]])
    }

    fn refs() -> MemoryTarget {
        MemoryTarget::new()
            .with_rows(
                "title_type_ref",
                &["id", "name"],
                vec![vec![SqlValue::I64(20), "Series".into()]],
            )
            .with_rows(
                "country_ref",
                &["id", "name"],
                vec![vec![SqlValue::I64(10), "France".into()]],
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
    async fn test_parent_backfilled_after_all_titles_exist() {
        let source = legacy();
        let target = refs();
        let stats = run(&ctx(&source, &target, false)).await.unwrap();

        assert_eq!(stats[0].written, 2);
        assert_eq!(stats[1].written, 1);

        let child = target.find("title", "id", SqlValue::I64(5)).unwrap();
        assert_eq!(child.get("parent_title_id"), Some(&SqlValue::I64(1)));
        assert_eq!(child.get("season_number"), Some(&SqlValue::I64(2)));
        assert_eq!(child.get("title_type_id"), Some(&SqlValue::I64(20)));
        let parent = target.find("title", "id", SqlValue::I64(1)).unwrap();
        assert_eq!(parent.get("primary_country_id"), Some(&SqlValue::I64(10)));
        assert_eq!(parent.get("parent_title_id"), None);
    }

    #[tokio::test]
    async fn test_unmapped_country_is_null_with_warning() {
        let source = legacy();
        let target = refs();
        let stats = run(&ctx(&source, &target, false)).await.unwrap();

        let child = target.find("title", "id", SqlValue::I64(5)).unwrap();
        assert_eq!(child.get("primary_country_id"), Some(&SqlValue::Null));
        assert_eq!(stats[0].warnings.get("unmapped-country"), Some(&1));
        assert_eq!(stats[0].skipped, 0);
    }

    #[tokio::test]
    async fn test_titles_load_without_reference_tables() {
        let source = legacy();
        let target = MemoryTarget::new();
        let stats = run(&ctx(&source, &target, false)).await.unwrap();

        assert_eq!(target.row_count("title"), 2);
        assert_eq!(stats[0].warnings.get("unmapped-title-type"), Some(&2));
    }

    #[tokio::test]
    async fn test_rerun_keeps_parent_and_row_count() {
        let source = legacy();
        let target = refs();
        run(&ctx(&source, &target, false)).await.unwrap();
        run(&ctx(&source, &target, false)).await.unwrap();

        assert_eq!(target.row_count("title"), 2);
        let child = target.find("title", "id", SqlValue::I64(5)).unwrap();
        assert_eq!(child.get("parent_title_id"), Some(&SqlValue::I64(1)));
    }

    #[tokio::test]
    async fn test_dry_run_counts_backfill_candidates() {
        let source = legacy();
        let target = refs();
        let stats = run(&ctx(&source, &target, true)).await.unwrap();

        assert_eq!(target.writes(), 0);
        assert_eq!(stats[1].processed, 1);
        assert_eq!(stats[1].written, 0);
    }
}
