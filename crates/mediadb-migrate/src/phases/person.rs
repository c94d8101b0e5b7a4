//! `core-person`: `CastTable` -> `person`, ids carried over.

use super::PhaseContext;
use crate::core::{ColumnDefault, ConflictAction, SourceQuery, Statement, Upsert};
use crate::error::Result;
use crate::transcode::person::{LegacyPerson, PersonRow};
use crate::transcode::RowOutcome;
use crate::transfer::{load, LoadJob, LoadStats};

const PERSON_QUERY: SourceQuery = SourceQuery {
    name: "cast-table",
    sql: r#"SELECT "CastID", "CastName", "IsDirector", "IsWriter", "IsCharacter" FROM "Tables"."CastTable" ORDER BY "CastID""#,
    count_sql: r#"SELECT COUNT(*) FROM "Tables"."CastTable""#,
};

const PERSON_UPSERT: Statement = Statement::Upsert(Upsert {
    table: "person",
    columns: &["id", "name", "primary_profession"],
    conflict: &["id"],
    action: ConflictAction::Overwrite(&["name", "primary_profession"]),
    defaults: &[
        ColumnDefault {
            column: "created_at",
            expr: "now()",
            on_update: false,
        },
        ColumnDefault {
            column: "updated_at",
            expr: "now()",
            on_update: true,
        },
    ],
});

pub(super) async fn run(ctx: &PhaseContext<'_>) -> Result<Vec<LoadStats>> {
    let stats = load(
        ctx.source,
        ctx.target,
        LoadJob {
            label: "person",
            query: &PERSON_QUERY,
            statement: &PERSON_UPSERT,
        },
        &ctx.transfer,
        &ctx.control,
        |row, _| {
            let person = PersonRow::from(LegacyPerson::from_row(row)?);
            Ok(RowOutcome::Write(person.into_params()))
        },
    )
    .await?;
    Ok(vec![stats])
}
