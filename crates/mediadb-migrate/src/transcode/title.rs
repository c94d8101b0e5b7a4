//! `"Tables"."TitleTable"` -> `title`.
//!
//! `title.id` is the legacy TitleID. `parent_title_id` is not written here;
//! it is backfilled once every title exists.

use chrono::NaiveDateTime;

use super::{non_blank, season_number};
use crate::core::{Row, SqlValue};
use crate::error::Result;

/// Target columns written by the title upsert, in parameter order.
pub const TITLE_COLUMNS: &[&str] = &[
    "id",
    "title_type_id",
    "imdb_id",
    "primary_title",
    "original_title",
    "start_year",
    "runtime_minutes",
    "primary_country_id",
    "poster_url",
    "metacritic_rating",
    "revenue",
    "imdb_rating",
    "imdb_votes",
    "popularity",
    "season_number",
    "episode_number",
    "total_seasons",
    "total_episodes",
    "date_released",
    "date_added",
    "date_updated",
    "is_available",
    "viewed_count",
    "played_count",
    "liked_count",
    "disliked_count",
    "folder_name",
    "folder_path",
];

/// One legacy title row.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTitle {
    pub title_id: i64,
    pub title_type: Option<i64>,
    pub imdb_id: Option<String>,
    pub title_name: Option<String>,
    pub original_title: Option<String>,
    pub title_year: Option<i64>,
    pub title_length: Option<i64>,
    pub title_country: Option<i64>,
    pub poster_url: Option<String>,
    pub metacritic_rating: Option<i64>,
    pub revenue: Option<i64>,
    pub imdb_rating: Option<f64>,
    pub imdb_votes: Option<i64>,
    pub popularity: Option<i64>,
    pub parent_id: Option<i64>,
    pub episode_season: Option<String>,
    pub episode_number: Option<i64>,
    pub total_seasons: Option<i64>,
    pub total_episodes: Option<i64>,
    pub date_released: Option<NaiveDateTime>,
    pub date_added: NaiveDateTime,
    pub date_updated: Option<NaiveDateTime>,
    pub available: Option<bool>,
    pub viewed: Option<i64>,
    pub played: Option<i64>,
    pub liked: Option<i64>,
    pub unliked: Option<i64>,
    pub folder_name: Option<String>,
    pub folder_path: Option<String>,
}

impl LegacyTitle {
    /// Decode a row of the title source query.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            title_id: row.i64(0, "TitleID")?,
            title_type: row.opt_i64(1, "TitleType")?,
            imdb_id: row.opt_text(2, "IMDbID")?,
            title_name: row.opt_text(3, "TitleName")?,
            original_title: row.opt_text(4, "OriginalTitle")?,
            title_year: row.opt_i64(5, "TitleYear")?,
            title_length: row.opt_i64(6, "TitleLength")?,
            title_country: row.opt_i64(7, "TitleCountry")?,
            poster_url: row.opt_text(8, "PosterURL")?,
            metacritic_rating: row.opt_i64(9, "MetacriticRating")?,
            revenue: row.opt_i64(10, "Revenue")?,
            imdb_rating: row.opt_f64(11, "IMDbRating")?,
            imdb_votes: row.opt_i64(12, "IMDbVotes")?,
            popularity: row.opt_i64(13, "Popularity")?,
            parent_id: row.opt_i64(14, "ParentID")?,
            episode_season: row.opt_text(15, "EpisodeSeason")?,
            episode_number: row.opt_i64(16, "EpisodeNumber")?,
            total_seasons: row.opt_i64(17, "TotalSeasons")?,
            total_episodes: row.opt_i64(18, "TotalEpisodes")?,
            date_released: row.opt_datetime(19, "DateReleased")?,
            date_added: row.datetime(20, "DateAdded")?,
            date_updated: row.opt_datetime(21, "DateUpdated")?,
            available: row.opt_bool(22, "Available")?,
            viewed: row.opt_i64(23, "Viewed")?,
            played: row.opt_i64(24, "Played")?,
            liked: row.opt_i64(25, "Liked")?,
            unliked: row.opt_i64(26, "UnLiked")?,
            folder_name: row.opt_text(27, "FolderName")?,
            folder_path: row.opt_text(28, "FolderPath")?,
        })
    }
}

/// Target `title` row, NOT NULL columns already defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleRow {
    pub id: i64,
    pub title_type_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub primary_title: String,
    pub original_title: String,
    pub start_year: Option<i64>,
    pub runtime_minutes: Option<i64>,
    pub primary_country_id: Option<i64>,
    pub poster_url: Option<String>,
    pub metacritic_rating: Option<i64>,
    pub revenue: Option<i64>,
    pub imdb_rating: Option<f64>,
    pub imdb_votes: Option<i64>,
    pub popularity: Option<i64>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
    pub total_seasons: Option<i64>,
    pub total_episodes: Option<i64>,
    pub date_released: Option<NaiveDateTime>,
    pub date_added: NaiveDateTime,
    pub date_updated: NaiveDateTime,
    pub is_available: bool,
    pub viewed_count: i64,
    pub played_count: i64,
    pub liked_count: i64,
    pub disliked_count: i64,
    pub folder_name: Option<String>,
    pub folder_path: Option<String>,
}

impl TitleRow {
    /// Build the target row. `title_type_id` and `primary_country_id` are
    /// the already translated reference ids.
    pub fn new(t: LegacyTitle, title_type_id: Option<i64>, primary_country_id: Option<i64>) -> Self {
        TitleRow {
            id: t.title_id,
            title_type_id,
            imdb_id: non_blank(t.imdb_id),
            primary_title: t.title_name.unwrap_or_default(),
            original_title: t.original_title.unwrap_or_default(),
            start_year: t.title_year,
            runtime_minutes: t.title_length,
            primary_country_id,
            poster_url: non_blank(t.poster_url),
            metacritic_rating: t.metacritic_rating,
            revenue: t.revenue,
            imdb_rating: t.imdb_rating,
            imdb_votes: t.imdb_votes,
            popularity: t.popularity,
            season_number: season_number(t.episode_season.as_deref()),
            episode_number: t.episode_number,
            total_seasons: t.total_seasons,
            total_episodes: t.total_episodes,
            date_released: t.date_released,
            date_added: t.date_added,
            date_updated: t.date_updated.unwrap_or(t.date_added),
            is_available: t.available.unwrap_or(false),
            viewed_count: t.viewed.unwrap_or(0),
            played_count: t.played.unwrap_or(0),
            liked_count: t.liked.unwrap_or(0),
            disliked_count: t.unliked.unwrap_or(0),
            folder_name: non_blank(t.folder_name),
            folder_path: non_blank(t.folder_path),
        }
    }

    /// Parameters in [`TITLE_COLUMNS`] order.
    pub fn into_params(self) -> Vec<SqlValue> {
        vec![
            SqlValue::I64(self.id),
            self.title_type_id.into(),
            self.imdb_id.into(),
            SqlValue::Text(self.primary_title),
            SqlValue::Text(self.original_title),
            self.start_year.into(),
            self.runtime_minutes.into(),
            self.primary_country_id.into(),
            self.poster_url.into(),
            self.metacritic_rating.into(),
            self.revenue.into(),
            self.imdb_rating.into(),
            self.imdb_votes.into(),
            self.popularity.into(),
            self.season_number.into(),
            self.episode_number.into(),
            self.total_seasons.into(),
            self.total_episodes.into(),
            self.date_released.into(),
            SqlValue::DateTime(self.date_added),
            SqlValue::DateTime(self.date_updated),
            SqlValue::Bool(self.is_available),
            SqlValue::I64(self.viewed_count),
            SqlValue::I64(self.played_count),
            SqlValue::I64(self.liked_count),
            SqlValue::I64(self.disliked_count),
            self.folder_name.into(),
            self.folder_path.into(),
        ]
    }
}

/// `(TitleID, ParentID)` for the backfill pass; `None` when there is no parent.
pub fn parent_link(row: &Row) -> Result<Option<(i64, i64)>> {
    let title_id = row.i64(0, "TitleID")?;
    Ok(row
        .opt_i64(1, "ParentID")?
        .filter(|p| *p > 0)
        .map(|p| (title_id, p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn added() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 5, 17)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn sparse_row(id: i64) -> Row {
        let mut values = vec![SqlValue::Null; 29];
        values[0] = SqlValue::I64(id);
        values[20] = SqlValue::DateTime(added());
        Row::new(values)
    }

    const NOT_NULL: &[&str] = &[
        "id",
        "primary_title",
        "original_title",
        "date_added",
        "date_updated",
        "is_available",
        "viewed_count",
        "played_count",
        "liked_count",
        "disliked_count",
    ];

    #[test]
    fn test_not_null_columns_never_null() {
        let legacy = LegacyTitle::from_row(&sparse_row(9)).unwrap();
        let params = TitleRow::new(legacy, None, None).into_params();
        assert_eq!(params.len(), TITLE_COLUMNS.len());

        for (col, value) in TITLE_COLUMNS.iter().zip(&params) {
            if NOT_NULL.contains(col) {
                assert!(!value.is_null(), "{} must not be NULL", col);
            }
        }
    }

    #[test]
    fn test_date_updated_falls_back_to_date_added() {
        let legacy = LegacyTitle::from_row(&sparse_row(1)).unwrap();
        let row = TitleRow::new(legacy, None, None);
        assert_eq!(row.date_updated, row.date_added);
        assert_eq!(row.original_title, "");
        assert!(!row.is_available);
        assert_eq!(row.viewed_count, 0);
    }

    #[test]
    fn test_title_fields_are_derived() {
        let mut values = sparse_row(5).into_values();
        values[2] = " tt0111161 ".into();
        values[8] = "  ".into();
        values[15] = "Season 12B".into();
        values[22] = SqlValue::Bool(true);
        let legacy = LegacyTitle::from_row(&Row::new(values)).unwrap();
        let row = TitleRow::new(legacy, Some(3), Some(7));

        assert_eq!(row.id, 5);
        assert_eq!(row.imdb_id.as_deref(), Some("tt0111161"));
        assert_eq!(row.poster_url, None);
        assert_eq!(row.season_number, Some(12));
        assert_eq!(row.title_type_id, Some(3));
        assert_eq!(row.primary_country_id, Some(7));
        assert!(row.is_available);
    }

    #[test]
    fn test_parent_link() {
        let row = Row::new(vec![SqlValue::I64(5), SqlValue::I64(1)]);
        assert_eq!(parent_link(&row).unwrap(), Some((5, 1)));

        let row = Row::new(vec![SqlValue::I64(5), SqlValue::I64(0)]);
        assert_eq!(parent_link(&row).unwrap(), None);

        let row = Row::new(vec![SqlValue::I64(5), SqlValue::Null]);
        assert_eq!(parent_link(&row).unwrap(), None);
    }
}
