//! Text warning persistence
//!
//! At most one live warning exists per `(TextLocalizationId, Code)`. A warning
//! with empty content is "resolved" and is removed instead of stored.

use super::{now_millis, PrebuildStore};
use crate::types::PrebuildTextWarning;
use qdt_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const WARNING_COLUMNS: &str = "TextWarningId, TextId, TextLocalizationId, Code, Content, IsManuallyChecked, LastUpdateTimestamp";

fn warning_from_row(row: &SqliteRow) -> PrebuildTextWarning {
    PrebuildTextWarning {
        text_warning_id: Some(row.get("TextWarningId")),
        text_id: row.get("TextId"),
        text_localization_id: row.get("TextLocalizationId"),
        code: row.get("Code"),
        content: row.get("Content"),
        is_manually_checked: row.get("IsManuallyChecked"),
        last_update_timestamp: row.get("LastUpdateTimestamp"),
    }
}

pub(super) async fn load_text_warnings(
    conn: &mut SqliteConnection,
    text_id: i64,
) -> Result<Vec<PrebuildTextWarning>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM TextWarnings WHERE TextId = ? ORDER BY TextLocalizationId, Code",
        WARNING_COLUMNS
    ))
    .bind(text_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.iter().map(warning_from_row).collect())
}

impl PrebuildStore {
    /// Insert or replace the warning for `(text_localization_id, code)`.
    ///
    /// Empty content deletes the existing warning and returns `None`.
    pub async fn add_text_warning(
        &self,
        warning: &PrebuildTextWarning,
    ) -> Result<Option<PrebuildTextWarning>> {
        if warning.content.is_empty() {
            self.delete_text_warning(warning).await?;
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO TextWarnings (TextId, TextLocalizationId, Code, Content, IsManuallyChecked, LastUpdateTimestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(TextLocalizationId, Code) DO UPDATE SET
                TextId = excluded.TextId,
                Content = excluded.Content,
                IsManuallyChecked = excluded.IsManuallyChecked,
                LastUpdateTimestamp = excluded.LastUpdateTimestamp
            RETURNING {}
            "#,
            WARNING_COLUMNS
        ))
        .bind(warning.text_id)
        .bind(warning.text_localization_id)
        .bind(&warning.code)
        .bind(&warning.content)
        .bind(warning.is_manually_checked)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(warning_from_row(&row)))
    }

    /// Update a warning by id; empty content deletes it
    pub async fn update_text_warning(&self, warning: &PrebuildTextWarning) -> Result<()> {
        let text_warning_id = warning.text_warning_id.ok_or_else(|| {
            Error::Invariant("update_text_warning called on a warning without id".to_string())
        })?;

        let result = if warning.content.is_empty() {
            sqlx::query("DELETE FROM TextWarnings WHERE TextWarningId = ?")
                .bind(text_warning_id)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query(
                r#"
                UPDATE TextWarnings
                SET Code = ?, Content = ?, IsManuallyChecked = ?, LastUpdateTimestamp = ?
                WHERE TextWarningId = ?
                "#,
            )
            .bind(&warning.code)
            .bind(&warning.content)
            .bind(warning.is_manually_checked)
            .bind(now_millis())
            .bind(text_warning_id)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("text warning {}", text_warning_id)));
        }
        Ok(())
    }

    /// Delete the warning for `(text_localization_id, code)`; absent is fine
    pub async fn delete_text_warning(&self, warning: &PrebuildTextWarning) -> Result<()> {
        sqlx::query("DELETE FROM TextWarnings WHERE TextLocalizationId = ? AND Code = ?")
            .bind(warning.text_localization_id)
            .bind(&warning.code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_text_warnings(&self, text_id: i64) -> Result<Vec<PrebuildTextWarning>> {
        let mut conn = self.pool.acquire().await?;
        load_text_warnings(&mut conn, text_id).await
    }

    pub async fn get_all_text_warnings(&self) -> Result<Vec<PrebuildTextWarning>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM TextWarnings ORDER BY TextId, TextLocalizationId, Code",
            WARNING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(warning_from_row).collect())
    }
}
