//! Text and localization persistence

use super::{now_millis, PrebuildStore};
use crate::types::PrebuildText;
use qdt_common::{Error, Language, Result, TextLocalizations};
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;

/// Insert a new text with all its present slots, returning it with assigned ids
pub(super) async fn insert_text(
    conn: &mut SqliteConnection,
    text: &PrebuildText,
) -> Result<PrebuildText> {
    let original = text
        .original
        .clone()
        .or_else(|| text.canonical_content().map(str::to_string));
    let timestamp = now_millis();

    let text_id = sqlx::query(
        "INSERT INTO Texts (Original, IsManuallyChecked, LastUpdateTimestamp) VALUES (?, ?, ?)",
    )
    .bind(&original)
    .bind(text.is_manually_checked)
    .bind(timestamp)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    let mut localizations = TextLocalizations::new();
    for (lang, local) in text.localizations.iter() {
        let localization_id = insert_localization(conn, text_id, lang, &local.content).await?;
        localizations.set(lang, local.content.clone(), Some(localization_id));
    }

    Ok(PrebuildText {
        localizations,
        text_id: Some(text_id),
        original,
        is_manually_checked: text.is_manually_checked,
        last_update_timestamp: Some(timestamp),
        warnings: Vec::new(),
    })
}

async fn insert_localization(
    conn: &mut SqliteConnection,
    text_id: i64,
    lang: Language,
    content: &str,
) -> Result<i64> {
    let id = sqlx::query(
        "INSERT INTO TextLocalizations (TextId, LanguageId, Content) VALUES (?, ?, ?)",
    )
    .bind(text_id)
    .bind(lang.language_id())
    .bind(content)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub(super) async fn load_text(conn: &mut SqliteConnection, text_id: i64) -> Result<PrebuildText> {
    let row = sqlx::query(
        "SELECT Original, IsManuallyChecked, LastUpdateTimestamp FROM Texts WHERE TextId = ?",
    )
    .bind(text_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("text {}", text_id)))?;

    let rows = sqlx::query(
        r#"
        SELECT TextLocalizationId, LanguageId, Content
        FROM TextLocalizations
        WHERE TextId = ?
        ORDER BY LanguageId
        "#,
    )
    .bind(text_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut localizations = TextLocalizations::new();
    for local_row in rows {
        let language_id: i64 = local_row.get("LanguageId");
        let lang = Language::from_id(language_id).ok_or_else(|| {
            Error::Invariant(format!("text {} has unknown language id {}", text_id, language_id))
        })?;
        localizations.set(
            lang,
            local_row.get::<String, _>("Content"),
            Some(local_row.get("TextLocalizationId")),
        );
    }

    Ok(PrebuildText {
        localizations,
        text_id: Some(text_id),
        original: row.get("Original"),
        is_manually_checked: row.get("IsManuallyChecked"),
        last_update_timestamp: row.get("LastUpdateTimestamp"),
        warnings: Vec::new(),
    })
}

/// Bring the stored text in line with `text`, slot by slot.
///
/// Absent slots are inserted, slots cleared in `text` are blanked (the row is
/// kept), changed slots are overwritten. The timestamp moves only on change.
pub(super) async fn sync_text(
    conn: &mut SqliteConnection,
    text_id: i64,
    text: &PrebuildText,
) -> Result<PrebuildText> {
    let stored = load_text(conn, text_id).await?;
    let mut changed = false;

    let existing: HashMap<Language, (Option<i64>, String)> = stored
        .localizations
        .iter()
        .map(|(lang, local)| (lang, (local.localization_id, local.content.clone())))
        .collect();

    let mut localizations = TextLocalizations::new();
    for lang in Language::ALL {
        match (text.localizations.get(lang), existing.get(&lang)) {
            (Some(local), Some((localization_id, content))) => {
                if &local.content != content {
                    sqlx::query("UPDATE TextLocalizations SET Content = ? WHERE TextId = ? AND LanguageId = ?")
                        .bind(&local.content)
                        .bind(text_id)
                        .bind(lang.language_id())
                        .execute(&mut *conn)
                        .await?;
                    changed = true;
                }
                localizations.set(lang, local.content.clone(), *localization_id);
            }
            (Some(local), None) => {
                let localization_id =
                    insert_localization(conn, text_id, lang, &local.content).await?;
                localizations.set(lang, local.content.clone(), Some(localization_id));
                changed = true;
            }
            (None, Some((localization_id, content))) => {
                if !content.is_empty() {
                    sqlx::query("UPDATE TextLocalizations SET Content = '' WHERE TextId = ? AND LanguageId = ?")
                        .bind(text_id)
                        .bind(lang.language_id())
                        .execute(&mut *conn)
                        .await?;
                    changed = true;
                }
                localizations.set(lang, "", *localization_id);
            }
            (None, None) => {}
        }
    }

    if text.is_manually_checked != stored.is_manually_checked {
        changed = true;
    }

    let mut last_update_timestamp = stored.last_update_timestamp;
    if changed {
        let timestamp = now_millis();
        sqlx::query("UPDATE Texts SET IsManuallyChecked = ?, LastUpdateTimestamp = ? WHERE TextId = ?")
            .bind(text.is_manually_checked)
            .bind(timestamp)
            .bind(text_id)
            .execute(&mut *conn)
            .await?;
        last_update_timestamp = Some(timestamp);
    }

    Ok(PrebuildText {
        localizations,
        text_id: Some(text_id),
        original: stored.original,
        is_manually_checked: text.is_manually_checked,
        last_update_timestamp,
        warnings: text.warnings.clone(),
    })
}

/// Sync a text that has an identity, insert one that does not
pub(super) async fn save_text(
    conn: &mut SqliteConnection,
    text: &PrebuildText,
) -> Result<PrebuildText> {
    match text.text_id {
        Some(text_id) => sync_text(conn, text_id, text).await,
        None => insert_text(conn, text).await,
    }
}

/// Remove a text with its slots and warnings
pub(super) async fn delete_text(conn: &mut SqliteConnection, text_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM TextWarnings WHERE TextId = ?")
        .bind(text_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM TextLocalizations WHERE TextId = ?")
        .bind(text_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM Texts WHERE TextId = ?")
        .bind(text_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl PrebuildStore {
    pub async fn get_text(&self, text_id: i64) -> Result<PrebuildText> {
        let mut conn = self.pool.acquire().await?;
        load_text(&mut conn, text_id).await
    }

    /// Persist slot contents and the manual-check flag of an existing text
    pub async fn update_text(&self, text: &PrebuildText) -> Result<PrebuildText> {
        let text_id = text
            .text_id
            .ok_or_else(|| Error::Invariant("update_text called on a text without id".to_string()))?;
        let mut tx = self.pool.begin().await?;
        let saved = sync_text(&mut tx, text_id, text).await?;
        tx.commit().await?;
        Ok(saved)
    }
}
