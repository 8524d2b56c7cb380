//! Store schema
//!
//! Every text (test title, question, answer, comment) lives in `Texts` with one
//! `TextLocalizations` row per language. Localization rows are never deleted;
//! clearing a slot blanks its content so the row id stays stable for warnings.

use qdt_common::{Language, Result};
use sqlx::{SqliteConnection, SqlitePool};

/// Tables in dependency order (dropped in reverse)
const TABLES: &[&str] = &[
    "Languages",
    "Texts",
    "TextLocalizations",
    "Tests",
    "Questions",
    "Answers",
    "TextWarnings",
];

pub(super) async fn schema_exists(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'Texts'",
    )
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub(super) async fn drop_tables(conn: &mut SqliteConnection) -> Result<()> {
    for table in TABLES.iter().rev() {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(super) async fn create_tables(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Languages (
            LanguageId INTEGER PRIMARY KEY,
            LanguageName TEXT NOT NULL,
            LanguageCode TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Texts (
            TextId INTEGER PRIMARY KEY AUTOINCREMENT,
            Original TEXT,
            IsManuallyChecked INTEGER NOT NULL DEFAULT 0,
            LastUpdateTimestamp INTEGER
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS TextLocalizations (
            TextLocalizationId INTEGER PRIMARY KEY AUTOINCREMENT,
            TextId INTEGER NOT NULL REFERENCES Texts(TextId),
            LanguageId INTEGER NOT NULL REFERENCES Languages(LanguageId),
            Content TEXT NOT NULL,
            UNIQUE(TextId, LanguageId)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Tests (
            TestId INTEGER PRIMARY KEY,
            TitleTextId INTEGER NOT NULL REFERENCES Texts(TextId),
            Position INTEGER
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    // SortOrder keeps insertion order so composed questions stay after originals
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Questions (
            QuestionId INTEGER PRIMARY KEY,
            TestId INTEGER NOT NULL REFERENCES Tests(TestId),
            TextId INTEGER NOT NULL REFERENCES Texts(TextId),
            CommentTextId INTEGER REFERENCES Texts(TextId),
            Image TEXT,
            Audio TEXT,
            SortOrder INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Answers (
            AnswerId INTEGER PRIMARY KEY AUTOINCREMENT,
            QuestionId INTEGER NOT NULL REFERENCES Questions(QuestionId),
            TextId INTEGER NOT NULL REFERENCES Texts(TextId),
            IsRightAnswer INTEGER NOT NULL,
            Position INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS TextWarnings (
            TextWarningId INTEGER PRIMARY KEY AUTOINCREMENT,
            TextId INTEGER NOT NULL REFERENCES Texts(TextId),
            TextLocalizationId INTEGER NOT NULL REFERENCES TextLocalizations(TextLocalizationId),
            Code TEXT NOT NULL,
            Content TEXT NOT NULL,
            IsManuallyChecked INTEGER NOT NULL DEFAULT 0,
            LastUpdateTimestamp INTEGER,
            UNIQUE(TextLocalizationId, Code)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_questions_test ON Questions(TestId)")
        .execute(&mut *conn)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_answers_question ON Answers(QuestionId)")
        .execute(&mut *conn)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_text_warnings_text ON TextWarnings(TextId)")
        .execute(&mut *conn)
        .await?;

    tracing::debug!("Store tables created");
    Ok(())
}

pub(super) async fn seed_languages(conn: &mut SqliteConnection) -> Result<()> {
    for lang in Language::ALL {
        let info = lang.info();
        sqlx::query(
            "INSERT INTO Languages (LanguageId, LanguageName, LanguageCode) VALUES (?, ?, ?)",
        )
        .bind(info.language_id)
        .bind(info.name)
        .bind(info.code)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
