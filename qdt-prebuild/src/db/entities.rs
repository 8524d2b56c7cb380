//! Test, question and answer persistence

use super::texts::{delete_text, insert_text, load_text, save_text};
use super::warnings::load_text_warnings;
use super::PrebuildStore;
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildTest, PrebuildText};
use qdt_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;
use tracing::debug;

impl PrebuildStore {
    /// Insert a new test, returning it with assigned text ids
    pub async fn add_test(&self, test: &PrebuildTest) -> Result<PrebuildTest> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT TestId FROM Tests WHERE TestId = ?")
            .bind(test.test_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Err(Error::Invariant(format!("test {} already exists", test.test_id)));
        }

        let title = insert_text(&mut tx, &test.title).await?;
        sqlx::query("INSERT INTO Tests (TestId, TitleTextId, Position) VALUES (?, ?, ?)")
            .bind(test.test_id)
            .bind(title.text_id)
            .bind(test.position)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(test_id = test.test_id, "Test added");
        Ok(PrebuildTest {
            test_id: test.test_id,
            title,
            position: test.position,
        })
    }

    /// Insert a new question with its texts and answers
    pub async fn add_question(&self, question: &PrebuildQuestion) -> Result<PrebuildQuestion> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT QuestionId FROM Questions WHERE QuestionId = ?")
                .bind(question.question_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_some() {
            return Err(Error::Invariant(format!(
                "question {} already exists",
                question.question_id
            )));
        }
        let test_exists: Option<i64> = sqlx::query_scalar("SELECT TestId FROM Tests WHERE TestId = ?")
            .bind(question.test_id)
            .fetch_optional(&mut *tx)
            .await?;
        if test_exists.is_none() {
            return Err(Error::Invariant(format!(
                "question {} references unknown test {}",
                question.question_id, question.test_id
            )));
        }

        let text = insert_text(&mut tx, &question.text).await?;
        let comment_text = match &question.comment_text {
            Some(comment) => Some(insert_text(&mut tx, comment).await?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO Questions (QuestionId, TestId, TextId, CommentTextId, Image, Audio, SortOrder)
            VALUES (?, ?, ?, ?, ?, ?, (SELECT COALESCE(MAX(SortOrder), 0) + 1 FROM Questions))
            "#,
        )
        .bind(question.question_id)
        .bind(question.test_id)
        .bind(text.text_id)
        .bind(comment_text.as_ref().and_then(|c| c.text_id))
        .bind(&question.image)
        .bind(&question.audio)
        .execute(&mut *tx)
        .await?;

        let mut answers = Vec::with_capacity(question.answers.len());
        for (position, answer) in question.answers.iter().enumerate() {
            answers.push(insert_answer(&mut tx, question.question_id, position, answer).await?);
        }
        tx.commit().await?;

        debug!(question_id = question.question_id, test_id = question.test_id, "Question added");
        Ok(PrebuildQuestion {
            test_id: question.test_id,
            question_id: question.question_id,
            text,
            answers,
            image: question.image.clone(),
            audio: question.audio.clone(),
            comment_text,
        })
    }

    /// Replace the mutable fields of an existing test
    pub async fn update_test(&self, test: &PrebuildTest) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let title_text_id: i64 = sqlx::query_scalar("SELECT TitleTextId FROM Tests WHERE TestId = ?")
            .bind(test.test_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test {}", test.test_id)))?;

        let title = with_text_id(&test.title, title_text_id);
        save_text(&mut tx, &title).await?;
        sqlx::query("UPDATE Tests SET Position = ? WHERE TestId = ?")
            .bind(test.position)
            .bind(test.test_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace the mutable fields of an existing question.
    ///
    /// Answers are matched by `answer_id`: known ones are updated, new ones
    /// inserted, stored answers missing from `question` removed.
    pub async fn update_question(&self, question: &PrebuildQuestion) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT TextId, CommentTextId FROM Questions WHERE QuestionId = ?")
            .bind(question.question_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("question {}", question.question_id)))?;
        let text_id: i64 = row.get("TextId");
        let stored_comment_id: Option<i64> = row.get("CommentTextId");

        save_text(&mut tx, &with_text_id(&question.text, text_id)).await?;

        let comment_text_id = match &question.comment_text {
            Some(comment) => {
                let comment = match (comment.text_id, stored_comment_id) {
                    (None, Some(stored_id)) => with_text_id(comment, stored_id),
                    _ => comment.clone(),
                };
                save_text(&mut tx, &comment).await?.text_id
            }
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE Questions
            SET TestId = ?, CommentTextId = ?, Image = ?, Audio = ?
            WHERE QuestionId = ?
            "#,
        )
        .bind(question.test_id)
        .bind(comment_text_id)
        .bind(&question.image)
        .bind(&question.audio)
        .bind(question.question_id)
        .execute(&mut *tx)
        .await?;

        if let Some(stored_id) = stored_comment_id {
            if comment_text_id != Some(stored_id) {
                delete_text(&mut tx, stored_id).await?;
                debug!(question_id = question.question_id, text_id = stored_id, "Comment text removed");
            }
        }

        let stored_answers: Vec<(i64, i64)> =
            sqlx::query_as("SELECT AnswerId, TextId FROM Answers WHERE QuestionId = ?")
                .bind(question.question_id)
                .fetch_all(&mut *tx)
                .await?;

        let mut kept = HashSet::new();
        for (position, answer) in question.answers.iter().enumerate() {
            let stored = answer
                .answer_id
                .and_then(|id| stored_answers.iter().find(|(answer_id, _)| *answer_id == id));
            match stored {
                Some((answer_id, answer_text_id)) => {
                    save_text(&mut tx, &with_text_id(&answer.text, *answer_text_id)).await?;
                    sqlx::query("UPDATE Answers SET IsRightAnswer = ?, Position = ? WHERE AnswerId = ?")
                        .bind(answer.is_right_answer)
                        .bind(position as i64)
                        .bind(answer_id)
                        .execute(&mut *tx)
                        .await?;
                    kept.insert(*answer_id);
                }
                None => {
                    let inserted =
                        insert_answer(&mut tx, question.question_id, position, answer).await?;
                    if let Some(answer_id) = inserted.answer_id {
                        kept.insert(answer_id);
                    }
                }
            }
        }

        for (answer_id, answer_text_id) in stored_answers {
            if kept.contains(&answer_id) {
                continue;
            }
            sqlx::query("DELETE FROM Answers WHERE AnswerId = ?")
                .bind(answer_id)
                .execute(&mut *tx)
                .await?;
            delete_text(&mut tx, answer_text_id).await?;
            debug!(question_id = question.question_id, answer_id, "Answer removed");
        }

        tx.commit().await?;
        Ok(())
    }

    /// All tests ordered by position, then id
    pub async fn get_tests(&self) -> Result<Vec<PrebuildTest>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT TestId, TitleTextId, Position FROM Tests ORDER BY Position, TestId")
            .fetch_all(&mut *conn)
            .await?;

        let mut tests = Vec::with_capacity(rows.len());
        for row in rows {
            tests.push(PrebuildTest {
                test_id: row.get("TestId"),
                title: load_text(&mut conn, row.get("TitleTextId")).await?,
                position: row.get("Position"),
            });
        }
        Ok(tests)
    }

    /// All questions in insertion order
    pub async fn get_questions(&self) -> Result<Vec<PrebuildQuestion>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT QuestionId, TestId, TextId, CommentTextId, Image, Audio
            FROM Questions
            ORDER BY SortOrder
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(load_question(&mut conn, &row, false).await?);
        }
        Ok(questions)
    }

    /// Questions of one test, with text warnings attached to every text
    pub async fn get_questions_by_test(&self, test_id: i64) -> Result<Vec<PrebuildQuestion>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT QuestionId, TestId, TextId, CommentTextId, Image, Audio
            FROM Questions
            WHERE TestId = ?
            ORDER BY SortOrder
            "#,
        )
        .bind(test_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(load_question(&mut conn, &row, true).await?);
        }
        Ok(questions)
    }
}

fn with_text_id(text: &PrebuildText, text_id: i64) -> PrebuildText {
    let mut text = text.clone();
    text.text_id = Some(text_id);
    text
}

async fn insert_answer(
    conn: &mut SqliteConnection,
    question_id: i64,
    position: usize,
    answer: &PrebuildAnswer,
) -> Result<PrebuildAnswer> {
    let text = insert_text(conn, &answer.text).await?;
    let answer_id = sqlx::query(
        r#"
        INSERT INTO Answers (AnswerId, QuestionId, TextId, IsRightAnswer, Position)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(answer.answer_id)
    .bind(question_id)
    .bind(text.text_id)
    .bind(answer.is_right_answer)
    .bind(position as i64)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(PrebuildAnswer {
        answer_id: Some(answer_id),
        text,
        is_right_answer: answer.is_right_answer,
    })
}

async fn load_text_with_warnings(
    conn: &mut SqliteConnection,
    text_id: i64,
    with_warnings: bool,
) -> Result<PrebuildText> {
    let mut text = load_text(conn, text_id).await?;
    if with_warnings {
        text.warnings = load_text_warnings(conn, text_id).await?;
    }
    Ok(text)
}

async fn load_question(
    conn: &mut SqliteConnection,
    row: &SqliteRow,
    with_warnings: bool,
) -> Result<PrebuildQuestion> {
    let question_id: i64 = row.get("QuestionId");
    let comment_text_id: Option<i64> = row.get("CommentTextId");

    let text = load_text_with_warnings(conn, row.get("TextId"), with_warnings).await?;
    let comment_text = match comment_text_id {
        Some(id) => Some(load_text_with_warnings(conn, id, with_warnings).await?),
        None => None,
    };

    let answer_rows = sqlx::query(
        r#"
        SELECT AnswerId, TextId, IsRightAnswer
        FROM Answers
        WHERE QuestionId = ?
        ORDER BY Position, AnswerId
        "#,
    )
    .bind(question_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut answers = Vec::with_capacity(answer_rows.len());
    for answer_row in answer_rows {
        answers.push(PrebuildAnswer {
            answer_id: Some(answer_row.get("AnswerId")),
            text: load_text_with_warnings(conn, answer_row.get("TextId"), with_warnings).await?,
            is_right_answer: answer_row.get("IsRightAnswer"),
        });
    }

    Ok(PrebuildQuestion {
        test_id: row.get("TestId"),
        question_id,
        text,
        answers,
        image: row.get("Image"),
        audio: row.get("Audio"),
        comment_text,
    })
}
