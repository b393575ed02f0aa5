//! SQLite-хранилище: пользователи, квизы, результаты прохождений.
//!
//! Логика бота ходит в базу только через [`QuizStore`]; вопросы квиза
//! хранятся одной JSON-колонкой и валидируются один раз при создании.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::quiz::{AttemptResult, Question, Quiz};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ошибка базы данных: {0}")]
    Db(#[from] sqlx::Error),
    #[error("повреждённое содержимое квиза: {0}")]
    Content(#[from] serde_json::Error),
}

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        telegram_id INTEGER NOT NULL UNIQUE,
        username TEXT,
        full_name TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS quizzes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        questions TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        creator_id INTEGER NOT NULL REFERENCES users(id),
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS quiz_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        quiz_id INTEGER NOT NULL REFERENCES quizzes(id),
        score INTEGER NOT NULL,
        total_questions INTEGER NOT NULL,
        completed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
];

/// Краткая строка списка квизов для клавиатуры выбора.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
}

/// Квиз, загруженный из базы, вместе с флагом активности.
#[derive(Debug, Clone)]
pub struct StoredQuiz {
    pub id: i64,
    pub quiz: Quiz,
    pub is_active: bool,
}

/// Строка истории результатов пользователя.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredResult {
    pub quiz_title: String,
    pub score: i64,
    pub total_questions: i64,
    pub completed_at: chrono::NaiveDateTime,
}

pub struct QuizStore {
    pool: SqlitePool,
}

impl QuizStore {
    /// Открывает базу (создавая файл при необходимости) и накатывает схему.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // SQLite сериализует записи сам; одно соединение также сохраняет
        // целостность баз `sqlite::memory:` в тестах
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Возвращает id пользователя, создавая запись при первом обращении.
    pub async fn get_or_create_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        full_name: &str,
    ) -> Result<i64, StoreError> {
        let existing = sqlx::query("SELECT id FROM users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = existing {
            return Ok(row.get("id"));
        }

        let inserted = sqlx::query(
            "INSERT INTO users (telegram_id, username, full_name) VALUES (?, ?, ?)",
        )
        .bind(telegram_id)
        .bind(username)
        .bind(full_name)
        .execute(&self.pool)
        .await?;
        Ok(inserted.last_insert_rowid())
    }

    /// Сохраняет валидированный квиз, возвращает его id.
    pub async fn create_quiz(&self, quiz: &Quiz, creator_id: i64) -> Result<i64, StoreError> {
        let questions = serde_json::to_string(&quiz.questions)?;
        let inserted = sqlx::query(
            "INSERT INTO quizzes (title, description, questions, creator_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(questions)
        .bind(creator_id)
        .execute(&self.pool)
        .await?;
        Ok(inserted.last_insert_rowid())
    }

    /// Активные квизы, новые первыми.
    pub async fn active_quizzes(&self) -> Result<Vec<QuizSummary>, StoreError> {
        let quizzes = sqlx::query_as::<_, QuizSummary>(
            "SELECT id, title FROM quizzes WHERE is_active = 1 ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(quizzes)
    }

    pub async fn quiz_by_id(&self, id: i64) -> Result<Option<StoredQuiz>, StoreError> {
        let row = sqlx::query(
            "SELECT id, title, description, questions, is_active FROM quizzes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let questions_json: String = row.get("questions");
        let questions: Vec<Question> = serde_json::from_str(&questions_json)?;
        Ok(Some(StoredQuiz {
            id: row.get("id"),
            quiz: Quiz {
                title: row.get("title"),
                description: row.get("description"),
                questions,
            },
            is_active: row.get("is_active"),
        }))
    }

    /// Активирует или деактивирует квиз. Возвращает, была ли найдена запись.
    pub async fn set_quiz_active(&self, id: i64, is_active: bool) -> Result<bool, StoreError> {
        let updated = sqlx::query("UPDATE quizzes SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(updated.rows_affected() > 0)
    }

    pub async fn save_result(&self, result: &AttemptResult) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO quiz_results (user_id, quiz_id, score, total_questions) VALUES (?, ?, ?, ?)",
        )
        .bind(result.user_id)
        .bind(result.quiz_id)
        .bind(i64::from(result.score))
        .bind(i64::from(result.total_questions))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Последние результаты пользователя, новые первыми.
    pub async fn user_results(&self, user_id: i64) -> Result<Vec<StoredResult>, StoreError> {
        let results = sqlx::query_as::<_, StoredResult>(
            "SELECT q.title AS quiz_title, r.score, r.total_questions, r.completed_at
             FROM quiz_results r
             JOIN quizzes q ON q.id = r.quiz_id
             WHERE r.user_id = ?
             ORDER BY r.completed_at DESC, r.id DESC
             LIMIT 10",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::Question;

    async fn memory_store() -> QuizStore {
        QuizStore::connect("sqlite::memory:").await.unwrap()
    }

    fn sample_quiz() -> Quiz {
        Quiz {
            title: "Тест".into(),
            description: "Проверка".into(),
            questions: vec![
                Question::new("Q1?".into(), vec!["A".into(), "B".into()], 1),
                Question::new("Q2?".into(), vec!["C".into(), "D".into()], 0),
            ],
        }
    }

    #[tokio::test]
    async fn get_or_create_user_is_idempotent() {
        let store = memory_store().await;
        let first = store
            .get_or_create_user(100, Some("user"), "Имя Фамилия")
            .await
            .unwrap();
        let second = store.get_or_create_user(100, None, "Имя").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn created_quiz_round_trips() {
        let store = memory_store().await;
        let user_id = store.get_or_create_user(100, None, "Автор").await.unwrap();
        let quiz = sample_quiz();
        let quiz_id = store.create_quiz(&quiz, user_id).await.unwrap();

        let stored = store.quiz_by_id(quiz_id).await.unwrap().unwrap();
        assert_eq!(stored.id, quiz_id);
        assert!(stored.is_active);
        assert_eq!(stored.quiz, quiz);

        assert!(store.quiz_by_id(quiz_id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivated_quiz_leaves_the_active_list() {
        let store = memory_store().await;
        let user_id = store.get_or_create_user(100, None, "Автор").await.unwrap();
        let quiz_id = store.create_quiz(&sample_quiz(), user_id).await.unwrap();

        assert_eq!(store.active_quizzes().await.unwrap().len(), 1);
        assert!(store.set_quiz_active(quiz_id, false).await.unwrap());
        assert!(store.active_quizzes().await.unwrap().is_empty());

        // Сам квиз остаётся доступен по id, но с выключенным флагом
        let stored = store.quiz_by_id(quiz_id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn saved_results_come_back_newest_first() {
        let store = memory_store().await;
        let user_id = store.get_or_create_user(100, None, "Игрок").await.unwrap();
        let quiz_id = store.create_quiz(&sample_quiz(), user_id).await.unwrap();

        for score in [1, 2] {
            store
                .save_result(&AttemptResult {
                    user_id,
                    quiz_id,
                    score,
                    total_questions: 2,
                    percentage: f64::from(score) * 50.0,
                })
                .await
                .unwrap();
        }

        let results = store.user_results(user_id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, 2);
        assert_eq!(results[1].score, 1);
        assert_eq!(results[0].quiz_title, "Тест");
        assert_eq!(results[0].total_questions, 2);
    }
}
