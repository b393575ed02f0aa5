pub mod parser;
pub mod session;

/// Верхний предел количества вопросов в одном квизе.
pub const MAX_QUESTIONS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Quiz {
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    /// 0-based индекс правильного варианта (во входном тексте нумерация с 1).
    pub correct_answer: usize,
}

impl Question {
    pub fn new(text: String, options: Vec<String>, correct_answer: usize) -> Self {
        Self {
            text,
            options,
            correct_answer,
        }
    }
}

/// Итог одного прохождения квиза, вычисляется при завершении сессии.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttemptResult {
    pub user_id: i64,
    pub quiz_id: i64,
    pub score: u32,
    pub total_questions: u32,
    pub percentage: f64,
}
