//! Inline-клавиатуры бота.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::storage::QuizSummary;

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("📝 Создать квиз", "create_quiz"),
        InlineKeyboardButton::callback("🎮 Пройти квиз", "run_quiz"),
    ]])
}

/// Список доступных квизов, по одному в строке, плюс выход в меню.
pub fn quiz_list(quizzes: &[QuizSummary]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = quizzes
        .iter()
        .map(|quiz| {
            vec![InlineKeyboardButton::callback(
                format!("📌 {}", quiz.title),
                format!("quiz_{}", quiz.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "🏠 В главное меню",
        "main_menu",
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Варианты ответа на вопрос. Номер вопроса зашит в callback-данные,
/// чтобы сессия могла отбросить нажатие устаревшей кнопки.
pub fn question_options(question_index: usize, options: &[String]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(options.iter().enumerate().map(|(i, option)| {
        vec![InlineKeyboardButton::callback(
            format!("{}. {}", i + 1, option),
            format!("answer_{}_{}", question_index, i),
        )]
    }))
}

pub fn quiz_result(quiz_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🔄 Пройти еще раз", format!("retry_{}", quiz_id)),
            InlineKeyboardButton::callback("📋 К списку квизов", "run_quiz"),
        ],
        vec![InlineKeyboardButton::callback(
            "🏠 В главное меню",
            "main_menu",
        )],
    ])
}
