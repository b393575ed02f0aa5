//! Машина состояний одного прохождения квиза.
//!
//! Сессия живёт внутри диалогового состояния teloxide и сериализуется
//! между ходами, поэтому держит снимок вопросов, а не ссылку на квиз.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AttemptResult, Question, Quiz};

/// Нарушение порядка ходов. Это признак ошибки транспортного слоя
/// (дубликат доставки, устаревшая кнопка), а не ошибки пользователя:
/// логируется, но пользователю как ошибка не показывается.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("ответ отправлен в уже завершённую сессию")]
    AlreadyComplete,
    #[error("ответ на вопрос {got}, но текущий вопрос {expected}")]
    StaleAnswer { expected: usize, got: usize },
    #[error("сессия ещё не завершена")]
    NotComplete,
}

/// Одна попытка одного пользователя: текущий вопрос и счёт.
///
/// Каждый отвеченный вопрос ровно один раз сдвигает `current_index`
/// и увеличивает `correct_count`, если ответ был верным.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    quiz_id: i64,
    questions: Vec<Question>,
    current_index: usize,
    correct_count: u32,
}

impl QuizSession {
    pub fn start(quiz_id: i64, quiz: &Quiz) -> Self {
        Self {
            quiz_id,
            questions: quiz.questions.clone(),
            current_index: 0,
            correct_count: 0,
        }
    }

    pub fn quiz_id(&self) -> i64 {
        self.quiz_id
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.questions.len()
    }

    /// Текущий вопрос, либо `None` после завершения.
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Принимает ответ на текущий вопрос и сдвигает сессию на один ход.
    ///
    /// Индекс за пределами вариантов (устаревшая кнопка) считается просто
    /// неправильным ответом, сессия всё равно продвигается. Возвращает,
    /// был ли ответ правильным.
    pub fn submit_answer(&mut self, chosen_index: usize) -> Result<bool, SessionError> {
        let Some(question) = self.questions.get(self.current_index) else {
            return Err(SessionError::AlreadyComplete);
        };
        let was_correct = chosen_index == question.correct_answer;
        if was_correct {
            self.correct_count += 1;
        }
        self.current_index += 1;
        Ok(was_correct)
    }

    /// То же, что [`submit_answer`](Self::submit_answer), но с защитой от
    /// повторной доставки: ответ принимается, только если он адресован
    /// именно текущему вопросу. Повтор для уже отвеченного вопроса
    /// отклоняется без изменения состояния.
    pub fn submit_answer_at(
        &mut self,
        question_index: usize,
        chosen_index: usize,
    ) -> Result<bool, SessionError> {
        if self.is_complete() {
            return Err(SessionError::AlreadyComplete);
        }
        if question_index != self.current_index {
            return Err(SessionError::StaleAnswer {
                expected: self.current_index,
                got: question_index,
            });
        }
        self.submit_answer(chosen_index)
    }

    /// Итог попытки. Допустим только после ответа на все вопросы.
    pub fn finish(&self, user_id: i64) -> Result<AttemptResult, SessionError> {
        if !self.is_complete() {
            return Err(SessionError::NotComplete);
        }
        let total = self.questions.len() as u32;
        // Квиз без вопросов не проходит валидацию парсера
        debug_assert!(total > 0);
        Ok(AttemptResult {
            user_id,
            quiz_id: self.quiz_id,
            score: self.correct_count,
            total_questions: total,
            percentage: f64::from(self.correct_count) * 100.0 / f64::from(total),
        })
    }
}
