//! Парсер авторского текста квиза.
//!
//! Формат:
//! ```text
//! Название: Название квиза
//! Описание: Описание квиза
//!
//! Вопрос 1: Текст вопроса
//! 1. Вариант 1
//! 2. Вариант 2
//! 3. Вариант 3
//! Правильный ответ: 1
//!
//! Вопрос 2: ...
//! ```

use thiserror::Error;

use super::{Question, Quiz, MAX_QUESTIONS};

/// Единственный вид ошибки на границе парсера: любое структурное или
/// семантическое нарушение формата приходит к автору этим типом с
/// человекочитаемым описанием.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct QuizValidationError(pub String);

impl QuizValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Разбирает текст квиза в валидированную структуру.
///
/// Один проход слева направо по непустым строкам с одним «открытым»
/// вопросом-накопителем; частично собранный `Quiz` наружу не выходит.
pub fn parse_quiz_text(raw_text: &str) -> Result<Quiz, QuizValidationError> {
    let text = sanitize_input(raw_text);
    if text.is_empty() {
        return Err(QuizValidationError::new("Текст квиза пуст"));
    }

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() < 5 {
        return Err(QuizValidationError::new("Текст слишком короткий для квиза"));
    }

    let mut acc = Accumulator::default();
    for line in lines {
        if let Some(value) = header_value(line, "Название") {
            // Повторный заголовок перезаписывает предыдущий
            acc.title = value.to_string();
        } else if let Some(value) = header_value(line, "Описание") {
            acc.description = value.to_string();
        } else if line.starts_with("Вопрос") || line.starts_with("Question") {
            acc.finalize_in_progress();
            acc.in_progress = Some(QuestionDraft {
                text: parse_question_line(line)?,
                ..QuestionDraft::default()
            });
        } else if let Some(option) = option_text(line) {
            let Some(question) = acc.in_progress.as_mut() else {
                return Err(QuizValidationError::new("Вариант ответа без вопроса"));
            };
            question.options.push(option.to_string());
        } else if line.starts_with("Правильный ответ") || line.starts_with("Correct answer") {
            let Some(question) = acc.in_progress.as_mut() else {
                return Err(QuizValidationError::new("Ответ без вопроса"));
            };
            question.correct_answer = Some(parse_correct_answer(line)?);
        }
        // Нераспознанные строки пропускаются
    }
    acc.finalize_in_progress();

    acc.into_quiz()
}

/// Удаляет BOM и внешние пробелы, экранирует HTML-разметку: текст квиза
/// позже уходит в сообщения с `parse_mode = HTML` как есть.
fn sanitize_input(text: &str) -> String {
    let text = text.trim_start_matches('\u{feff}').trim();
    html_escape::encode_safe(text).into_owned()
}

/// Значение заголовка: `"Название: X"` либо `"Название квиза: X"`.
fn header_value<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    let rest = rest.strip_prefix(" квиза").unwrap_or(rest);
    Some(rest.strip_prefix(':')?.trim())
}

fn parse_question_line(line: &str) -> Result<String, QuizValidationError> {
    match line.split_once(':') {
        Some((_, text)) => Ok(text.trim().to_string()),
        None => Err(QuizValidationError::new(
            "Неверный формат вопроса. Ожидается 'Вопрос N: текст вопроса'",
        )),
    }
}

/// Строка варианта ответа: `"<цифры>. текст"`.
fn option_text(line: &str) -> Option<&str> {
    let (number, rest) = line.split_once('.')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(rest.trim())
}

/// Номер правильного ответа: во входном тексте с 1, внутри храним с 0.
fn parse_correct_answer(line: &str) -> Result<usize, QuizValidationError> {
    let number = line
        .split_once(':')
        .and_then(|(_, value)| value.trim().parse::<i64>().ok());
    match number {
        Some(n) if n > 0 => Ok((n - 1) as usize),
        _ => Err(QuizValidationError::new("Неверный формат правильного ответа")),
    }
}

/// Вопрос в процессе сборки: ответ может быть ещё не указан.
#[derive(Debug, Default)]
struct QuestionDraft {
    text: String,
    options: Vec<String>,
    correct_answer: Option<usize>,
}

impl QuestionDraft {
    fn validate(self) -> Result<Question, QuizValidationError> {
        if self.text.is_empty() {
            return Err(QuizValidationError::new("Текст вопроса не может быть пустым"));
        }
        if self.options.len() < 2 {
            return Err(QuizValidationError::new("Должно быть минимум 2 варианта ответа"));
        }
        let Some(correct_answer) = self.correct_answer else {
            return Err(QuizValidationError::new("Не указан правильный ответ"));
        };
        if correct_answer >= self.options.len() {
            return Err(QuizValidationError::new(format!(
                "Номер правильного ответа ({}) превышает количество вариантов ({})",
                correct_answer + 1,
                self.options.len()
            )));
        }
        Ok(Question::new(self.text, self.options, correct_answer))
    }
}

/// Явный накопитель одного прохода: поля квиза плюс «открытый» вопрос.
#[derive(Debug, Default)]
struct Accumulator {
    title: String,
    description: String,
    questions: Vec<QuestionDraft>,
    in_progress: Option<QuestionDraft>,
}

impl Accumulator {
    fn finalize_in_progress(&mut self) {
        if let Some(question) = self.in_progress.take() {
            self.questions.push(question);
        }
    }

    /// Финальная валидация всей структуры. Ошибки отдельных вопросов
    /// получают префикс с номером вопроса (нумерация с 1).
    fn into_quiz(self) -> Result<Quiz, QuizValidationError> {
        if self.title.is_empty() {
            return Err(QuizValidationError::new("Не указано название квиза"));
        }
        if self.questions.is_empty() {
            return Err(QuizValidationError::new(
                "Квиз должен содержать хотя бы один вопрос",
            ));
        }
        if self.questions.len() > MAX_QUESTIONS {
            return Err(QuizValidationError::new(format!(
                "Максимум {} вопросов в квизе",
                MAX_QUESTIONS
            )));
        }

        let mut questions = Vec::with_capacity(self.questions.len());
        for (i, draft) in self.questions.into_iter().enumerate() {
            let question = draft
                .validate()
                .map_err(|e| QuizValidationError(format!("Вопрос {}: {}", i + 1, e.0)))?;
            questions.push(question);
        }

        Ok(Quiz {
            title: self.title,
            description: self.description,
            questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_quiz_text(question_count: usize) -> String {
        let mut text = String::from("Название: Тест\nОписание: Проверка\n");
        for n in 1..=question_count {
            text.push_str(&format!(
                "Вопрос {n}: Вопрос номер {n}?\n1. Первый\n2. Второй\n3. Третий\nПравильный ответ: 2\n"
            ));
        }
        text
    }

    #[test]
    fn parses_valid_quiz_in_input_order() {
        let quiz = parse_quiz_text(&valid_quiz_text(3)).unwrap();
        assert_eq!(quiz.title, "Тест");
        assert_eq!(quiz.description, "Проверка");
        assert_eq!(quiz.questions.len(), 3);
        for (i, question) in quiz.questions.iter().enumerate() {
            assert_eq!(question.text, format!("Вопрос номер {}?", i + 1));
            assert_eq!(question.options, vec!["Первый", "Второй", "Третий"]);
            assert_eq!(question.correct_answer, 1);
        }
    }

    #[test]
    fn parses_concrete_scenario() {
        let quiz = parse_quiz_text(
            "Название: T\nОписание: D\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: 2",
        )
        .unwrap();
        assert_eq!(quiz.title, "T");
        assert_eq!(quiz.description, "D");
        assert_eq!(
            quiz.questions,
            vec![Question::new("Q1?".into(), vec!["A".into(), "B".into()], 1)]
        );
    }

    #[test]
    fn accepts_english_keywords() {
        let quiz = parse_quiz_text(
            "Название: T\nQuestion 1: Q1?\n1. A\n2. B\nCorrect answer: 1\n",
        )
        .unwrap();
        assert_eq!(quiz.questions[0].correct_answer, 0);
    }

    #[test]
    fn accepts_title_with_kviza_suffix() {
        let quiz = parse_quiz_text(
            "Название квиза: T\nОписание квиза: D\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: 1",
        )
        .unwrap();
        assert_eq!(quiz.title, "T");
        assert_eq!(quiz.description, "D");
    }

    #[test]
    fn strips_bom_and_whitespace() {
        let text = format!("\u{feff}  {}  ", valid_quiz_text(1));
        assert!(parse_quiz_text(&text).is_ok());
    }

    #[test]
    fn escapes_html_in_text() {
        let quiz = parse_quiz_text(
            "Название: <b>T</b>\nВопрос 1: Q1?\n1. a < b\n2. B\nПравильный ответ: 1",
        )
        .unwrap();
        assert_eq!(quiz.title, "&lt;b&gt;T&lt;/b&gt;");
        assert_eq!(quiz.questions[0].options[0], "a &lt; b");
    }

    #[test]
    fn repeated_title_last_write_wins() {
        let quiz = parse_quiz_text(
            "Название: Первое\nНазвание: Второе\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: 1",
        )
        .unwrap();
        assert_eq!(quiz.title, "Второе");
    }

    #[test]
    fn empty_input_fails() {
        let err = parse_quiz_text("   ").unwrap_err();
        assert_eq!(err.0, "Текст квиза пуст");
    }

    #[test]
    fn too_short_input_fails() {
        let err = parse_quiz_text("Название: T\nВопрос 1: Q?\n").unwrap_err();
        assert_eq!(err.0, "Текст слишком короткий для квиза");
    }

    #[test]
    fn missing_title_mentions_title() {
        let err = parse_quiz_text(
            "Описание: D\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: 1",
        )
        .unwrap_err();
        assert!(err.0.contains("название"), "{}", err.0);
    }

    #[test]
    fn no_questions_fails() {
        let err = parse_quiz_text(
            "Название: T\nОписание: D\nпросто строка\nещё строка\nи ещё одна",
        )
        .unwrap_err();
        assert_eq!(err.0, "Квиз должен содержать хотя бы один вопрос");
    }

    #[test]
    fn too_many_questions_mentions_limit() {
        let err = parse_quiz_text(&valid_quiz_text(MAX_QUESTIONS + 1)).unwrap_err();
        assert!(err.0.contains("50"), "{}", err.0);
    }

    #[test]
    fn fifty_questions_is_still_valid() {
        let quiz = parse_quiz_text(&valid_quiz_text(MAX_QUESTIONS)).unwrap();
        assert_eq!(quiz.questions.len(), MAX_QUESTIONS);
    }

    #[test]
    fn option_before_any_question_fails() {
        let err = parse_quiz_text(
            "Название: T\n1. A\nВопрос 1: Q1?\n2. B\nПравильный ответ: 1",
        )
        .unwrap_err();
        assert_eq!(err.0, "Вариант ответа без вопроса");
    }

    #[test]
    fn answer_before_any_question_fails() {
        let err = parse_quiz_text(
            "Название: T\nПравильный ответ: 1\nВопрос 1: Q1?\n1. A\n2. B",
        )
        .unwrap_err();
        assert_eq!(err.0, "Ответ без вопроса");
    }

    #[test]
    fn non_numeric_answer_fails() {
        let err = parse_quiz_text(
            "Название: T\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: два",
        )
        .unwrap_err();
        assert_eq!(err.0, "Неверный формат правильного ответа");
    }

    #[test]
    fn non_positive_answer_fails() {
        let err = parse_quiz_text(
            "Название: T\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: 0",
        )
        .unwrap_err();
        assert_eq!(err.0, "Неверный формат правильного ответа");
    }

    #[test]
    fn out_of_range_answer_fails_with_question_number() {
        let err = parse_quiz_text(
            "Название: T\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: 5",
        )
        .unwrap_err();
        assert_eq!(
            err.0,
            "Вопрос 1: Номер правильного ответа (5) превышает количество вариантов (2)"
        );
    }

    #[test]
    fn missing_answer_fails_with_question_number() {
        let err = parse_quiz_text(
            "Название: T\nВопрос 1: Q1?\n1. A\n2. B\nВопрос 2: Q2?\n1. A\n2. B\nПравильный ответ: 1",
        )
        .unwrap_err();
        assert_eq!(err.0, "Вопрос 1: Не указан правильный ответ");
    }

    #[test]
    fn too_few_options_fails_with_question_number() {
        let err = parse_quiz_text(
            "Название: T\nОписание: D\nВопрос 1: Q1?\n1. A\nПравильный ответ: 1",
        )
        .unwrap_err();
        assert_eq!(err.0, "Вопрос 1: Должно быть минимум 2 варианта ответа");
    }

    #[test]
    fn empty_question_text_fails() {
        let err = parse_quiz_text(
            "Название: T\nВопрос 1:\n1. A\n2. B\nПравильный ответ: 1",
        )
        .unwrap_err();
        assert_eq!(err.0, "Вопрос 1: Текст вопроса не может быть пустым");
    }

    #[test]
    fn unrecognized_lines_are_skipped() {
        let quiz = parse_quiz_text(
            "Название: T\nкакой-то комментарий\nВопрос 1: Q1?\n1. A\n2. B\nПравильный ответ: 1",
        )
        .unwrap();
        assert_eq!(quiz.questions.len(), 1);
    }

    #[test]
    fn question_line_without_colon_fails() {
        let err = parse_quiz_text(
            "Название: T\nВопрос 1\n1. A\n2. B\nПравильный ответ: 1",
        )
        .unwrap_err();
        assert!(err.0.contains("Неверный формат вопроса"), "{}", err.0);
    }
}
