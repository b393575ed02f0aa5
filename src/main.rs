mod keyboards;
mod quiz;
mod storage;

use std::sync::Arc;

use dotenv::dotenv;
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{ChatId, ParseMode},
    utils::command::BotCommands,
};

use quiz::parser::parse_quiz_text;
use quiz::session::QuizSession;
use storage::QuizStore;

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type DialogueStorage = Arc<ErasedStorage<State>>;

/// Диалоговое состояние одного чата. Хранится в SQLite между
/// обновлениями, поэтому всё внутри сериализуемо.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    /// Ждём от автора текст квиза после /create.
    ReceiveQuizText,
    /// Идёт прохождение квиза.
    TakingQuiz { session: QuizSession },
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
enum Command {
    #[command(description = "начать работу с ботом")]
    Start,
    #[command(description = "создать новый квиз")]
    Create,
    #[command(description = "пример текста квиза")]
    Template,
    #[command(description = "пройти квиз")]
    Run,
    #[command(description = "мои результаты")]
    Results,
    #[command(description = "отменить текущее действие")]
    Cancel,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting quiz bot...");

    let bot = Bot::from_env();

    let dialogue_db =
        std::env::var("DIALOGUE_DB").unwrap_or_else(|_| "dialogues.sqlite".to_string());
    let storage: DialogueStorage = SqliteStorage::open(&dialogue_db, Json)
        .await
        .expect("Failed to open the dialogue storage")
        .erase();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://quiz_bot.db".to_string());
    let store = Arc::new(
        QuizStore::connect(&database_url)
            .await
            .expect("Failed to connect to the database"),
    );
    log::info!("Database ready at {}", database_url);

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, ErasedStorage<State>, State>()
                .branch(
                    teloxide::filter_command::<Command, _>()
                        .branch(dptree::case![Command::Start].endpoint(cmd_start))
                        .branch(dptree::case![Command::Create].endpoint(cmd_create))
                        .branch(dptree::case![Command::Template].endpoint(cmd_template))
                        .branch(dptree::case![Command::Run].endpoint(cmd_run))
                        .branch(dptree::case![Command::Results].endpoint(cmd_results))
                        .branch(dptree::case![Command::Cancel].endpoint(cmd_cancel)),
                )
                .branch(dptree::case![State::ReceiveQuizText].endpoint(receive_quiz_text))
                .branch(dptree::case![State::TakingQuiz { session }].endpoint(text_during_quiz))
                .branch(dptree::case![State::Start].endpoint(unknown_message)),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, ErasedStorage<State>, State>()
                .branch(
                    dptree::filter(|q: CallbackQuery| {
                        q.data
                            .as_deref()
                            .map_or(false, |data| data.starts_with("answer_"))
                    })
                    .branch(dptree::case![State::TakingQuiz { session }].endpoint(handle_answer))
                    .endpoint(stray_answer),
                )
                .endpoint(handle_menu_callback),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![storage, store])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

const WELCOME_TEXT: &str = "Добро пожаловать в QuizBot!\n\n\
    Вы можете:\n\
    - Создать новый квиз командой /create\n\
    - Пройти доступные квизы командой /run";

const CREATE_PROMPT: &str = "📝 Отправьте текст квиза в следующем формате:\n\n\
    Название квиза: Название\n\
    Описание: Описание квиза\n\n\
    Вопрос 1: Текст вопроса\n\
    1. Вариант 1\n\
    2. Вариант 2\n\
    3. Вариант 3\n\
    4. Вариант 4\n\
    Правильный ответ: 1\n\n\
    Вопрос 2: Текст вопроса\n\
    ... (и так далее)\n\n\
    Пример вы можете получить по команде /template";

const TEMPLATE_TEXT: &str = "Пример квиза:\n\n\
    Название квиза: Основы Rust\n\
    Описание: Тест по базовому синтаксису Rust\n\n\
    Вопрос 1: Как объявить вектор?\n\
    1. let v = vec![];\n\
    2. let v = {};\n\
    3. let v = ();\n\
    4. let v = <>;\n\
    Правильный ответ: 1\n\n\
    Вопрос 2: Какое ключевое слово делает переменную изменяемой?\n\
    1. var\n\
    2. mut\n\
    3. let\n\
    4. mod\n\
    Правильный ответ: 2";

async fn cmd_start(
    bot: Bot,
    store: Arc<QuizStore>,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    if let Some(user) = msg.from() {
        store
            .get_or_create_user(user.id.0 as i64, user.username.as_deref(), &user.full_name())
            .await?;
    }

    bot.send_message(msg.chat.id, WELCOME_TEXT)
        .reply_markup(keyboards::main_menu())
        .await?;

    dialogue.update(State::Start).await?;
    Ok(())
}

async fn cmd_create(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, CREATE_PROMPT).await?;
    dialogue.update(State::ReceiveQuizText).await?;
    Ok(())
}

async fn cmd_template(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, TEMPLATE_TEXT).await?;
    Ok(())
}

async fn cmd_run(
    bot: Bot,
    store: Arc<QuizStore>,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    dialogue.update(State::Start).await?;
    send_quiz_list(&bot, &store, msg.chat.id).await
}

async fn cmd_results(bot: Bot, store: Arc<QuizStore>, msg: Message) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = store
        .get_or_create_user(user.id.0 as i64, user.username.as_deref(), &user.full_name())
        .await?;

    let results = store.user_results(user_id).await?;
    if results.is_empty() {
        bot.send_message(
            msg.chat.id,
            "У вас пока нет результатов. Пройдите квиз командой /run",
        )
        .await?;
        return Ok(());
    }

    let mut text = String::from("📊 Ваши последние результаты:\n\n");
    for result in results {
        text.push_str(&format!(
            "📌 {}: {}/{} ({})\n",
            result.quiz_title,
            result.score,
            result.total_questions,
            result.completed_at.format("%d.%m.%Y %H:%M"),
        ));
    }
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn cmd_cancel(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    dialogue.update(State::Start).await?;
    bot.send_message(msg.chat.id, "Действие отменено")
        .reply_markup(keyboards::main_menu())
        .await?;
    Ok(())
}

/// Текстовое сообщение во время прохождения: ответы принимаются только
/// кнопками под вопросом.
async fn text_during_quiz(bot: Bot, _session: QuizSession, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Пожалуйста, отвечайте кнопками под вопросом. Прервать квиз можно командой /cancel",
    )
    .await?;
    Ok(())
}

async fn unknown_message(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Я вас не понял. Создайте квиз командой /create или пройдите квиз командой /run",
    )
    .await?;
    Ok(())
}

/// Текст квиза от автора после /create: парсим, при успехе сохраняем,
/// при ошибке формата показываем её и ждём исправленный текст.
async fn receive_quiz_text(
    bot: Bot,
    store: Arc<QuizStore>,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Пожалуйста, отправьте текст квиза")
            .await?;
        return Ok(());
    };
    if text.trim().to_lowercase() == "отмена" {
        return cmd_cancel(bot, dialogue, msg).await;
    }

    match parse_quiz_text(text) {
        Ok(parsed) => {
            let Some(user) = msg.from() else {
                return Ok(());
            };
            let user_id = store
                .get_or_create_user(user.id.0 as i64, user.username.as_deref(), &user.full_name())
                .await?;
            let quiz_id = store.create_quiz(&parsed, user_id).await?;
            log::info!(
                "User {} created quiz {} with {} questions",
                user_id,
                quiz_id,
                parsed.questions.len()
            );

            bot.send_message(
                msg.chat.id,
                format!("✅ Квиз <b>{}</b> успешно создан!", parsed.title),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::main_menu())
            .await?;
            dialogue.update(State::Start).await?;
        }
        Err(error) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "❌ Ошибка в формате квиза:\n{}\n\n\
                     Пожалуйста, исправьте и отправьте текст снова\n\
                     Или нажмите /cancel для отмены",
                    error
                ),
            )
            .await?;
        }
    }
    Ok(())
}

/// Ответ на вопрос активной сессии: callback-данные `answer_<вопрос>_<вариант>`.
async fn handle_answer(
    bot: Bot,
    store: Arc<QuizStore>,
    dialogue: QuizDialogue,
    mut session: QuizSession,
    q: CallbackQuery,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some(message) = q.message else {
        return Ok(());
    };
    let Some((question_index, chosen_index)) = q.data.as_deref().and_then(parse_answer_data)
    else {
        return Ok(());
    };

    let was_correct = match session.submit_answer_at(question_index, chosen_index) {
        Ok(was_correct) => was_correct,
        Err(error) => {
            // Дубликат доставки или устаревшая кнопка: состояние не трогаем
            log::warn!("Answer dropped in chat {}: {}", message.chat.id, error);
            return Ok(());
        }
    };

    let correct_text = session
        .question(question_index)
        .and_then(|question| question.options.get(question.correct_answer))
        .cloned()
        .unwrap_or_default();
    let feedback = format!(
        "{}\n\nПравильный ответ: {}",
        if was_correct {
            "✅ Правильно!"
        } else {
            "❌ Неправильно!"
        },
        correct_text
    );
    // Правка убирает кнопки вместе с текстом вопроса; если сообщение уже
    // было отредактировано, Telegram вернёт ошибку, которую можно опустить
    let _ = bot
        .edit_message_text(message.chat.id, message.id, feedback)
        .parse_mode(ParseMode::Html)
        .await;

    if session.is_complete() {
        let user = &q.from;
        let user_id = store
            .get_or_create_user(user.id.0 as i64, user.username.as_deref(), &user.full_name())
            .await?;
        let result = session.finish(user_id)?;
        store.save_result(&result).await?;
        log::info!(
            "User {} finished quiz {}: {}/{}",
            user_id,
            result.quiz_id,
            result.score,
            result.total_questions
        );

        bot.send_message(
            message.chat.id,
            format!(
                "🏆 Квиз завершен!\n\n\
                 Ваш результат: {}/{}\n\
                 Процент правильных ответов: {:.1}%",
                result.score, result.total_questions, result.percentage
            ),
        )
        .reply_markup(keyboards::quiz_result(result.quiz_id))
        .await?;
        dialogue.update(State::Start).await?;
    } else {
        send_current_question(&bot, message.chat.id, &session).await?;
        dialogue.update(State::TakingQuiz { session }).await?;
    }
    Ok(())
}

/// Нажатие кнопки ответа вне активной сессии: скорее всего дубликат
/// после завершения квиза. Признак сбоя порядка на транспорте, не
/// ошибка пользователя.
async fn stray_answer(bot: Bot, q: CallbackQuery) -> HandlerResult {
    log::warn!(
        "Answer callback without an active session from user {}: {:?}",
        q.from.id,
        q.data
    );
    bot.answer_callback_query(q.id).await?;
    Ok(())
}

async fn handle_menu_callback(
    bot: Bot,
    store: Arc<QuizStore>,
    dialogue: QuizDialogue,
    q: CallbackQuery,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some(message) = q.message else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let data = q.data.unwrap_or_default();

    if let Some(quiz_id) = data
        .strip_prefix("quiz_")
        .or_else(|| data.strip_prefix("retry_"))
        .and_then(|id| id.parse::<i64>().ok())
    {
        start_quiz(&bot, &store, &dialogue, chat_id, quiz_id).await?;
        return Ok(());
    }

    match data.as_str() {
        "run_quiz" => {
            dialogue.update(State::Start).await?;
            send_quiz_list(&bot, &store, chat_id).await?;
        }
        "create_quiz" => {
            bot.send_message(chat_id, CREATE_PROMPT).await?;
            dialogue.update(State::ReceiveQuizText).await?;
        }
        "main_menu" => {
            dialogue.update(State::Start).await?;
            bot.send_message(chat_id, "Что вы хотите сделать?")
                .reply_markup(keyboards::main_menu())
                .await?;
        }
        _ => log::debug!("Unknown callback data: {}", data),
    }
    Ok(())
}

/// Загружает квиз и открывает новую сессию. Отсутствующий или
/// деактивированный квиз -- штатный исход: возвращаем к списку выбора.
async fn start_quiz(
    bot: &Bot,
    store: &QuizStore,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    quiz_id: i64,
) -> HandlerResult {
    match store.quiz_by_id(quiz_id).await? {
        Some(stored) if stored.is_active => {
            let session = QuizSession::start(stored.id, &stored.quiz);
            let mut intro = format!("<b>{}</b>", stored.quiz.title);
            if !stored.quiz.description.is_empty() {
                intro.push('\n');
                intro.push_str(&stored.quiz.description);
            }
            bot.send_message(chat_id, intro)
                .parse_mode(ParseMode::Html)
                .await?;

            send_current_question(bot, chat_id, &session).await?;
            dialogue.update(State::TakingQuiz { session }).await?;
        }
        _ => {
            bot.send_message(chat_id, "⚠️ Квиз не найден!").await?;
            send_quiz_list(bot, store, chat_id).await?;
        }
    }
    Ok(())
}

async fn send_quiz_list(bot: &Bot, store: &QuizStore, chat_id: ChatId) -> HandlerResult {
    let quizzes = store.active_quizzes().await?;
    if quizzes.is_empty() {
        bot.send_message(chat_id, "❌ Нет доступных квизов для прохождения.")
            .await?;
        return Ok(());
    }
    bot.send_message(chat_id, "📋 Выберите квиз для прохождения:")
        .reply_markup(keyboards::quiz_list(&quizzes))
        .await?;
    Ok(())
}

async fn send_current_question(bot: &Bot, chat_id: ChatId, session: &QuizSession) -> HandlerResult {
    let Some(question) = session.current_question() else {
        return Ok(());
    };
    let text = format!(
        "❓ Вопрос {}/{}:\n\n{}",
        session.current_index() + 1,
        session.total_questions(),
        question.text
    );
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::question_options(
            session.current_index(),
            &question.options,
        ))
        .await?;
    Ok(())
}

fn parse_answer_data(data: &str) -> Option<(usize, usize)> {
    let (question_index, chosen_index) = data.strip_prefix("answer_")?.split_once('_')?;
    Some((question_index.parse().ok()?, chosen_index.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_data_round_trip() {
        assert_eq!(parse_answer_data("answer_3_1"), Some((3, 1)));
        assert_eq!(parse_answer_data("answer_0_12"), Some((0, 12)));
        assert_eq!(parse_answer_data("answer_x_1"), None);
        assert_eq!(parse_answer_data("quiz_3"), None);
    }
}
