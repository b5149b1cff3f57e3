use std::sync::Arc;

use chrono::Datelike;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::dto::telegram_dto::{CallbackQuery, ChatMemberUpdated, Message, Update};
use crate::error::{Error, Result};
use crate::models::appeal::CreateAppeal;
use crate::models::student::{Actor, PersonType, Student};
use crate::services::access_window_service::{AccessWindowService, OpenOutcome};
use crate::services::bot_repository::BotRepository;
use crate::services::bot_texts::*;
use crate::services::group_access_service::GroupAccessController;
use crate::services::session_store::{BotSession, SessionStore};
use crate::services::telegram_service::Messenger;
use crate::utils::phone::{normalize_uz_phone, phone_variants};
use crate::utils::time::{month_bounds, now, today_utc};

const PARENT_RECENT_RESULTS: i64 = 10;

#[derive(Debug, Clone)]
pub struct BotSettings {
    pub web_base_url: String,
    pub admin_contact: String,
}

/// Routes Telegram updates to the student and parent flows.
#[derive(Clone)]
pub struct BotService {
    messenger: Arc<dyn Messenger>,
    sessions: Arc<dyn SessionStore>,
    repo: Arc<dyn BotRepository>,
    windows: AccessWindowService,
    group_access: GroupAccessController,
    settings: BotSettings,
}

enum Command {
    Start,
    Ping,
}

fn parse_command(text: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;
    let name = first.split('@').next().unwrap_or(first);
    match name {
        "/start" => Some(Command::Start),
        "/ping" => Some(Command::Ping),
        _ => None,
    }
}

impl BotService {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        sessions: Arc<dyn SessionStore>,
        repo: Arc<dyn BotRepository>,
        windows: AccessWindowService,
        group_access: GroupAccessController,
        settings: BotSettings,
    ) -> Self {
        Self {
            messenger,
            sessions,
            repo,
            windows,
            group_access,
            settings,
        }
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        tracing::debug!(update_id = update.update_id, "handling telegram update");

        if let Some(member) = update.chat_member {
            self.handle_chat_member(&member);
            return Ok(());
        }
        if let Some(callback) = update.callback_query {
            return self.handle_callback(callback).await;
        }
        let Some(message) = update.message else { return Ok(()) };
        if message.chat.r#type != "private" {
            return Ok(());
        }

        if message.contact.is_some() {
            return self.handle_contact(&message).await;
        }
        let Some(text) = message.text.clone() else { return Ok(()) };
        match parse_command(&text) {
            Some(Command::Start) => self.handle_start(&message).await,
            Some(Command::Ping) => self.reply(message.chat.id, PING_REPLY, None).await,
            None => self.handle_text(&message, text.trim()).await,
        }
    }

    fn handle_chat_member(&self, member: &ChatMemberUpdated) {
        self.group_access.handle_member_update(
            member.chat.id,
            member.new_chat_member.user.id,
            &member.new_chat_member.status,
        );
    }

    async fn reply(&self, chat_id: i64, text: &str, markup: Option<JsonValue>) -> Result<()> {
        self.messenger.send_message(chat_id, text, markup, false).await?;
        Ok(())
    }

    async fn handle_start(&self, message: &Message) -> Result<()> {
        let Some(from) = &message.from else { return Ok(()) };
        let chat_id = message.chat.id;

        let mut session = self.sessions.get(from.id);
        self.group_access.clear(from.id, session.active_window_id);

        let actor = self.repo.resolve_actor(from.id).await?;
        let Some(actor) = actor else {
            session.reset_to_phone();
            self.sessions.set(from.id, session);
            return self.reply(chat_id, WELCOME_ASK_PHONE, Some(phone_keyboard())).await;
        };

        session.clear();
        self.sessions.set(from.id, session);
        match actor {
            Actor::Student { student, .. } => {
                self.reply(chat_id, &student_welcome(&student.full_name), Some(student_menu_keyboard()))
                    .await
            }
            Actor::Parent { student } => {
                self.reply(chat_id, &parent_welcome(&student.full_name), Some(parent_menu_keyboard()))
                    .await
            }
        }
    }

    async fn handle_contact(&self, message: &Message) -> Result<()> {
        let (Some(from), Some(contact)) = (&message.from, &message.contact) else {
            return Ok(());
        };
        let chat_id = message.chat.id;

        if contact.user_id != Some(from.id) {
            return self.reply(chat_id, SEND_OWN_CONTACT, None).await;
        }

        let variants = phone_variants(&contact.phone_number);
        let Some(found) = self.repo.find_eligible_student_by_phone(&variants).await? else {
            tracing::info!(telegram_user_id = from.id, "contact did not match any eligible student");
            return self
                .reply(chat_id, &reject_text(&self.settings.admin_contact), Some(remove_keyboard()))
                .await;
        };

        let linked = match found.person_type {
            PersonType::Student => self.link_student(from.id, &found.student).await,
            PersonType::Parent => self.link_parent(from.id, &found.student).await,
        };

        match linked {
            Ok(Some(markup)) => {
                let mut session = self.sessions.get(from.id);
                session.clear();
                self.sessions.set(from.id, session);

                let text = match found.person_type {
                    PersonType::Student => student_welcome(&found.student.full_name),
                    PersonType::Parent => parent_welcome(&found.student.full_name),
                };
                self.reply(chat_id, &text, Some(markup)).await
            }
            Ok(None) => self.reply(chat_id, PARENT_PHONE_MISSING, None).await,
            Err(Error::Conflict(_)) => self.reply(chat_id, PHONE_USED_BY_OTHER_ROLE, None).await,
            Err(err) => {
                tracing::error!(telegram_user_id = from.id, error = %err, "failed to link contact");
                self.reply(chat_id, CONTACT_LINK_FAILED, None).await
            }
        }
    }

    /// Returns the menu to show, or `None` when the student has no parent phone on file.
    async fn link_student(&self, telegram_user_id: i64, student: &Student) -> Result<Option<JsonValue>> {
        let user_id = self
            .repo
            .ensure_student_user(student, &phone_variants(&student.phone))
            .await?;
        self.repo.link_user_telegram(user_id, telegram_user_id).await?;
        tracing::info!(telegram_user_id, %user_id, "student linked to telegram");
        Ok(Some(student_menu_keyboard()))
    }

    async fn link_parent(&self, telegram_user_id: i64, student: &Student) -> Result<Option<JsonValue>> {
        let parent_phone = normalize_uz_phone(student.parent_phone.as_deref().unwrap_or_default());
        if parent_phone.is_empty() {
            return Ok(None);
        }
        self.repo.upsert_parent_contact(&parent_phone, telegram_user_id).await?;
        tracing::info!(telegram_user_id, student_id = %student.id, "parent linked to telegram");
        Ok(Some(parent_menu_keyboard()))
    }

    async fn handle_text(&self, message: &Message, text: &str) -> Result<()> {
        let Some(from) = &message.from else { return Ok(()) };
        let chat_id = message.chat.id;
        let mut session = self.sessions.get(from.id);

        let Some(actor) = self.repo.resolve_actor(from.id).await? else {
            session.reset_to_phone();
            self.sessions.set(from.id, session);
            return self.reply(chat_id, TYPE_PHONE_VIA_BUTTON, Some(phone_keyboard())).await;
        };
        session.awaiting_phone = false;

        let result = match &actor {
            Actor::Student { user_id, student } => {
                self.student_text(chat_id, from.id, *user_id, student, &mut session, text)
                    .await
            }
            Actor::Parent { student } => self.parent_text(chat_id, from.id, student, &mut session, text).await,
        };
        self.sessions.set(from.id, session);
        result
    }

    async fn student_text(
        &self,
        chat_id: i64,
        telegram_user_id: i64,
        user_id: Uuid,
        student: &Student,
        session: &mut BotSession,
        text: &str,
    ) -> Result<()> {
        if session.awaiting_appeal && !STUDENT_BUTTONS.contains(&text) {
            if self
                .file_appeal(chat_id, telegram_user_id, student, PersonType::Student, text)
                .await?
            {
                session.awaiting_appeal = false;
            }
            return Ok(());
        }

        match text {
            STUDENT_BTN_APPEAL => {
                session.awaiting_appeal = true;
                self.reply(chat_id, APPEAL_PROMPT, Some(student_menu_keyboard())).await
            }
            STUDENT_BTN_RESULTS => {
                session.awaiting_appeal = false;
                self.show_monthly_results(chat_id, user_id).await
            }
            STUDENT_BTN_PAY => {
                session.awaiting_appeal = false;
                let debt = self.repo.student_debt(student.id, today_utc()).await?;
                self.reply(
                    chat_id,
                    &payment_info_text(&debt, &self.settings.admin_contact),
                    Some(student_menu_keyboard()),
                )
                .await
            }
            STUDENT_BTN_TEST => {
                session.awaiting_appeal = false;
                self.show_active_test(chat_id, user_id, session).await
            }
            _ if session.active_window_id.is_some() => {
                self.submit_answers(chat_id, telegram_user_id, user_id, session, text).await
            }
            _ => self.reply(chat_id, CHOOSE_BUTTON, Some(student_menu_keyboard())).await,
        }
    }

    async fn show_active_test(&self, chat_id: i64, user_id: Uuid, session: &mut BotSession) -> Result<()> {
        let Some(active) = self.windows.active_window(user_id, now()).await? else {
            return self.reply(chat_id, NO_ACTIVE_TEST, Some(student_menu_keyboard())).await;
        };

        session.active_test_id = Some(active.test.id);
        session.active_window_id = Some(active.window.id);
        session.active_group_link = active.test.telegram_group_link.clone();
        session.active_question_count = Some(active.test.total_questions);
        session.sent_test_message_ids.clear();

        if active.window.opened_at.is_some() {
            self.messenger
                .send_message(
                    chat_id,
                    &already_sent_text(active.test.total_questions),
                    Some(student_menu_keyboard()),
                    true,
                )
                .await?;
            return Ok(());
        }

        self.messenger
            .send_message(
                chat_id,
                &open_test_text(&active.test.title, active.test.lesson_number),
                Some(open_test_keyboard(active.test.id)),
                true,
            )
            .await?;
        Ok(())
    }

    async fn submit_answers(
        &self,
        chat_id: i64,
        telegram_user_id: i64,
        user_id: Uuid,
        session: &mut BotSession,
        text: &str,
    ) -> Result<()> {
        let (Some(window_id), Some(test_id)) = (session.active_window_id, session.active_test_id) else {
            return self.reply(chat_id, CHOOSE_BUTTON, Some(student_menu_keyboard())).await;
        };
        let total = session.active_question_count.unwrap_or_default();

        let receipt = match self.windows.submit(window_id, user_id, test_id, text, now()).await {
            Ok(receipt) => receipt,
            Err(Error::NoActiveWindow) | Err(Error::AlreadySubmitted) => {
                session.forget_test();
                return self
                    .reply(chat_id, NO_ACTIVE_TEST_FOR_YOU, Some(student_menu_keyboard()))
                    .await;
            }
            Err(Error::InvalidAnswerFormat) => {
                return self
                    .reply(chat_id, &format_error_text(total), Some(student_menu_keyboard()))
                    .await;
            }
            Err(Error::IncompleteAnswers(missing)) => {
                return self
                    .reply(chat_id, &incomplete_text(total, &missing), Some(student_menu_keyboard()))
                    .await;
            }
            Err(err) => return Err(err),
        };

        self.delete_messages(chat_id, &session.sent_test_message_ids).await;
        self.group_access
            .revoke_now(telegram_user_id, window_id, session.active_group_link.as_deref())
            .await;

        tracing::info!(%window_id, submission_id = %receipt.submission.id, "test answers accepted");
        session.clear();
        self.reply(chat_id, SUBMISSION_ACCEPTED, Some(student_menu_keyboard())).await
    }

    async fn show_monthly_results(&self, chat_id: i64, user_id: Uuid) -> Result<()> {
        let current = now();
        let (start, end) = month_bounds(current);
        let rows = self.repo.monthly_submissions(user_id, start, end).await?;
        if rows.is_empty() {
            return self.reply(chat_id, NO_MONTHLY_RESULTS, Some(student_menu_keyboard())).await;
        }
        let label = format!("{:02}.{}", current.month(), current.year());
        self.reply(chat_id, &monthly_results_text(&label, &rows), Some(student_menu_keyboard()))
            .await
    }

    async fn parent_text(
        &self,
        chat_id: i64,
        telegram_user_id: i64,
        student: &Student,
        session: &mut BotSession,
        text: &str,
    ) -> Result<()> {
        if session.awaiting_appeal && !PARENT_BUTTONS.contains(&text) {
            if self
                .file_appeal(chat_id, telegram_user_id, student, PersonType::Parent, text)
                .await?
            {
                session.awaiting_appeal = false;
            }
            return Ok(());
        }

        match text {
            PARENT_BTN_RESULTS => {
                session.awaiting_appeal = false;
                let rows = match student.user_id {
                    Some(user_id) => self.repo.recent_submissions(user_id, PARENT_RECENT_RESULTS).await?,
                    None => Vec::new(),
                };
                self.reply(chat_id, &recent_results_text(&rows), Some(parent_menu_keyboard()))
                    .await
            }
            PARENT_BTN_DEBT => {
                session.awaiting_appeal = false;
                let debt = self.repo.student_debt(student.id, today_utc()).await?;
                self.reply(
                    chat_id,
                    &parent_debt_text(&debt, &self.settings.admin_contact),
                    Some(parent_menu_keyboard()),
                )
                .await
            }
            PARENT_BTN_APPEAL => {
                session.awaiting_appeal = true;
                self.reply(chat_id, APPEAL_PROMPT, Some(parent_menu_keyboard())).await
            }
            // Anything else a parent writes is treated as an appeal.
            _ => {
                self.file_appeal(chat_id, telegram_user_id, student, PersonType::Parent, text)
                    .await?;
                Ok(())
            }
        }
    }

    /// Returns whether the appeal was saved.
    async fn file_appeal(
        &self,
        chat_id: i64,
        telegram_user_id: i64,
        student: &Student,
        sender: PersonType,
        text: &str,
    ) -> Result<bool> {
        let (keyboard, too_short, sender_type, sender_phone) = match sender {
            PersonType::Student => (
                student_menu_keyboard(),
                STUDENT_APPEAL_TOO_SHORT,
                "STUDENT",
                Some(student.phone.clone()),
            ),
            PersonType::Parent => (
                parent_menu_keyboard(),
                PARENT_APPEAL_TOO_SHORT,
                "PARENT",
                student.parent_phone.clone(),
            ),
        };

        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_APPEAL_CHARS {
            self.reply(chat_id, too_short, Some(keyboard)).await?;
            return Ok(false);
        }

        let appeal = self
            .repo
            .create_appeal(CreateAppeal {
                student_id: student.id,
                sender_type,
                sender_telegram_user_id: telegram_user_id,
                sender_phone,
                text: trimmed.to_string(),
            })
            .await?;
        tracing::info!(appeal_id = %appeal.id, student_id = %student.id, sender_type, "appeal filed");

        self.reply(chat_id, APPEAL_ACCEPTED, Some(keyboard)).await?;
        Ok(true)
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<()> {
        let data = callback.data.clone().unwrap_or_default();
        if !data.starts_with(OPEN_TEST_PREFIX) {
            self.messenger.answer_callback_query(&callback.id, None, false).await?;
            return Ok(());
        }

        match self.open_test(&callback, &data).await {
            Ok(None) => self.messenger.answer_callback_query(&callback.id, None, false).await,
            Ok(Some(alert)) => {
                self.messenger
                    .answer_callback_query(&callback.id, Some(alert.to_string()), true)
                    .await
            }
            Err(err) => {
                tracing::error!(telegram_user_id = callback.from.id, error = %err, "open test callback failed");
                self.messenger
                    .answer_callback_query(&callback.id, Some(TEST_OPEN_FAILED.to_string()), true)
                    .await
            }
        }
    }

    /// Runs the open flow. `Ok(Some(text))` is an alert to show on the button.
    async fn open_test(&self, callback: &CallbackQuery, data: &str) -> Result<Option<&'static str>> {
        let telegram_user_id = callback.from.id;
        let Some(Actor::Student { user_id, .. }) = self.repo.resolve_actor(telegram_user_id).await? else {
            return Ok(Some(START_FIRST));
        };

        let current = now();
        let active = match (parse_open_test_data(data), self.windows.active_window(user_id, current).await?) {
            (Some(test_id), Some(active)) if active.test.id == test_id => active,
            _ => return Ok(Some(TEST_CLOSED)),
        };

        let mut session = self.sessions.get(telegram_user_id);
        session.active_test_id = Some(active.test.id);
        session.active_window_id = Some(active.window.id);
        session.active_group_link = active.test.telegram_group_link.clone();
        session.active_question_count = Some(active.test.total_questions);

        if active.window.opened_at.is_some() {
            self.sessions.set(telegram_user_id, session);
            return Ok(Some(TEST_ALREADY_OPENED));
        }

        let opened = match self
            .windows
            .open(active.window.id, user_id, active.test.id, current)
            .await
        {
            Ok(OpenOutcome::Opened(opened)) => opened,
            Ok(OpenOutcome::AlreadyOpened(_)) => {
                self.sessions.set(telegram_user_id, session);
                return Ok(Some(BUTTON_ALREADY_USED));
            }
            Err(Error::NoActiveWindow) => return Ok(Some(TEST_CLOSED)),
            Err(err) => return Err(err),
        };

        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(telegram_user_id);

        session.sent_test_message_ids.clear();
        if opened.test.images.is_empty() {
            self.windows.rollback_open(opened.window.id).await?;
            self.sessions.set(telegram_user_id, session);
            return Ok(Some(TEST_HAS_NO_IMAGES));
        }

        match self.deliver_test(chat_id, &opened.test, &mut session.sent_test_message_ids).await {
            Ok(()) => {}
            Err(err) => {
                tracing::error!(window_id = %opened.window.id, error = %err, "failed to deliver test content");
                self.delete_messages(chat_id, &session.sent_test_message_ids).await;
                session.sent_test_message_ids.clear();
                self.windows.rollback_open(opened.window.id).await?;
                self.sessions.set(telegram_user_id, session);
                return Ok(Some(TEST_OPEN_FAILED));
            }
        }
        self.sessions.set(telegram_user_id, session);

        if let Some(link) = opened.test.telegram_group_link.as_deref() {
            if let Some(invite) = self
                .group_access
                .issue_invite(telegram_user_id, opened.window.id, link)
                .await
            {
                self.messenger
                    .send_message(chat_id, JOIN_GROUP_TEXT, Some(join_group_keyboard(&invite)), true)
                    .await?;
            }
        }
        Ok(None)
    }

    async fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) {
        for message_id in message_ids {
            if let Err(err) = self.messenger.delete_message(chat_id, *message_id).await {
                tracing::debug!(chat_id, message_id, error = %err, "could not delete test message");
            }
        }
    }

    async fn deliver_test(
        &self,
        chat_id: i64,
        test: &crate::models::test::Test,
        sent: &mut Vec<i64>,
    ) -> Result<()> {
        for image in &test.images {
            let url = resolve_image_url(&self.settings.web_base_url, &image.image_url);
            let message_id = self.messenger.send_photo(chat_id, &url, None, true).await?;
            sent.push(message_id);
        }
        let instruction = self
            .messenger
            .send_message(
                chat_id,
                &instruction_text(test.total_questions),
                Some(student_menu_keyboard()),
                true,
            )
            .await?;
        sent.push(instruction);
        Ok(())
    }
}
