use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Per-chat conversation state of the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSession {
    pub awaiting_phone: bool,
    pub awaiting_appeal: bool,
    pub active_test_id: Option<Uuid>,
    pub active_window_id: Option<Uuid>,
    pub active_group_link: Option<String>,
    pub active_question_count: Option<i32>,
    pub sent_test_message_ids: Vec<i64>,
}

impl Default for BotSession {
    fn default() -> Self {
        Self {
            awaiting_phone: true,
            awaiting_appeal: false,
            active_test_id: None,
            active_window_id: None,
            active_group_link: None,
            active_question_count: None,
            sent_test_message_ids: Vec::new(),
        }
    }
}

impl BotSession {
    /// Back to the menu with no test in progress.
    pub fn clear(&mut self) {
        self.awaiting_phone = false;
        self.awaiting_appeal = false;
        self.forget_test();
    }

    pub fn reset_to_phone(&mut self) {
        self.clear();
        self.awaiting_phone = true;
    }

    pub fn forget_test(&mut self) {
        self.active_test_id = None;
        self.active_window_id = None;
        self.active_group_link = None;
        self.active_question_count = None;
        self.sent_test_message_ids.clear();
    }
}

pub trait SessionStore: Send + Sync {
    fn get(&self, telegram_user_id: i64) -> BotSession;
    fn set(&self, telegram_user_id: i64, session: BotSession);
}

#[derive(Default)]
pub struct MemorySessionStore {
    items: Mutex<HashMap<i64, BotSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, telegram_user_id: i64) -> BotSession {
        let items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.get(&telegram_user_id).cloned().unwrap_or_default()
    }

    fn set(&self, telegram_user_id: i64, session: BotSession) {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.insert(telegram_user_id, session);
    }
}
