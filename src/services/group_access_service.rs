//! Temporary membership of restricted Telegram groups tied to an open test window.
//!
//! State is process-local: a restart drops pending joins and leave timers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::services::telegram_service::{ChatTarget, Messenger};
use crate::utils::telegram_link::{chat_target_from_link, is_private_invite_link};

pub const INVITE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
pub const LEAVE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

const JOINED_STATUSES: [&str; 4] = ["member", "administrator", "creator", "restricted"];

pub fn is_joined_status(status: &str) -> bool {
    JOINED_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Copy)]
struct PendingJoin {
    window_id: Uuid,
    expires_at: Instant,
}

struct LeaveTimer {
    token: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Sessions {
    pending_joins: HashMap<i64, PendingJoin>,
    chat_targets: HashMap<Uuid, ChatTarget>,
    leave_timers: HashMap<Uuid, LeaveTimer>,
    next_token: u64,
}

#[derive(Clone)]
pub struct GroupAccessController {
    messenger: Arc<dyn Messenger>,
    sessions: Arc<Mutex<Sessions>>,
    invite_ttl: Duration,
    leave_after: Duration,
}

impl GroupAccessController {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self::with_durations(messenger, INVITE_TTL, LEAVE_AFTER)
    }

    pub fn with_durations(messenger: Arc<dyn Messenger>, invite_ttl: Duration, leave_after: Duration) -> Self {
        Self {
            messenger,
            sessions: Arc::new(Mutex::new(Sessions::default())),
            invite_ttl,
            leave_after,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a single-use invite link for the window's group and remembers that
    /// this user is expected to join. Returns `None` when no link could be issued.
    pub async fn issue_invite(&self, telegram_user_id: i64, window_id: Uuid, group_link: &str) -> Option<String> {
        let Some(target) = chat_target_from_link(group_link) else {
            if is_private_invite_link(group_link) {
                tracing::warn!(%window_id, group_link, "private invite links cannot be resolved to a chat; invite skipped");
            } else {
                tracing::warn!(%window_id, group_link, "group link does not identify a chat; invite skipped");
            }
            return None;
        };

        let expire_date = chrono::Utc::now().timestamp() + self.invite_ttl.as_secs() as i64;
        let name = invite_name(window_id);

        let link = match self
            .messenger
            .create_invite_link(&target, &name, 1, expire_date)
            .await
        {
            Ok(link) => link,
            Err(err) => {
                tracing::warn!(%window_id, chat = %target, error = %err, "failed to create invite link");
                return None;
            }
        };

        self.sessions().pending_joins.insert(
            telegram_user_id,
            PendingJoin {
                window_id,
                expires_at: Instant::now() + self.invite_ttl,
            },
        );
        tracing::info!(%window_id, telegram_user_id, chat = %target, "group invite issued");
        Some(link)
    }

    /// Feeds a chat membership change. A live pending join turns into a scheduled removal.
    pub fn handle_member_update(&self, chat_id: i64, telegram_user_id: i64, status: &str) {
        if !is_joined_status(status) {
            return;
        }

        let mut sessions = self.sessions();
        let Some(pending) = sessions.pending_joins.remove(&telegram_user_id) else {
            return;
        };
        if Instant::now() > pending.expires_at {
            tracing::debug!(telegram_user_id, window_id = %pending.window_id, "pending join expired");
            return;
        }

        let target = ChatTarget::Id(chat_id);
        sessions.chat_targets.insert(pending.window_id, target.clone());
        self.schedule_leave(&mut sessions, pending.window_id, telegram_user_id, target);
        tracing::info!(telegram_user_id, chat_id, window_id = %pending.window_id, "student joined test group");
    }

    fn schedule_leave(&self, sessions: &mut Sessions, window_id: Uuid, telegram_user_id: i64, target: ChatTarget) {
        sessions.next_token += 1;
        let token = sessions.next_token;

        let controller = self.clone();
        let delay = self.leave_after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.fire_leave_timer(window_id, token, telegram_user_id, target).await;
        });

        if let Some(previous) = sessions.leave_timers.insert(window_id, LeaveTimer { token, handle }) {
            previous.handle.abort();
        }
    }

    async fn fire_leave_timer(&self, window_id: Uuid, token: u64, telegram_user_id: i64, target: ChatTarget) {
        {
            let mut sessions = self.sessions();
            match sessions.leave_timers.get(&window_id) {
                Some(timer) if timer.token == token => {}
                _ => return,
            }
            sessions.leave_timers.remove(&window_id);
            sessions.chat_targets.remove(&window_id);
        }
        tracing::info!(%window_id, telegram_user_id, "group access expired");
        self.kick(&target, telegram_user_id).await;
    }

    /// Removes the user right away and cancels any pending timer for the window.
    pub async fn revoke_now(&self, telegram_user_id: i64, window_id: Uuid, group_link: Option<&str>) {
        let (timer, observed) = {
            let mut sessions = self.sessions();
            if sessions
                .pending_joins
                .get(&telegram_user_id)
                .map_or(false, |p| p.window_id == window_id)
            {
                sessions.pending_joins.remove(&telegram_user_id);
            }
            (
                sessions.leave_timers.remove(&window_id),
                sessions.chat_targets.remove(&window_id),
            )
        };
        if let Some(timer) = timer {
            timer.handle.abort();
        }

        let Some(target) = observed.or_else(|| group_link.and_then(chat_target_from_link)) else {
            tracing::debug!(%window_id, telegram_user_id, "no group to revoke from");
            return;
        };
        self.kick(&target, telegram_user_id).await;
    }

    /// Forgets everything about the user's group session without kicking.
    pub fn clear(&self, telegram_user_id: i64, window_id: Option<Uuid>) {
        let mut sessions = self.sessions();
        sessions.pending_joins.remove(&telegram_user_id);
        if let Some(window_id) = window_id {
            if let Some(timer) = sessions.leave_timers.remove(&window_id) {
                timer.handle.abort();
            }
            sessions.chat_targets.remove(&window_id);
        }
    }

    /// Ban followed by unban: removes the member but lets them join again later.
    async fn kick(&self, target: &ChatTarget, telegram_user_id: i64) {
        if let Err(err) = self.messenger.ban_chat_member(target, telegram_user_id).await {
            tracing::warn!(chat = %target, telegram_user_id, error = %err, "failed to remove member from group");
            return;
        }
        if let Err(err) = self.messenger.unban_chat_member(target, telegram_user_id, true).await {
            tracing::warn!(chat = %target, telegram_user_id, error = %err, "failed to unban member after removal");
        }
    }

    pub fn has_pending_join(&self, telegram_user_id: i64) -> bool {
        self.sessions().pending_joins.contains_key(&telegram_user_id)
    }

    pub fn has_leave_timer(&self, window_id: Uuid) -> bool {
        self.sessions().leave_timers.contains_key(&window_id)
    }
}

pub fn invite_name(window_id: Uuid) -> String {
    let id = window_id.simple().to_string();
    format!("test-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::telegram_service::MockMessenger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const USER: i64 = 4242;
    const CHAT: i64 = -100_555;
    const LINK: &str = "https://t.me/anatomy_lesson";

    struct Calls {
        bans: Arc<AtomicUsize>,
        unbans: Arc<AtomicUsize>,
    }

    fn messenger() -> (MockMessenger, Calls) {
        let bans = Arc::new(AtomicUsize::new(0));
        let unbans = Arc::new(AtomicUsize::new(0));
        let mut mock = MockMessenger::new();

        mock.expect_create_invite_link()
            .withf(|chat, name, limit, _| {
                *chat == ChatTarget::Username("@anatomy_lesson".into()) && name.starts_with("test-") && *limit == 1
            })
            .returning(|_, _, _, _| Ok("https://t.me/+invite".to_string()));

        let counter = bans.clone();
        mock.expect_ban_chat_member()
            .withf(|chat, user| *chat == ChatTarget::Id(CHAT) && *user == USER)
            .returning(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let counter = unbans.clone();
        mock.expect_unban_chat_member()
            .withf(|chat, user, only_if_banned| *chat == ChatTarget::Id(CHAT) && *user == USER && *only_if_banned)
            .returning(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        (mock, Calls { bans, unbans })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn revoke_on_submit_supersedes_timer() {
        let (mock, calls) = messenger();
        let controller = GroupAccessController::new(Arc::new(mock));
        let window_id = Uuid::new_v4();

        let link = controller.issue_invite(USER, window_id, LINK).await;
        assert_eq!(link.as_deref(), Some("https://t.me/+invite"));
        assert!(controller.has_pending_join(USER));

        controller.handle_member_update(CHAT, USER, "member");
        assert!(controller.has_leave_timer(window_id));

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        controller.revoke_now(USER, window_id, Some(LINK)).await;
        assert!(!controller.has_leave_timer(window_id));

        tokio::time::sleep(Duration::from_secs(3 * 60 * 60)).await;
        settle().await;

        assert_eq!(calls.bans.load(Ordering::SeqCst), 1);
        assert_eq!(calls.unbans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_timer_fires_once_after_two_hours() {
        let (mock, calls) = messenger();
        let controller = GroupAccessController::new(Arc::new(mock));
        let window_id = Uuid::new_v4();

        controller.issue_invite(USER, window_id, LINK).await;
        controller.handle_member_update(CHAT, USER, "restricted");

        tokio::time::sleep(LEAVE_AFTER - Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(calls.bans.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(calls.bans.load(Ordering::SeqCst), 1);
        assert_eq!(calls.unbans.load(Ordering::SeqCst), 1);
        assert!(!controller.has_leave_timer(window_id));

        tokio::time::sleep(LEAVE_AFTER).await;
        settle().await;
        assert_eq!(calls.bans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_pending_join_is_ignored() {
        let (mock, calls) = messenger();
        let controller = GroupAccessController::new(Arc::new(mock));
        let window_id = Uuid::new_v4();

        controller.issue_invite(USER, window_id, LINK).await;
        tokio::time::sleep(INVITE_TTL + Duration::from_secs(1)).await;

        controller.handle_member_update(CHAT, USER, "member");
        assert!(!controller.has_pending_join(USER));
        assert!(!controller.has_leave_timer(window_id));

        tokio::time::sleep(LEAVE_AFTER * 2).await;
        settle().await;
        assert_eq!(calls.bans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_statuses_do_not_consume_pending_join() {
        let (mock, _calls) = messenger();
        let controller = GroupAccessController::new(Arc::new(mock));
        let window_id = Uuid::new_v4();

        controller.issue_invite(USER, window_id, LINK).await;
        controller.handle_member_update(CHAT, USER, "left");
        assert!(controller.has_pending_join(USER));
        assert!(!controller.has_leave_timer(window_id));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_without_kicking() {
        let (mock, calls) = messenger();
        let controller = GroupAccessController::new(Arc::new(mock));
        let window_id = Uuid::new_v4();

        controller.issue_invite(USER, window_id, LINK).await;
        controller.handle_member_update(CHAT, USER, "member");
        controller.clear(USER, Some(window_id));

        tokio::time::sleep(LEAVE_AFTER * 2).await;
        settle().await;
        assert_eq!(calls.bans.load(Ordering::SeqCst), 0);
        assert!(!controller.has_leave_timer(window_id));
    }

    #[tokio::test]
    async fn private_links_get_no_invite() {
        let controller = GroupAccessController::new(Arc::new(MockMessenger::new()));
        let link = controller
            .issue_invite(USER, Uuid::new_v4(), "https://t.me/+AbCdEfGh123")
            .await;
        assert!(link.is_none());
        assert!(!controller.has_pending_join(USER));
    }

    #[test]
    fn invite_name_uses_window_prefix() {
        let id = Uuid::parse_str("0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0").unwrap();
        assert_eq!(invite_name(id), "test-0f1e2d3c");
    }

    #[test]
    fn joined_statuses() {
        assert!(is_joined_status("member"));
        assert!(is_joined_status("creator"));
        assert!(!is_joined_status("kicked"));
        assert!(!is_joined_status("left"));
    }
}
