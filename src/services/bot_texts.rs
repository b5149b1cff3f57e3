//! User-facing texts, reply keyboards and formatters of the bot (Uzbek UI).

use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::models::submission::SubmissionSummary;
use crate::services::debt_service::DebtSummary;
use crate::utils::time::format_date_time;

pub const STUDENT_BTN_TEST: &str = "📝 Test ishlash";
pub const STUDENT_BTN_PAY: &str = "💳 To'lov qilish";
pub const STUDENT_BTN_RESULTS: &str = "📊 Natijalarim";
pub const STUDENT_BTN_APPEAL: &str = "✍️ E'tiroz bildirish";
pub const STUDENT_BUTTONS: [&str; 4] = [STUDENT_BTN_TEST, STUDENT_BTN_PAY, STUDENT_BTN_RESULTS, STUDENT_BTN_APPEAL];

pub const PARENT_BTN_RESULTS: &str = "📘 O'quvchi natijalari";
pub const PARENT_BTN_DEBT: &str = "💸 Qarzdorlik";
pub const PARENT_BTN_APPEAL: &str = "✍️ E'tiroz bildirish";
pub const PARENT_BUTTONS: [&str; 3] = [PARENT_BTN_RESULTS, PARENT_BTN_DEBT, PARENT_BTN_APPEAL];

pub const OPEN_TEST_PREFIX: &str = "open_test:";

pub const WELCOME_ASK_PHONE: &str =
    "Kelajakmediklari botiga xush kelibsiz. Telefon raqamingizni faqat pastdagi tugma orqali yuboring.";
pub const TYPE_PHONE_VIA_BUTTON: &str = "Telefon raqamni qo'lda yozmang. Pastdagi tugma orqali yuboring.";
pub const SEND_OWN_CONTACT: &str = "Iltimos, o'zingizning raqamingizni yuboring.";
pub const PARENT_PHONE_MISSING: &str = "Ota-ona raqami topilmadi. Administratorga murojaat qiling.";
pub const PHONE_USED_BY_OTHER_ROLE: &str = "Telefon boshqa role bilan band. Administratorga murojaat qiling.";
pub const CONTACT_LINK_FAILED: &str = "Raqamni bog'lashda xatolik bo'ldi. Iltimos, qayta urinib ko'ring.";
pub const PING_REPLY: &str = "Bot ishlayapti ✅";
pub const CHOOSE_BUTTON: &str = "Kerakli tugmani tanlang.";

pub const NO_ACTIVE_TEST: &str = "Hozircha aktiv test yo'q.";
pub const NO_ACTIVE_TEST_FOR_YOU: &str = "Sizda aktiv test yo'q.";
pub const SUBMISSION_ACCEPTED: &str = "Qabul qilindi ✅";
pub const OPEN_TEST_BUTTON: &str = "📝 Testni ochish";
pub const TEST_CLOSED: &str = "Bu test hozir yopiq";
pub const START_FIRST: &str = "Avval /start qiling";
pub const BUTTON_ALREADY_USED: &str = "Bu tugma allaqachon ishlatilgan.";
pub const TEST_ALREADY_OPENED: &str = "Test allaqachon ochilgan. Javoblarni yuboring.";
pub const TEST_HAS_NO_IMAGES: &str = "Bu testga rasm biriktirilmagan. Admin 2 ta rasm URL ni to'ldirishi kerak.";
pub const TEST_OPEN_FAILED: &str = "Testni ochishda xatolik bo'ldi, qayta urinib ko'ring.";
pub const JOIN_GROUP_BUTTON: &str = "👥 Guruhga qo'shilish";
pub const JOIN_GROUP_TEXT: &str = "Test guruhiga qo'shilish havolasi. Havola bir marta ishlaydi va 2 soat amal qiladi.";

pub const APPEAL_PROMPT: &str =
    "E'tirozingizni yozishingiz mumkin. Bu xabar to'g'ridan-to'g'ri loyiha rahbariga yuboriladi.";
pub const APPEAL_ACCEPTED: &str = "E'tirozingiz qabul qilindi ✅\nLoyiha rahbari ko'rib chiqadi.";
pub const STUDENT_APPEAL_TOO_SHORT: &str = "E'tiroz matni juda qisqa. Iltimos, batafsil yozing.";
pub const PARENT_APPEAL_TOO_SHORT: &str = "Xabar juda qisqa. Iltimos, batafsil yozing.";
pub const MIN_APPEAL_CHARS: usize = 5;

pub const NO_MONTHLY_RESULTS: &str = "Bu oy uchun topshirilgan test natijalari topilmadi.";
pub const NO_RESULTS: &str = "Test natijalari topilmadi.";
pub const NO_DEBT: &str = "✅ Hozircha qarzdorlik mavjud emas.";

const MISSING_PREVIEW_LIMIT: usize = 20;

pub fn reject_text(admin_contact: &str) -> String {
    format!(
        "Siz bizning onlayn kurslarimizda o'qimaysiz. Batafsil {} administratorimizdan so'rang.",
        admin_contact
    )
}

pub fn student_welcome(full_name: &str) -> String {
    format!("Kelajakmediklari botiga xush kelibsiz, {}!", full_name)
}

pub fn parent_welcome(child_name: &str) -> String {
    format!("Kelajakmediklari botiga xush kelibsiz!\nFarzandingiz: {}", child_name)
}

pub fn answer_example(total_questions: i32) -> String {
    format!("1A2B3C...{}B", total_questions)
}

pub fn format_error_text(total_questions: i32) -> String {
    format!("Format xato. Namuna: {}", answer_example(total_questions))
}

pub fn instruction_text(total_questions: i32) -> String {
    format!("Javoblarni bitta qatorda yuboring. Masalan: {}", answer_example(total_questions))
}

pub fn already_sent_text(total_questions: i32) -> String {
    format!(
        "Sizga test allaqachon yuborilgan.\nJavoblarni shu botga yuboring. Namuna: {}",
        answer_example(total_questions)
    )
}

pub fn open_test_text(title: &str, lesson_number: i32) -> String {
    format!("Sizga ochiq test: {} | {}-dars", title, lesson_number)
}

pub fn incomplete_text(total_questions: i32, missing: &[u32]) -> String {
    let preview = missing
        .iter()
        .take(MISSING_PREVIEW_LIMIT)
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let suffix = if missing.len() > MISSING_PREVIEW_LIMIT { " ..." } else { "" };
    format!(
        "Javob to'liq emas. {} ta savolning barchasini kiriting. Yetishmayotgan: {}{}",
        total_questions, preview, suffix
    )
}

/// Groups thousands with spaces: `1250000` becomes `1 250 000`.
pub fn format_money(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

fn submission_lines(rows: &[SubmissionSummary]) -> String {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            format!(
                "{}) {}\n{} | {}-dars | {}/{}",
                idx + 1,
                format_date_time(row.created_at),
                row.test_title,
                row.lesson_number,
                row.score,
                row.total_questions
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn monthly_results_text(month_label: &str, rows: &[SubmissionSummary]) -> String {
    format!("📊 Joriy oy natijalari ({})\n\n{}", month_label, submission_lines(rows))
}

pub fn recent_results_text(rows: &[SubmissionSummary]) -> String {
    let body = if rows.is_empty() {
        NO_RESULTS.to_string()
    } else {
        submission_lines(rows)
    };
    format!("📘 Oxirgi 10 ta test natija\n\n{}", body)
}

pub fn payment_info_text(debt: &DebtSummary, admin_contact: &str) -> String {
    let mut text = format!(
        "💳 To'lov holati\n\nJami qarzdorlik: {} so'm\n",
        format_money(debt.total_debt)
    );
    if debt.total_extra > 0 {
        text.push_str(&format!(
            "Shundan kechikkan davrlar uchun: {} so'm\n",
            format_money(debt.total_extra)
        ));
    }
    text.push_str(&format!("\nTo'lov qilish uchun administrator: {}\n\n", admin_contact));

    if debt.recent_rows.is_empty() {
        text.push_str("To'lov yozuvlari topilmadi.");
    } else {
        let lines = debt
            .recent_rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                format!(
                    "{}) {} | {}\nTalab: {} | To'langan: {} | Qarz: {}",
                    idx + 1,
                    row.month,
                    row.group_code,
                    format_money(row.net),
                    format_money(row.paid),
                    format_money(row.debt)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        text.push_str("Yaqin yozuvlar:\n");
        text.push_str(&lines);
    }
    text
}

pub fn parent_debt_text(debt: &DebtSummary, admin_contact: &str) -> String {
    if debt.total_debt > 0 {
        format!(
            "💸 Farzandingiz uchun qarzdorlik mavjud: {} so'm\nBatafsil uchun administrator: {}",
            format_money(debt.total_debt),
            admin_contact
        )
    } else {
        NO_DEBT.to_string()
    }
}

pub fn phone_keyboard() -> JsonValue {
    json!({
        "keyboard": [[{ "text": "📱 Telefon raqamni yuborish", "request_contact": true }]],
        "resize_keyboard": true,
    })
}

pub fn student_menu_keyboard() -> JsonValue {
    json!({
        "keyboard": [
            [{ "text": STUDENT_BTN_TEST }, { "text": STUDENT_BTN_PAY }],
            [{ "text": STUDENT_BTN_RESULTS }, { "text": STUDENT_BTN_APPEAL }],
        ],
        "resize_keyboard": true,
    })
}

pub fn parent_menu_keyboard() -> JsonValue {
    json!({
        "keyboard": [
            [{ "text": PARENT_BTN_RESULTS }, { "text": PARENT_BTN_DEBT }],
            [{ "text": PARENT_BTN_APPEAL }],
        ],
        "resize_keyboard": true,
    })
}

pub fn remove_keyboard() -> JsonValue {
    json!({ "remove_keyboard": true })
}

pub fn open_test_keyboard(test_id: Uuid) -> JsonValue {
    json!({
        "inline_keyboard": [[{
            "text": OPEN_TEST_BUTTON,
            "callback_data": format!("{}{}", OPEN_TEST_PREFIX, test_id),
        }]]
    })
}

pub fn join_group_keyboard(invite_link: &str) -> JsonValue {
    json!({ "inline_keyboard": [[{ "text": JOIN_GROUP_BUTTON, "url": invite_link }]] })
}

/// Test id carried by an `open_test:<id>` callback.
pub fn parse_open_test_data(data: &str) -> Option<Uuid> {
    data.strip_prefix(OPEN_TEST_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
}

/// Absolute URL for a test image stored either as a full URL or as a site-relative path.
pub fn resolve_image_url(web_base_url: &str, image_url: &str) -> String {
    let trimmed = image_url.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return trimmed.to_string();
    }
    format!("{}/{}", web_base_url.trim_end_matches('/'), trimmed.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::debt_service::DebtRow;
    use chrono::{TimeZone, Utc};

    #[test]
    fn money_is_grouped_by_thousands() {
        assert_eq!(format_money(0), "0");
        assert_eq!(format_money(999), "999");
        assert_eq!(format_money(1000), "1 000");
        assert_eq!(format_money(1_250_000), "1 250 000");
        assert_eq!(format_money(-45_000), "-45 000");
    }

    #[test]
    fn missing_preview_is_capped() {
        let few = incomplete_text(5, &[4, 5]);
        assert!(few.ends_with("Yetishmayotgan: 4, 5"));

        let many: Vec<u32> = (1..=25).collect();
        let text = incomplete_text(25, &many);
        assert!(text.contains("19, 20 ..."));
        assert!(!text.contains("21"));
    }

    #[test]
    fn open_test_callback_round_trips_test_id() {
        let id = Uuid::new_v4();
        let markup = open_test_keyboard(id);
        let data = markup["inline_keyboard"][0][0]["callback_data"].as_str().unwrap();
        assert_eq!(parse_open_test_data(data), Some(id));
        assert_eq!(parse_open_test_data("open_test:nope"), None);
        assert_eq!(parse_open_test_data("other:1"), None);
    }

    #[test]
    fn image_urls_are_made_absolute() {
        let base = "https://center.uz";
        assert_eq!(resolve_image_url(base, "/uploads/a.png"), "https://center.uz/uploads/a.png");
        assert_eq!(resolve_image_url(base, "uploads/a.png"), "https://center.uz/uploads/a.png");
        assert_eq!(resolve_image_url(base, "HTTPS://cdn.uz/a.png"), "HTTPS://cdn.uz/a.png");
    }

    #[test]
    fn payment_text_mentions_overdue_part_only_when_present() {
        let mut debt = DebtSummary {
            total_debt: 150_000,
            total_base: 150_000,
            total_extra: 0,
            recent_rows: vec![DebtRow {
                month: "2024-03".into(),
                group_code: "MED-1".into(),
                net: 200_000,
                paid: 50_000,
                debt: 150_000,
            }],
        };
        let text = payment_info_text(&debt, "@admin");
        assert!(text.contains("Jami qarzdorlik: 150 000 so'm"));
        assert!(!text.contains("kechikkan"));
        assert!(text.contains("1) 2024-03 | MED-1"));

        debt.total_extra = 100_000;
        assert!(payment_info_text(&debt, "@admin").contains("kechikkan davrlar uchun: 100 000 so'm"));
    }

    #[test]
    fn results_are_numbered() {
        let rows = vec![SubmissionSummary {
            id: Uuid::new_v4(),
            score: 27,
            total_questions: 30,
            lesson_number: 4,
            test_title: "Biologiya".into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap(),
        }];
        let text = recent_results_text(&rows);
        assert!(text.contains("1) 02.05.2024 14:30\nBiologiya | 4-dars | 27/30"));
        assert!(recent_results_text(&[]).ends_with(NO_RESULTS));
    }
}
