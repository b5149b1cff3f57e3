use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::payment::{GroupStatus, PaymentRecord};
use crate::models::student::{ELIGIBLE_ENROLLMENT_STATUSES, ELIGIBLE_GROUP_STATUSES};
use crate::utils::time::add_months_keeping_day;

/// Upper bound on ledger rows read per student.
pub const PAYMENT_SCAN_LIMIT: i64 = 500;
const RECENT_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtSummary {
    pub total_debt: i64,
    pub total_base: i64,
    pub total_extra: i64,
    pub recent_rows: Vec<DebtRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtRow {
    pub month: String,
    pub group_code: String,
    pub net: i64,
    pub paid: i64,
    pub debt: i64,
}

/// Whole monthly periods elapsed after `period_end`: the number of `k >= 1`
/// with `period_end + k months <= today`.
pub fn elapsed_periods(period_end: NaiveDate, today: NaiveDate) -> u32 {
    if today <= period_end {
        return 0;
    }
    let mut periods = 0;
    while add_months_keeping_day(period_end, periods + 1) <= today {
        periods += 1;
    }
    periods
}

/// Pure debt computation over a student's ledger as of `today` (UTC date).
/// `records` are expected newest first; deleted rows are skipped.
pub fn summarize_debt(records: &[PaymentRecord], today: NaiveDate) -> DebtSummary {
    let live: Vec<&PaymentRecord> = records.iter().filter(|r| !r.is_deleted).collect();

    let mut total_base = 0;
    let mut latest_by_group: HashMap<Uuid, &PaymentRecord> = HashMap::new();
    for record in &live {
        total_base += record.base_debt();

        let (Some(group_id), Some(period_end)) = (record.group_id, record.period_end) else {
            continue;
        };
        let newer = latest_by_group
            .get(&group_id)
            .and_then(|prev| prev.period_end)
            .map_or(true, |prev_end| prev_end < period_end);
        if newer {
            latest_by_group.insert(group_id, record);
        }
    }

    let mut total_extra = 0;
    for current in latest_by_group.values() {
        if current.group_status() != Some(GroupStatus::Open) {
            continue;
        }
        let (Some(price), Some(period_end)) = (current.group_price, current.period_end) else {
            continue;
        };
        if price <= 0 {
            continue;
        }
        total_extra += elapsed_periods(period_end, today) as i64 * price;
    }

    let recent_rows = live
        .iter()
        .take(RECENT_ROWS)
        .map(|r| DebtRow {
            month: r.month.clone(),
            group_code: r.group_code.clone().unwrap_or_else(|| "-".to_string()),
            net: r.net_required(),
            paid: r.amount_paid,
            debt: (r.net_required() - r.amount_paid).max(0),
        })
        .collect();

    DebtSummary {
        total_debt: total_base + total_extra,
        total_base,
        total_extra,
        recent_rows,
    }
}

#[derive(Clone)]
pub struct DebtService {
    pool: PgPool,
}

impl DebtService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn payments_for_student(&self, student_id: Uuid) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT
                p.id, p.student_id, p.group_id, p.month,
                p.amount_required, p.amount_paid, p.discount,
                p.period_end, p.paid_at, p.is_deleted,
                g.code AS group_code,
                g.status AS group_status,
                g.price_monthly AS group_price
            FROM payments p
            LEFT JOIN groups g ON g.id = p.group_id
            WHERE p.student_id = $1 AND p.is_deleted = FALSE
            ORDER BY p.month DESC, p.paid_at DESC NULLS LAST
            LIMIT $2
            "#,
        )
        .bind(student_id)
        .bind(PAYMENT_SCAN_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Curators may only read debts of students enrolled in one of their groups.
    pub async fn ensure_curates(&self, student_id: Uuid, curator_id: Uuid) -> Result<()> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM enrollments e
                JOIN groups g ON g.id = e.group_id
                WHERE e.student_id = $1
                  AND g.curator_id = $2
                  AND e.status = ANY($3)
                  AND g.status = ANY($4)
            )
            "#,
        )
        .bind(student_id)
        .bind(curator_id)
        .bind(&ELIGIBLE_ENROLLMENT_STATUSES[..])
        .bind(&ELIGIBLE_GROUP_STATUSES[..])
        .fetch_one(&self.pool)
        .await?;

        if found {
            Ok(())
        } else {
            Err(Error::Forbidden("Student is not in your groups".to_string()))
        }
    }

    pub async fn student_debt(&self, student_id: Uuid, today: NaiveDate) -> Result<DebtSummary> {
        let records = self.payments_for_student(student_id).await?;
        let summary = summarize_debt(&records, today);
        tracing::debug!(
            %student_id,
            records = records.len(),
            total_debt = summary.total_debt,
            "computed student debt"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(group: Option<Uuid>, required: i64, paid: i64, discount: i64) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            group_id: group,
            month: "2024-01".to_string(),
            amount_required: required,
            amount_paid: paid,
            discount,
            period_end: None,
            paid_at: None,
            is_deleted: false,
            group_code: Some("MED-1".to_string()),
            group_status: Some("OPEN".to_string()),
            group_price: Some(100_000),
        }
    }

    #[test]
    fn base_debt_never_goes_negative() {
        let rows = vec![record(None, 100, 30, 20), record(None, 100, 500, 0)];
        let summary = summarize_debt(&rows, d(2024, 1, 1));
        assert_eq!(summary.total_base, 50);
        assert_eq!(summary.total_extra, 0);
        assert_eq!(summary.total_debt, 50);
    }

    #[test]
    fn deleted_rows_are_excluded() {
        let mut deleted = record(None, 1_000, 0, 0);
        deleted.is_deleted = true;
        let summary = summarize_debt(&[deleted, record(None, 10, 0, 0)], d(2024, 1, 1));
        assert_eq!(summary.total_debt, 10);
        assert_eq!(summary.recent_rows.len(), 1);
    }

    #[test]
    fn rollover_example_counts_two_full_periods() {
        let group = Uuid::new_v4();
        let mut current = record(Some(group), 100_000, 100_000, 0);
        current.period_end = Some(d(2024, 1, 31));

        let summary = summarize_debt(&[current], d(2024, 4, 15));
        assert_eq!(summary.total_extra, 200_000);
        assert_eq!(summary.total_debt, 200_000);
    }

    #[test]
    fn rollover_boundaries() {
        let end = d(2024, 1, 31);
        let cases = [
            (d(2024, 1, 30), 0),
            (d(2024, 1, 31), 0),
            (d(2024, 2, 1), 0),
            (d(2024, 2, 28), 0),
            (d(2024, 2, 29), 1),
            (d(2024, 3, 1), 1),
            (d(2024, 3, 30), 1),
            (d(2024, 3, 31), 2),
            (d(2024, 4, 15), 2),
            (d(2024, 4, 30), 3),
        ];
        for (today, expected) in cases {
            assert_eq!(elapsed_periods(end, today), expected, "today = {}", today);
        }
    }

    #[test]
    fn only_latest_period_per_open_group_accrues() {
        let group = Uuid::new_v4();
        let mut old = record(Some(group), 100_000, 100_000, 0);
        old.period_end = Some(d(2023, 12, 31));
        let mut current = record(Some(group), 100_000, 100_000, 0);
        current.period_end = Some(d(2024, 1, 31));

        let summary = summarize_debt(&[current, old], d(2024, 3, 1));
        assert_eq!(summary.total_extra, 100_000);
    }

    #[test]
    fn non_open_groups_do_not_accrue() {
        let mut closed = record(Some(Uuid::new_v4()), 0, 0, 0);
        closed.period_end = Some(d(2023, 1, 1));
        closed.group_status = Some("CLOSED".to_string());
        let mut free = record(Some(Uuid::new_v4()), 0, 0, 0);
        free.period_end = Some(d(2023, 1, 1));
        free.group_price = Some(0);

        let summary = summarize_debt(&[closed, free], d(2024, 1, 1));
        assert_eq!(summary.total_extra, 0);
    }

    #[test]
    fn summary_is_a_pure_function_of_its_inputs() {
        let group = Uuid::new_v4();
        let mut current = record(Some(group), 150_000, 50_000, 10_000);
        current.period_end = Some(d(2024, 5, 15));
        let rows = vec![current, record(None, 70_000, 0, 0)];

        let first = summarize_debt(&rows, d(2024, 9, 1));
        let second = summarize_debt(&rows, d(2024, 9, 1));
        assert_eq!(first, second);
    }
}
