use std::collections::HashMap;

use crate::api::SmsGateway;
use crate::bulk;
use crate::clearance;
use crate::models::{
    BatchOutcome, ClearanceStats, RequirementStatus, SmsMessage, StudentRequirement,
};

/// Accepts digits with an optional leading `+`; spaces and dashes are
/// dropped. Anything else is not a phone number.
pub fn normalize_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };
    let digits: String = rest.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    if digits.len() < 10 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{plus}{digits}"))
}

pub fn compose_reminder(
    student_id: &str,
    stats: &ClearanceStats,
    pending: &[&StudentRequirement],
) -> String {
    let mut names: Vec<String> = pending
        .iter()
        .map(|r| {
            r.requirement
                .as_ref()
                .map(|req| req.name.clone())
                .unwrap_or_else(|| r.requirement_id.clone())
        })
        .collect();
    names.sort();
    names.dedup();

    format!(
        "Clearance reminder for {student_id}: {} of {} requirements signed. Pending: {}. \
         Please settle them with the clearing officers before the deadline.",
        stats.signed,
        stats.total,
        names.join(", ")
    )
}

#[derive(Debug, Default)]
pub struct ReminderBatch {
    pub messages: Vec<SmsMessage>,
    pub without_number: Vec<String>,
}

/// One reminder per student who still has unsigned requirements.
pub fn build_reminders(
    all: &[StudentRequirement],
    contacts: &HashMap<String, String>,
) -> ReminderBatch {
    let mut batch = ReminderBatch::default();

    for summary in clearance::summarize_students(all) {
        if summary.stats.is_cleared {
            continue;
        }
        let Some(number) = contacts
            .get(&summary.student_id)
            .and_then(|n| normalize_number(n))
        else {
            batch.without_number.push(summary.student_id);
            continue;
        };

        let pending: Vec<&StudentRequirement> = all
            .iter()
            .filter(|r| r.student_id == summary.student_id && r.status != RequirementStatus::Signed)
            .collect();
        batch.messages.push(SmsMessage {
            number,
            message: compose_reminder(&summary.student_id, &summary.stats, &pending),
        });
    }

    batch
}

pub async fn send_bulk<G>(gateway: &G, messages: &[SmsMessage]) -> BatchOutcome
where
    G: SmsGateway + ?Sized,
{
    let requests = messages
        .iter()
        .map(|m| (m.number.clone(), gateway.send_sms(m)));
    bulk::settle_all("send_sms", requests).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{record, FakeBackend};
    use crate::models::RequirementStatus::{Incomplete, Missing, Signed};

    #[test]
    fn numbers_are_normalized() {
        assert_eq!(
            normalize_number(" +63 917-555-0101 ").as_deref(),
            Some("+639175550101")
        );
        assert_eq!(normalize_number("09175550101").as_deref(), Some("09175550101"));
        assert_eq!(normalize_number("12345"), None);
        assert_eq!(normalize_number("0917-CALL-NOW"), None);
    }

    #[test]
    fn reminders_skip_cleared_students_and_missing_numbers() {
        let all = vec![
            record("a", "S1", "co-lib", "r-card", "librarian", Signed),
            record("b", "S1", "co-cash", "r-fees", "cashier", Incomplete),
            record("c", "S2", "co-lib", "r-card", "librarian", Signed),
            record("d", "S3", "co-sao", "r-id", "sao", Missing),
        ];
        let contacts = HashMap::from([
            ("S1".to_string(), "09175550101".to_string()),
            ("S2".to_string(), "09175550102".to_string()),
        ]);

        let batch = build_reminders(&all, &contacts);
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.messages[0].number, "09175550101");
        assert!(batch.messages[0].message.contains("1 of 2 requirements signed"));
        assert!(batch.messages[0].message.contains("r-fees"));
        assert_eq!(batch.without_number, vec!["S3".to_string()]);
    }

    #[tokio::test]
    async fn bulk_send_counts_undeliverable_numbers() {
        let mut gateway = FakeBackend::default();
        gateway.failing_numbers.insert("09170000000".to_string());
        let messages = vec![
            SmsMessage {
                number: "09175550101".to_string(),
                message: "hello".to_string(),
            },
            SmsMessage {
                number: "09170000000".to_string(),
                message: "hello".to_string(),
            },
        ];

        let outcome = send_bulk(&gateway, &messages).await;
        assert_eq!(outcome, BatchOutcome { updated: 1, failed: 1 });
        assert_eq!(gateway.sent.lock().await.len(), 1);
    }
}
