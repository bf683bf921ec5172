use chrono::{DateTime, Utc};

use crate::constants::timeouts::human_time;
use crate::db::models::{BanRecord, Expiry};
use crate::services::enforcement::{FanoutOutcome, FanoutReport, RoomStatus, SyncMode, SyncReport};

/// Longest comment shown in list output
const MAX_COMMENT_LEN: usize = 80;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

pub fn format_expiry(until: &Expiry, now: DateTime<Utc>) -> String {
    match until.remaining_secs(now) {
        None => "permanent".to_string(),
        Some(secs) if secs <= 0 => "expired, lift pending".to_string(),
        Some(secs) => format!("remaining {}", human_time(secs)),
    }
}

/// One line of `!banlist` / `!bansearch` output
pub fn format_ban_line(record: &BanRecord, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "{} ({}, by {})",
        record.subject,
        format_expiry(&record.until, now),
        record.issuer
    );
    if let Some(comment) = &record.comment {
        line.push_str(": ");
        line.push_str(&truncate(comment, MAX_COMMENT_LEN));
    }
    line
}

pub fn format_ban_list(records: &[BanRecord], now: DateTime<Utc>, empty: &str) -> String {
    if records.is_empty() {
        return empty.to_string();
    }
    records
        .iter()
        .map(|r| format_ban_line(r, now))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reply for a ban or unban, spelling out which rooms failed
pub fn format_fanout(action: &str, subject: &str, report: &FanoutReport) -> String {
    match report.outcome() {
        FanoutOutcome::Complete => format!(
            "✅ {} {} in {} room{}",
            action,
            subject,
            report.succeeded.len(),
            if report.succeeded.len() == 1 { "" } else { "s" }
        ),
        FanoutOutcome::NoRooms => format!("✅ {} {} (no protected rooms yet)", action, subject),
        FanoutOutcome::Partial | FanoutOutcome::Failed => {
            let failures = report
                .failed
                .iter()
                .map(|f| format!("{} ({})", f.room, f.reason))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "⚠️ {} {} partially applied: ok in {}/{} rooms, failed in {}",
                action,
                subject,
                report.succeeded.len(),
                report.succeeded.len() + report.failed.len(),
                failures
            )
        }
    }
}

pub fn format_sync_report(report: &SyncReport) -> String {
    let title = match report.mode {
        SyncMode::Full => "Ban sync",
        SyncMode::EnforceOnly => "Enforcement sync",
    };
    if report.rooms.is_empty() {
        return format!("{}: no protected rooms.", title);
    }

    let mut lines = vec![format!(
        "{}: {} actions over {} rooms",
        title,
        report.action_count(),
        report.rooms.len()
    )];
    for room in &report.rooms {
        let line = match (room.status(), &room.error) {
            (RoomStatus::Failed, Some(error)) => format!("❌ {}: {}", room.room, error),
            (RoomStatus::Failed, None) => format!(
                "⚠️ {}: applied {}, failed {}",
                room.room,
                room.applied.len(),
                room.failed
                    .iter()
                    .map(|f| f.subject.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            (RoomStatus::Partial, _) => format!(
                "⚠️ {}: imported {}, applied {}, {} not enforceable yet",
                room.room,
                room.imported.len(),
                room.applied.len(),
                room.unresolved.len()
            ),
            (RoomStatus::Applied, _) => format!(
                "✅ {}: imported {}, applied {}",
                room.room,
                room.imported.len(),
                room.applied.len()
            ),
            (RoomStatus::Consistent, _) => format!("✅ {}: already consistent", room.room),
        };
        lines.push(line);
        if !room.unresolved.is_empty() {
            lines.push(format!("   unresolved nicknames: {}", room.unresolved.join(", ")));
        }
    }
    lines.join("\n")
}
