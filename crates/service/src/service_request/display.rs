//! Human-facing renderings of service-request fields (Turkish locale).

use chrono::{DateTime, FixedOffset, Locale, TimeZone};

/// Turkey has stayed on UTC+03:00 all year since 2016.
const TURKEY_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// Fixed label for a canonical status; any other value is returned unchanged.
pub fn status_label(status: &str) -> &str {
    match status {
        "new" => "Yeni Talep",
        "in_progress" => "İşlemde",
        "completed" => "Tamamlandı",
        "cancelled" => "İptal Edildi",
        other => other,
    }
}

fn turkey_offset() -> FixedOffset {
    FixedOffset::east_opt(TURKEY_UTC_OFFSET_SECS).expect("UTC+03:00 is in range")
}

/// Long-form Turkish date and time in Turkey local time, e.g. `16 Ekim 2026 14:05`.
pub fn format_long_tr<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    at.with_timezone(&turkey_offset())
        .format_localized("%-d %B %Y %H:%M", Locale::tr_TR)
        .to_string()
}
