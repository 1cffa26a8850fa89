use std::time::SystemTime;

/// Broken-down UTC time: (year, month, day, hour, minute, second).
type Civil = (i64, u64, u64, u64, u64, u64);

fn civil_from_unix(secs: u64) -> Civil {
    let days = (secs / 86400) as i64;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    // Howard Hinnant's civil_from_days
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    (y, m, d, hours, minutes, seconds)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// RFC 3339 UTC timestamp (`2026-10-19T08:30:00Z`), used for `provisioned_at`.
pub fn utc_timestamp() -> String {
    format_rfc3339(now_secs())
}

/// Filename-safe UTC timestamp (`2026-10-19T08-30-00`), used for backup suffixes.
pub fn file_timestamp() -> String {
    let (y, m, d, h, mi, s) = civil_from_unix(now_secs());
    format!("{y:04}-{m:02}-{d:02}T{h:02}-{mi:02}-{s:02}")
}

fn format_rfc3339(secs: u64) -> String {
    let (y, m, d, h, mi, s) = civil_from_unix(secs);
    format!("{y:04}-{m:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
}

/// Collapse multi-line process output onto one log line.
pub fn flatten_lines(text: &str) -> String {
    text.trim().replace("\r\n", "\n").replace('\n', " - ")
}
