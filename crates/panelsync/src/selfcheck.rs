use chrono::{NaiveDate, NaiveDateTime};
use panelsync_models::config::{ConfigError, ScheduleConfig};
use panelsync_models::TradingWindow;

/// Fixed verification cases for the session gate, spanning a weekend and
/// the open/close boundaries of a Monday.
const CASES: [(&str, (i32, u32, u32), (u32, u32)); 6] = [
    ("Saturday 12:00", (2025, 12, 13), (12, 0)),
    ("Sunday 12:00", (2025, 12, 14), (12, 0)),
    ("Monday 10:59", (2025, 12, 15), (10, 59)),
    ("Monday 11:00", (2025, 12, 15), (11, 0)),
    ("Monday 16:59", (2025, 12, 15), (16, 59)),
    ("Monday 17:01", (2025, 12, 15), (17, 1)),
];

/// Classify the literal cases against the configured window and print the
/// results. Returns the process exit code: 0 on a completed run, 2 when the
/// configured timezone cannot be resolved against the bundled database.
pub fn run(schedule: &ScheduleConfig) -> i32 {
    let window = match TradingWindow::from_schedule(schedule) {
        Ok(window) => window,
        Err(ConfigError::UnknownTimezone(tz)) => {
            eprintln!("Timezone '{tz}' is not available in the timezone database");
            return 2;
        }
        Err(e) => {
            eprintln!("Invalid schedule: {e}");
            return 1;
        }
    };

    println!("=== session gate self-check ({}) ===", window.tz);
    println!("Window: {} - {} on {:?}", window.start, window.end, window.days);

    for (label, date, time) in CASES {
        let naive = case_instant(date, time);
        let status = window.status_at_local(naive);
        println!("{label:14} | {naive} | {status:?}");
    }

    0
}

fn case_instant((y, m, d): (i32, u32, u32), (h, min): (u32, u32)) -> NaiveDateTime {
    // Literal, always-valid dates.
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, 0))
        .unwrap_or_default()
}
