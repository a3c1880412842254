//! Workout date generation from a weekly frequency pattern.
//!
//! Dates are generated on calendar days (never by adding 24h), so a DST switch
//! can neither duplicate nor skip a day.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How often the user trains per week
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    /// Same weekday every week
    OncePerWeek,
    /// Mon/Wed/Fri
    #[default]
    ThreePerWeek,
    /// Weekdays only
    FivePerWeek,
    /// Consecutive days; also the fallback for unrecognised values
    Daily,
}

impl Frequency {
    /// Parse a frequency label. Unknown labels fall back to `Daily`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "1x/week" => Frequency::OncePerWeek,
            "3x/week" => Frequency::ThreePerWeek,
            "5x/week" => Frequency::FivePerWeek,
            "daily" | "7x/week" => Frequency::Daily,
            other => {
                tracing::warn!(
                    "Unrecognised frequency '{}', falling back to consecutive days",
                    other
                );
                Frequency::Daily
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::OncePerWeek => "1x/week",
            Frequency::ThreePerWeek => "3x/week",
            Frequency::FivePerWeek => "5x/week",
            Frequency::Daily => "daily",
        }
    }

    /// The workout date that follows `date` under this pattern, or `None`
    /// past the end of the calendar
    fn next_date(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::OncePerWeek => date.checked_add_days(Days::new(7)),
            Frequency::ThreePerWeek => {
                let step = match date.weekday() {
                    Weekday::Mon | Weekday::Wed => 2,
                    Weekday::Fri => 3,
                    // off-pattern start drifts back onto Mon/Wed/Fri
                    _ => 1,
                };
                date.checked_add_days(Days::new(step))
            }
            Frequency::FivePerWeek => {
                let next = date.checked_add_days(Days::new(1))?;
                if next.weekday() == Weekday::Sat {
                    next.checked_add_days(Days::new(2))
                } else {
                    Some(next)
                }
            }
            Frequency::Daily => date.checked_add_days(Days::new(1)),
        }
    }
}

impl From<String> for Frequency {
    fn from(label: String) -> Self {
        Frequency::parse(&label)
    }
}

impl From<Frequency> for String {
    fn from(frequency: Frequency) -> Self {
        frequency.as_str().to_string()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest schedule a cycle or the CLI may ask for (about ten years of days)
pub const MAX_SCHEDULE_DAYS: usize = 3650;

/// Generate `total_days` workout dates starting at `start`'s calendar day.
///
/// Every emitted value is midnight in `start`'s time zone, and the sequence is
/// strictly increasing. The first date is always the start day itself. The
/// sequence is cut short only if it would run past the last representable date.
pub fn generate_schedule<Tz: TimeZone>(
    start: &DateTime<Tz>,
    frequency: Frequency,
    total_days: usize,
) -> Vec<DateTime<Tz>> {
    let tz = start.timezone();
    let mut date = start.date_naive();
    let mut dates = Vec::with_capacity(total_days.min(MAX_SCHEDULE_DAYS));

    for emitted in 1..=total_days {
        dates.push(local_midnight(&tz, date));
        if emitted == total_days {
            break;
        }
        date = match frequency.next_date(date) {
            Some(next) => next,
            None => {
                tracing::warn!(
                    "Schedule reached the end of the calendar after {} of {} days",
                    emitted,
                    total_days
                );
                break;
            }
        };
    }

    dates
}

/// `generate_schedule` in the machine's local time zone, returned as UTC instants
pub fn generate_local_schedule(
    start: DateTime<Utc>,
    frequency: Frequency,
    total_days: usize,
) -> Vec<DateTime<Utc>> {
    generate_schedule(&start.with_timezone(&Local), frequency, total_days)
        .into_iter()
        .map(|d| d.with_timezone(&Utc))
        .collect()
}

/// Start of `date` in `tz`. Where midnight does not exist (DST gap at 00:00)
/// the first valid instant of the day is used.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            naive
                .checked_add_signed(chrono::Duration::hours(1))
                .and_then(|later| tz.from_local_datetime(&later).earliest())
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
