use chrono::{DateTime, Days, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::session::SessionRecord;

/// Completed focus work for one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTotals {
    pub pomodoros: u64,
    pub focus_min: u64,
}

/// Completed focus sessions grouped by the local date they started on.
///
/// Breaks and aborted sessions are ignored.
pub fn daily_totals<Tz: TimeZone>(records: &[SessionRecord], tz: &Tz) -> BTreeMap<NaiveDate, DayTotals> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_completed_focus()) {
        let date = record.started_at.with_timezone(tz).date_naive();
        let day = days.entry(date).or_default();
        day.pomodoros += 1;
        day.focus_min += u64::from(record.duration_min);
    }
    days
}

/// Number of completed pomodoros per local date.
pub fn pomodoros_per_day<Tz: TimeZone>(records: &[SessionRecord], tz: &Tz) -> BTreeMap<NaiveDate, u64> {
    daily_totals(records, tz)
        .into_iter()
        .map(|(date, totals)| (date, totals.pomodoros))
        .collect()
}

/// The `days` dates ending at `end` (inclusive), oldest first, with empty
/// days filled in.
pub fn last_days(
    totals: &BTreeMap<NaiveDate, DayTotals>,
    end: NaiveDate,
    days: u32,
) -> Vec<(NaiveDate, DayTotals)> {
    (0..days)
        .rev()
        .filter_map(|back| end.checked_sub_days(Days::new(u64::from(back))))
        .map(|date| (date, totals.get(&date).copied().unwrap_or_default()))
        .collect()
}

/// Local midnight of the day containing `now`, as UTC.
pub fn start_of_day<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local = now.with_timezone(tz);
    let midnight = local.date_naive().and_hms_opt(0, 0, 0);
    match midnight.and_then(|m| tz.from_local_datetime(&m).earliest()) {
        Some(start) => start.with_timezone(&Utc),
        // Midnight skipped by a DST transition.
        None => now - chrono::Duration::seconds(i64::from(local.num_seconds_from_midnight())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::Phase;
    use chrono::{Duration, FixedOffset};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn session(phase: Phase, start: DateTime<Utc>, completed: bool) -> SessionRecord {
        SessionRecord::from_window(phase, start, start + Duration::minutes(25), completed).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn groups_completed_focus_by_utc_date() {
        let records = vec![
            session(Phase::Focus, at(2024, 5, 1, 9), true),
            session(Phase::Focus, at(2024, 5, 1, 14), true),
            session(Phase::Focus, at(2024, 5, 1, 15), false),
            session(Phase::ShortBreak, at(2024, 5, 1, 16), true),
            session(Phase::Focus, at(2024, 5, 2, 9), true),
        ];
        let per_day = pomodoros_per_day(&records, &Utc);
        assert_eq!(per_day.len(), 2);
        assert_eq!(per_day[&date(2024, 5, 1)], 2);
        assert_eq!(per_day[&date(2024, 5, 2)], 1);

        let totals = daily_totals(&records, &Utc);
        assert_eq!(totals[&date(2024, 5, 1)].focus_min, 50);
    }

    #[test]
    fn time_zone_moves_late_sessions_to_next_day() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let records = vec![session(Phase::Focus, at(2024, 5, 1, 20), true)];
        let per_day = pomodoros_per_day(&records, &tokyo);
        assert_eq!(per_day.keys().copied().collect::<Vec<_>>(), vec![date(2024, 5, 2)]);
    }

    #[test]
    fn last_days_fills_gaps() {
        let records = vec![session(Phase::Focus, at(2024, 5, 3, 9), true)];
        let totals = daily_totals(&records, &Utc);
        let week = last_days(&totals, date(2024, 5, 4), 3);
        assert_eq!(
            week,
            vec![
                (date(2024, 5, 2), DayTotals::default()),
                (date(2024, 5, 3), DayTotals { pomodoros: 1, focus_min: 25 }),
                (date(2024, 5, 4), DayTotals::default()),
            ]
        );
    }

    #[test]
    fn start_of_day_in_offset_zone() {
        let new_york = FixedOffset::west_opt(4 * 3600).unwrap();
        let now = at(2024, 5, 2, 2); // 22:00 on May 1 local
        assert_eq!(start_of_day(now, &new_york), at(2024, 5, 1, 4));
        assert_eq!(start_of_day(now, &Utc), at(2024, 5, 2, 0));
    }
}
