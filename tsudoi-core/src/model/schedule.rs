//! Per-user availability: weekly defaults, date-specific overrides and
//! blackouts, plus the multi-way interval intersection used to find time
//! that works for everyone.
//!
//! Resolution order for a given date: blackout ranges force zero
//! availability; a date-specific override beats the weekly default; busy
//! slots are subtracted last, splitting the surrounding free time.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::user::{AvailabilityBlock, BlackoutDate};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ScheduleResult<Self> {
        if end <= start {
            return Err(ScheduleError::EmptySlot { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_minutes() as f64 / 60.0
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// The overlap of two slots, if any.
    pub fn intersect(&self, other: &TimeSlot) -> Option<TimeSlot> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end > start {
            Some(TimeSlot { start, end })
        } else {
            None
        }
    }

    /// Shareable descriptor for wire messages.
    pub fn offer(&self) -> SlotOffer {
        SlotOffer {
            start: self.start,
            end: self.end,
            duration_hours: self.duration_hours(),
        }
    }
}

/// Shareable projection of a [`TimeSlot`] as sent in availability responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOffer {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_hours: f64,
}

/// A user's schedule: weekly defaults plus date-keyed overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub user_id: String,
    #[serde(default)]
    pub default_availability: Vec<AvailabilityBlock>,
    #[serde(default)]
    pub blackout_dates: Vec<BlackoutDate>,
    /// Date-specific free slots, overriding the weekly default.
    #[serde(default)]
    pub specific_availability: HashMap<NaiveDate, Vec<TimeSlot>>,
    /// Date-specific busy slots, subtracted from whatever is free. Private.
    #[serde(default)]
    pub specific_busy: HashMap<NaiveDate, Vec<TimeSlot>>,
}

impl Schedule {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            default_availability: Vec::new(),
            blackout_dates: Vec::new(),
            specific_availability: HashMap::new(),
            specific_busy: HashMap::new(),
        }
    }

    /// Free slots for one date, after blackout, override and busy-slot
    /// resolution.
    pub fn availability_for_date(&self, date: NaiveDate) -> Vec<TimeSlot> {
        if self.blackout_dates.iter().any(|b| b.covers(date)) {
            return Vec::new();
        }

        let mut slots = if let Some(overridden) = self.specific_availability.get(&date) {
            overridden.clone()
        } else {
            let day_of_week = date.weekday().num_days_from_monday();
            self.default_availability
                .iter()
                .filter(|block| block.day_of_week == day_of_week)
                .filter_map(|block| {
                    let start = NaiveTime::from_hms_opt(block.start_hour, 0, 0)?;
                    let end = NaiveTime::from_hms_opt(block.end_hour, 0, 0)?;
                    TimeSlot::new(date.and_time(start).and_utc(), date.and_time(end).and_utc())
                        .ok()
                })
                .collect()
        };

        if let Some(busy) = self.specific_busy.get(&date) {
            slots = subtract_busy(&slots, busy);
        }

        slots
    }

    /// Availability per date over an inclusive range. Dates with nothing free
    /// are omitted.
    pub fn availability_for_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> HashMap<NaiveDate, Vec<TimeSlot>> {
        let mut result = HashMap::new();
        let mut current = start_date;
        while current <= end_date {
            let slots = self.availability_for_date(current);
            if !slots.is_empty() {
                result.insert(current, slots);
            }
            current += Duration::days(1);
        }
        result
    }

    /// Shareable availability over a range: slot descriptors only, no busy
    /// slots or blackout reasons.
    pub fn shareable_availability(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Vec<SlotOffer> {
        let mut offers: Vec<SlotOffer> = self
            .availability_for_range(start_date, end_date)
            .into_values()
            .flatten()
            .map(|slot| slot.offer())
            .collect();
        offers.sort_by_key(|o| o.start);
        offers
    }
}

/// Remove busy periods from free slots, splitting slots that surround a busy
/// period.
fn subtract_busy(available: &[TimeSlot], busy: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut result = Vec::new();

    for avail in available {
        let mut remaining = vec![*avail];

        for busy_slot in busy {
            let mut next = Vec::new();
            for slot in remaining {
                if !slot.overlaps(busy_slot) {
                    next.push(slot);
                    continue;
                }
                if slot.start < busy_slot.start {
                    if let Ok(head) = TimeSlot::new(slot.start, busy_slot.start) {
                        next.push(head);
                    }
                }
                if slot.end > busy_slot.end {
                    if let Ok(tail) = TimeSlot::new(busy_slot.end, slot.end) {
                        next.push(tail);
                    }
                }
            }
            remaining = next;
        }

        result.extend(remaining);
    }

    result
}

/// Slots where every schedule has availability, one day at a time.
///
/// For each day the first schedule's free slots are repeatedly intersected
/// with each subsequent schedule's slots (max of starts, min of ends); empty
/// intersections drop out. Results shorter than `min_duration` are
/// discarded. No ordering is implied.
pub fn find_common_availability(
    schedules: &[&Schedule],
    start_date: NaiveDate,
    end_date: NaiveDate,
    min_duration: Duration,
) -> Vec<TimeSlot> {
    if schedules.is_empty() {
        return Vec::new();
    }

    let mut common = Vec::new();
    let mut current = start_date;

    while current <= end_date {
        let per_person: Vec<Vec<TimeSlot>> = schedules
            .iter()
            .map(|s| s.availability_for_date(current))
            .collect();

        if per_person.iter().all(|slots| !slots.is_empty()) {
            let mut intersections = per_person[0].clone();

            for other_slots in &per_person[1..] {
                let mut next = Vec::new();
                for slot in &intersections {
                    for other in other_slots {
                        if let Some(overlap) = slot.intersect(other) {
                            next.push(overlap);
                        }
                    }
                }
                intersections = next;
            }

            common.extend(
                intersections
                    .into_iter()
                    .filter(|slot| slot.duration() >= min_duration),
            );
        }

        current += Duration::days(1);
    }

    common
}

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("empty time slot: end {end} is not after start {start}")]
    EmptySlot {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn slot(date: NaiveDate, start_hour: u32, end_hour: u32) -> TimeSlot {
        TimeSlot::new(
            date.and_hms_opt(start_hour, 0, 0).unwrap().and_utc(),
            date.and_hms_opt(end_hour, 0, 0).unwrap().and_utc(),
        )
        .unwrap()
    }

    fn weekend_schedule(user_id: &str, start_hour: u32, end_hour: u32) -> Schedule {
        let mut schedule = Schedule::new(user_id);
        for day_of_week in [5, 6] {
            schedule.default_availability.push(AvailabilityBlock {
                day_of_week,
                start_hour,
                end_hour,
                label: String::new(),
            });
        }
        schedule
    }

    #[test]
    fn test_slot_rejects_empty_interval() {
        let d = date(2026, 8, 8);
        let at = d.and_hms_opt(10, 0, 0).unwrap().and_utc();
        assert!(TimeSlot::new(at, at).is_err());
    }

    #[test]
    fn test_overlap_and_intersect() {
        let d = date(2026, 8, 8);
        let a = slot(d, 10, 18);
        let b = slot(d, 14, 22);
        let c = slot(d, 18, 20);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // half-open: [10,18) and [18,20) do not touch
        assert_eq!(a.intersect(&b), Some(slot(d, 14, 18)));
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_blackout_forces_zero_availability() {
        let mut schedule = weekend_schedule("u1", 10, 18);
        // 2026-08-08 is a Saturday
        schedule.blackout_dates.push(BlackoutDate {
            start_date: date(2026, 8, 8),
            end_date: date(2026, 8, 8),
            reason: String::new(),
        });
        schedule
            .specific_availability
            .insert(date(2026, 8, 8), vec![slot(date(2026, 8, 8), 9, 12)]);
        assert!(schedule.availability_for_date(date(2026, 8, 8)).is_empty());
    }

    #[test]
    fn test_override_beats_weekly_default() {
        let mut schedule = weekend_schedule("u1", 10, 18);
        let d = date(2026, 8, 8);
        schedule
            .specific_availability
            .insert(d, vec![slot(d, 20, 22)]);
        assert_eq!(schedule.availability_for_date(d), vec![slot(d, 20, 22)]);
    }

    #[test]
    fn test_busy_slot_splits_free_time() {
        let mut schedule = weekend_schedule("u1", 10, 18);
        let d = date(2026, 8, 8);
        schedule.specific_busy.insert(d, vec![slot(d, 12, 14)]);
        assert_eq!(
            schedule.availability_for_date(d),
            vec![slot(d, 10, 12), slot(d, 14, 18)]
        );
    }

    #[test]
    fn test_common_availability_expected_intersection() {
        // One free Saturday 10-18, one free Saturday 14-22: the overlap is
        // exactly 14-18.
        let a = weekend_schedule("a", 10, 18);
        let b = weekend_schedule("b", 14, 22);
        let saturday = date(2026, 8, 8);
        let common = find_common_availability(
            &[&a, &b],
            saturday,
            saturday,
            Duration::hours(2),
        );
        assert_eq!(common, vec![slot(saturday, 14, 18)]);
    }

    #[test]
    fn test_common_availability_disjoint_is_empty() {
        let a = weekend_schedule("a", 8, 12);
        let b = weekend_schedule("b", 14, 22);
        let saturday = date(2026, 8, 8);
        let common =
            find_common_availability(&[&a, &b], saturday, saturday, Duration::hours(1));
        assert!(common.is_empty());
    }

    #[test]
    fn test_common_availability_min_duration_filter() {
        let a = weekend_schedule("a", 10, 18);
        let b = weekend_schedule("b", 17, 22);
        let saturday = date(2026, 8, 8);
        // Overlap is exactly one hour; a two-hour minimum drops it.
        let common =
            find_common_availability(&[&a, &b], saturday, saturday, Duration::hours(2));
        assert!(common.is_empty());
        let common =
            find_common_availability(&[&a, &b], saturday, saturday, Duration::hours(1));
        assert_eq!(common, vec![slot(saturday, 17, 18)]);
    }

    #[test]
    fn test_common_availability_no_schedules() {
        let saturday = date(2026, 8, 8);
        assert!(find_common_availability(&[], saturday, saturday, Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_shareable_availability_is_sorted_and_clean() {
        let mut schedule = weekend_schedule("u1", 10, 18);
        schedule.blackout_dates.push(BlackoutDate {
            start_date: date(2026, 8, 15),
            end_date: date(2026, 8, 16),
            reason: "family emergency".to_string(),
        });
        let offers = schedule.shareable_availability(date(2026, 8, 8), date(2026, 8, 16));
        assert!(!offers.is_empty());
        assert!(offers.windows(2).all(|w| w[0].start <= w[1].start));
        let json = serde_json::to_string(&offers).unwrap();
        assert!(!json.contains("family emergency"));
    }

    proptest! {
        /// Any intersection of two slots is contained in both inputs.
        #[test]
        fn prop_intersection_contained_in_both(
            a_start in 0i64..1000,
            a_len in 1i64..500,
            b_start in 0i64..1000,
            b_len in 1i64..500,
        ) {
            let base = date(2026, 8, 8).and_hms_opt(0, 0, 0).unwrap().and_utc();
            let a = TimeSlot::new(
                base + Duration::minutes(a_start),
                base + Duration::minutes(a_start + a_len),
            ).unwrap();
            let b = TimeSlot::new(
                base + Duration::minutes(b_start),
                base + Duration::minutes(b_start + b_len),
            ).unwrap();

            if let Some(overlap) = a.intersect(&b) {
                prop_assert!(overlap.start() >= a.start() && overlap.end() <= a.end());
                prop_assert!(overlap.start() >= b.start() && overlap.end() <= b.end());
                prop_assert!(a.overlaps(&b));
            } else {
                prop_assert!(!a.overlaps(&b));
            }
        }
    }
}
