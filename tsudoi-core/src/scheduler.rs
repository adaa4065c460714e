//! Event-type scheduling policy and the search for time that works for
//! everyone.
//!
//! "No slots found" is a result, not an error: the coordination engine
//! decides whether to widen the search. Ranking is deterministic; identical
//! inputs always produce identical output.

use chrono::{Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::event::EventType;
use crate::model::schedule::{find_common_availability, Schedule, TimeSlot};

impl EventType {
    /// Typical duration for this kind of event.
    pub fn default_duration(&self) -> Duration {
        match self {
            EventType::Trip => Duration::hours(48),
            EventType::Hangout => Duration::hours(3),
            EventType::Dinner => Duration::minutes(150),
            EventType::Activity => Duration::hours(3),
            EventType::Party => Duration::hours(4),
            EventType::Movie => Duration::hours(3),
            EventType::GameNight => Duration::hours(4),
            EventType::Outdoor => Duration::hours(5),
        }
    }

    /// Preferred start-hour band `[start, end)`, if this kind of event has
    /// one.
    pub fn preferred_hours(&self) -> Option<(u32, u32)> {
        match self {
            EventType::Dinner => Some((18, 21)),
            EventType::Movie => Some((14, 21)),
            EventType::GameNight => Some((19, 23)),
            EventType::Outdoor => Some((9, 17)),
            EventType::Hangout => Some((10, 22)),
            EventType::Activity => Some((10, 20)),
            EventType::Party => Some((18, 23)),
            EventType::Trip => Some((0, 24)),
        }
    }
}

/// Source of "today", injected so date suggestions are testable.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock pinned to a fixed date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Per-participant scheduling flags that influence ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPrefs {
    #[serde(default)]
    pub budget_conscious: bool,
    #[serde(default)]
    pub early_bird: bool,
    #[serde(default)]
    pub night_owl: bool,
}

/// Finds and ranks time windows usable by every registered participant.
pub struct Scheduler {
    schedules: HashMap<String, Schedule>,
    clock: Arc<dyn Clock>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            schedules: HashMap::new(),
            clock,
        }
    }

    pub fn add_schedule(&mut self, user_id: impl Into<String>, schedule: Schedule) {
        self.schedules.insert(user_id.into(), schedule);
    }

    pub fn participant_count(&self) -> usize {
        self.schedules.len()
    }

    /// Slots in the date range where every participant is free for at least
    /// `min_duration` (defaulting to the event type's typical duration).
    ///
    /// When the event type has a preferred hour band and at least one
    /// candidate starts inside it, only those candidates are kept; otherwise
    /// all candidates survive rather than returning nothing because nobody
    /// is free in the ideal hours. No ordering is implied; callers needing
    /// chronological order must sort.
    pub fn find_common_slots(
        &self,
        event_type: EventType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        min_duration: Option<Duration>,
    ) -> Vec<TimeSlot> {
        if self.schedules.is_empty() {
            return Vec::new();
        }

        let min_duration = min_duration.unwrap_or_else(|| event_type.default_duration());
        let schedules: Vec<&Schedule> = self.schedules.values().collect();
        let mut common = find_common_availability(&schedules, start_date, end_date, min_duration);

        if let Some((pref_start, pref_end)) = event_type.preferred_hours() {
            let filtered: Vec<TimeSlot> = common
                .iter()
                .copied()
                .filter(|slot| {
                    let hour = slot.start().hour();
                    pref_start <= hour && hour < pref_end
                })
                .collect();
            if !filtered.is_empty() {
                common = filtered;
            }
        }

        common
    }

    /// Scores slots by desirability, highest first. The heuristic is fully
    /// deterministic and ties keep their input order.
    pub fn rank_slots(
        &self,
        slots: &[TimeSlot],
        event_type: EventType,
        preferences: &HashMap<String, ParticipantPrefs>,
    ) -> Vec<(TimeSlot, f64)> {
        let mut ranked: Vec<(TimeSlot, f64)> = slots
            .iter()
            .map(|slot| {
                let mut score = 100.0;
                let hour = slot.start().hour();

                // Weekends suit social events.
                if slot.start().weekday().num_days_from_monday() >= 5 {
                    score += 10.0;
                }

                // Not too early, not too late.
                if (10..=19).contains(&hour) {
                    score += 5.0;
                } else if hour < 9 || hour > 21 {
                    score -= 10.0;
                }

                // Longer slots leave more flexibility.
                if slot.duration_hours() >= 4.0 {
                    score += 5.0;
                }

                match event_type {
                    EventType::Dinner if (18..=20).contains(&hour) => score += 15.0,
                    EventType::Outdoor if (10..=14).contains(&hour) => score += 15.0,
                    EventType::GameNight if (19..=20).contains(&hour) => score += 15.0,
                    _ => {}
                }

                for prefs in preferences.values() {
                    if prefs.budget_conscious && hour >= 18 {
                        score -= 5.0; // dinner hours tend to be pricier
                    }
                    if prefs.early_bird && hour >= 20 {
                        score -= 10.0;
                    } else if prefs.night_owl && hour <= 10 {
                        score -= 10.0;
                    }
                }

                (*slot, score)
            })
            .collect();

        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Date range worth searching for this event type. Trips need lead time;
    /// everything else starts a few days out.
    pub fn suggest_date_range(&self, event_type: EventType) -> (NaiveDate, NaiveDate) {
        let today = self.clock.today();
        match event_type {
            EventType::Trip => {
                let start = today + Duration::days(14);
                (start, start + Duration::days(60))
            }
            _ => {
                let start = today + Duration::days(3);
                (start, start + Duration::days(30))
            }
        }
    }

    /// The soonest slot that works for everyone inside the suggested range.
    pub fn next_available_slot(
        &self,
        event_type: EventType,
        min_duration: Option<Duration>,
    ) -> Option<TimeSlot> {
        let (start_date, end_date) = self.suggest_date_range(event_type);
        self.find_common_slots(event_type, start_date, end_date, min_duration)
            .into_iter()
            .min_by_key(|slot| slot.start())
    }

    /// Which participants cannot cover the whole proposed slot. Maps
    /// user id -> has a conflict.
    pub fn check_conflicts(&self, proposed: &TimeSlot) -> HashMap<String, bool> {
        self.schedules
            .iter()
            .map(|(user_id, schedule)| {
                let available = schedule.availability_for_date(proposed.start().date_naive());
                let fits = available
                    .iter()
                    .any(|slot| slot.start() <= proposed.start() && slot.end() >= proposed.end());
                (user_id.clone(), !fits)
            })
            .collect()
    }

    /// Common slots in a window around a rejected slot, never starting in
    /// the past.
    pub fn find_alternatives(
        &self,
        original: &TimeSlot,
        event_type: EventType,
        days_to_search: i64,
    ) -> Vec<TimeSlot> {
        let original_date = original.start().date_naive();
        let mut start_date = original_date - Duration::days(3);
        let end_date = original_date + Duration::days(days_to_search);

        let today = self.clock.today();
        if start_date < today {
            start_date = today + Duration::days(1);
        }

        self.find_common_slots(event_type, start_date, end_date, None)
    }
}
