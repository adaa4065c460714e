use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the user prefers to hear about plans.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommunicationStyle {
    Direct,
    #[default]
    Gentle,
    Minimal,
}

/// Budget preferences for events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min_amount: f64,
    pub max_amount: f64,
    pub currency: String,
    /// Can stretch for special occasions.
    pub flexible: bool,
}

impl Default for BudgetRange {
    fn default() -> Self {
        Self {
            min_amount: 0.0,
            max_amount: 500.0,
            currency: "USD".to_string(),
            flexible: true,
        }
    }
}

/// A recurring weekly availability window. `day_of_week` is 0 = Monday
/// through 6 = Sunday; hours are 0-23.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub day_of_week: u32,
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default)]
    pub label: String,
}

/// A date range when the user is unavailable. The reason stays private.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutDate {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reason: String,
}

impl BlackoutDate {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// A registered user and their standing preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub default_availability: Vec<AvailabilityBlock>,
    #[serde(default)]
    pub blackout_dates: Vec<BlackoutDate>,
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub budget_range: BudgetRange,
    #[serde(default)]
    pub dietary: Vec<String>,
    #[serde(default)]
    pub accessibility: Vec<String>,
    #[serde(default = "default_travel_radius")]
    pub travel_radius_miles: u32,
    #[serde(default)]
    pub communication_style: CommunicationStyle,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        let agent_uuid = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("USR-{}", &uuid[..8].to_uppercase()),
            name: name.into(),
            agent_id: format!("AGENT-{}", &agent_uuid[..12]),
            created_at: Utc::now(),
            default_availability: Vec::new(),
            blackout_dates: Vec::new(),
            timezone: default_timezone(),
            budget_range: BudgetRange::default(),
            dietary: Vec::new(),
            accessibility: Vec::new(),
            travel_radius_miles: default_travel_radius(),
            communication_style: CommunicationStyle::default(),
        }
    }

    /// Human-friendly code for connecting with friends.
    pub fn friend_code(&self) -> String {
        let name_part: String = self
            .name
            .to_uppercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .take(5)
            .collect();
        let id_part = self.id.split('-').nth(1).unwrap_or("0000");
        format!("TS-{}-{}", name_part, &id_part[..id_part.len().min(4)])
    }

    /// Whether the weekly availability covers the given instant, taking
    /// blackout dates into account.
    pub fn is_available(&self, at: DateTime<Utc>) -> bool {
        let date = at.date_naive();
        if self.blackout_dates.iter().any(|b| b.covers(date)) {
            return false;
        }

        let day_of_week = date.weekday().num_days_from_monday();
        let hour = at.hour();
        self.default_availability
            .iter()
            .any(|b| b.day_of_week == day_of_week && b.start_hour <= hour && hour < b.end_hour)
    }

    /// The projection of this profile that other agents may see.
    pub fn shareable_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            timezone: self.timezone.clone(),
            travel_radius_miles: self.travel_radius_miles,
            dietary: self.dietary.clone(),
            accessibility: self.accessibility.clone(),
            budget_min: self.budget_range.min_amount,
            budget_max: self.budget_range.max_amount,
            budget_flexible: self.budget_range.flexible,
        }
    }
}

/// Shareable projection of a [`User`]. Blackout reasons, communication style
/// and everything else not listed here never leave the owning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub travel_radius_miles: u32,
    pub dietary: Vec<String>,
    pub accessibility: Vec<String>,
    pub budget_min: f64,
    pub budget_max: f64,
    pub budget_flexible: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_travel_radius() -> u32 {
    50
}
