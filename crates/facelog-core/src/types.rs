use crate::error::{FaceLogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// How an authentication attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptType {
    #[default]
    FaceRecognition,
    Manual,
    Api,
}

impl AttemptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FaceRecognition => "face_recognition",
            Self::Manual => "manual",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for AttemptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptType {
    type Err = FaceLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "face_recognition" => Ok(Self::FaceRecognition),
            "manual" => Ok(Self::Manual),
            "api" => Ok(Self::Api),
            other => Err(FaceLogError::Validation(format!(
                "attempt_type must be one of face_recognition, manual, api (got {other:?})"
            ))),
        }
    }
}

/// One recorded authentication event. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthAttempt {
    pub id: String,
    pub user_id: Option<String>,
    pub success: bool,
    /// Matcher confidence in [0, 1].
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempt_type: AttemptType,
}

/// Caller-supplied attempt, as it arrives from the outer surface.
///
/// `success` and `confidence` are optional here only so that a missing value
/// can be reported as a validation error rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthAttemptInput {
    pub user_id: Option<String>,
    pub success: Option<bool>,
    pub confidence: Option<f64>,
    /// Epoch seconds; fractional seconds are kept to millisecond precision.
    pub timestamp: Option<f64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempt_type: Option<AttemptType>,
}

impl AuthAttemptInput {
    /// Validate the input and turn it into a storable attempt.
    ///
    /// `now` is used when the caller did not supply a timestamp.
    pub fn into_attempt(self, now: DateTime<Utc>) -> Result<AuthAttempt> {
        let success = self
            .success
            .ok_or_else(|| FaceLogError::Validation("success is required".into()))?;

        let confidence = self
            .confidence
            .ok_or_else(|| FaceLogError::Validation("confidence is required".into()))?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(FaceLogError::Validation(format!(
                "confidence must be a number between 0 and 1 (got {confidence})"
            )));
        }

        let timestamp = match self.timestamp {
            Some(secs) => epoch_seconds_to_utc(secs)?,
            // Storage keeps millisecond precision.
            None => DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now),
        };

        let user_id = self.user_id.filter(|id| !id.trim().is_empty());

        Ok(AuthAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            success,
            confidence,
            timestamp,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            attempt_type: self.attempt_type.unwrap_or_default(),
        })
    }
}

fn epoch_seconds_to_utc(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(FaceLogError::Validation(
            "timestamp must be a valid number".into(),
        ));
    }
    let millis = (secs * 1000.0).round();
    if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return Err(FaceLogError::Validation(format!(
            "timestamp out of range: {secs}"
        )));
    }
    DateTime::from_timestamp_millis(millis as i64)
        .ok_or_else(|| FaceLogError::Validation(format!("timestamp out of range: {secs}")))
}

/// An enrolled identity, as seen by the statistics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub login_count: u64,
    pub is_active: bool,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Display data joined onto attempts when the user reference resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Registration request for a new user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

impl NewUser {
    /// Trim and lowercase the fields, rejecting names and emails the
    /// registry would refuse.
    pub fn normalized(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        let len = name.chars().count();
        if !(2..=100).contains(&len) {
            return Err(FaceLogError::Validation(
                "name must be between 2 and 100 characters".into(),
            ));
        }

        let email = self.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(FaceLogError::Validation(format!(
                "please provide a valid email (got {email:?})"
            )));
        }

        Ok(Self { name, email })
    }
}

fn is_plausible_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let labels: Vec<&str> = domain.split('.').collect();
    !local.is_empty()
        && !email.contains(char::is_whitespace)
        && labels.len() >= 2
        && labels.iter().all(|label| !label.is_empty())
}

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Filter for attempt queries. Every field is optional; bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptFilter {
    pub success: Option<bool>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AttemptFilter {
    /// Filter matching every attempt inside `window` (or all attempts).
    pub fn within(window: Option<Window>) -> Self {
        Self {
            from: window.map(|w| w.start),
            to: window.map(|w| w.end),
            ..Self::default()
        }
    }

    pub fn matches(&self, attempt: &AuthAttempt) -> bool {
        self.success.map_or(true, |s| attempt.success == s)
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| attempt.user_id.as_deref() == Some(u))
            && self.from.map_or(true, |from| attempt.timestamp >= from)
            && self.to.map_or(true, |to| attempt.timestamp <= to)
    }
}

/// 1-based page selection with a clamped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Build a pagination, forcing `page >= 1` and `1 <= per_page <= 100`.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset of the first record on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.per_page)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.per_page.max(1)))
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of results together with the counts needed to render paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: u64) -> Self {
        Self {
            items,
            current_page: pagination.page,
            per_page: pagination.per_page,
            total,
            total_pages: pagination.total_pages(total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}
