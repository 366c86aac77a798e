//! Serializable read models returned by the service.

use chrono::{DateTime, Utc};
use facelog_core::{AuthAttempt, BreakdownEntry, Period, Stats, User, UserStats, UserSummary};
use serde::Serialize;

/// An attempt with its user's display data, when the reference resolves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptView {
    #[serde(flatten)]
    pub attempt: AuthAttempt,
    pub user: Option<UserSummary>,
}

/// Stats for a named period plus its time-bucketed breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReport {
    pub period: Period,
    pub summary: PeriodSummary,
    pub breakdown: Vec<BreakdownEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    #[serde(flatten)]
    pub stats: Stats,
    /// Active users at the time of the report.
    pub total_users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub overview: Overview,
    pub all_time: Stats,
    pub recent_24h: Stats,
    pub recent_failures: Vec<AttemptView>,
    pub top_users: Vec<TopUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_users: u64,
    pub active_users: u64,
    pub total_attempts: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub login_count: u64,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for TopUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            login_count: user.login_count,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub recent_activity: Vec<AttemptView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatsReport {
    pub user: User,
    pub authentication_stats: UserStats,
}
