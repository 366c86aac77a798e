//! Authentication log service: ingestion, queries and aggregate reports.
//!
//! Stateless apart from the storage handles; every call reads current state.

use crate::report::{
    AttemptView, DashboardView, Overview, PeriodReport, PeriodSummary, TopUser, UserDetail,
    UserStatsReport,
};
use chrono::Utc;
use facelog_core::{
    AttemptFilter, AttemptStore, AuthAttempt, AuthAttemptInput, BreakdownEntry, FaceLogError,
    Granularity, NewUser, Page, Pagination, Period, Result, Stats, User, UserRegistry, UserStats,
    UserSummary, Window,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Attempts shown in a user's recent activity.
const USER_ACTIVITY_LIMIT: u32 = 5;

/// Size limits for composite reads.
#[derive(Debug, Clone, Copy)]
pub struct ServiceLimits {
    pub dashboard_failures: u32,
    pub dashboard_top_users: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            dashboard_failures: 10,
            dashboard_top_users: 5,
        }
    }
}

pub struct AuthLogService {
    attempts: Arc<dyn AttemptStore>,
    users: Arc<dyn UserRegistry>,
    limits: ServiceLimits,
}

impl AuthLogService {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        users: Arc<dyn UserRegistry>,
        limits: ServiceLimits,
    ) -> Self {
        Self {
            attempts,
            users,
            limits,
        }
    }

    /// Validate and persist an attempt, crediting the user on success.
    ///
    /// The attempt and the counter update commit together, so a failed
    /// call leaves neither behind. An unknown `user_id` leaves the attempt
    /// recorded and skips the counter.
    pub async fn record(&self, input: AuthAttemptInput) -> Result<AuthAttempt> {
        let now = Utc::now();
        let attempt = input.into_attempt(now)?;
        let credited = self.attempts.append_crediting(&attempt, now).await?;
        tracing::debug!(
            id = %attempt.id,
            user_id = ?attempt.user_id,
            success = attempt.success,
            confidence = attempt.confidence,
            credited,
            "attempt recorded"
        );

        if attempt.success && !credited {
            if let Some(user_id) = &attempt.user_id {
                tracing::debug!(user_id, "login counter not updated: unknown user");
            }
        }
        Ok(attempt)
    }

    /// Bump the user's login counter. Unknown users are ignored.
    pub async fn record_success(&self, user_id: &str) -> Result<()> {
        let updated = self.users.increment_login_count(user_id, Utc::now()).await?;
        if !updated {
            tracing::debug!(user_id, "login counter not updated: unknown user");
        }
        Ok(())
    }

    /// Page through attempts, most recent first, joined with user display data.
    pub async fn query(
        &self,
        filter: &AttemptFilter,
        pagination: Pagination,
    ) -> Result<Page<AttemptView>> {
        let page = self.attempts.page(filter, pagination).await?;
        let names = self.resolve_users(&page.items).await?;
        Ok(page.map(|attempt| attach_user(attempt, &names)))
    }

    pub async fn compute_stats(&self, window: Option<Window>) -> Result<Stats> {
        let acc = self.attempts.fold_stats(&AttemptFilter::within(window)).await?;
        Ok(acc.finish())
    }

    pub async fn compute_breakdown(
        &self,
        window: Option<Window>,
        granularity: Granularity,
    ) -> Result<Vec<BreakdownEntry>> {
        self.attempts
            .fold_breakdown(&AttemptFilter::within(window), granularity)
            .await
    }

    /// Stats, active user count and breakdown for a named period.
    /// Unrecognized period names are reported as `24h`.
    pub async fn period_report(&self, period: &str) -> Result<PeriodReport> {
        let period = Period::parse(period);
        let filter = AttemptFilter::within(period.window(Utc::now()));

        let (acc, breakdown, total_users) = tokio::try_join!(
            self.attempts.fold_stats(&filter),
            self.attempts.fold_breakdown(&filter, period.granularity()),
            self.users.count_active(),
        )?;

        Ok(PeriodReport {
            period,
            summary: PeriodSummary {
                stats: acc.finish(),
                total_users,
            },
            breakdown,
        })
    }

    /// Compose the dashboard. Any failing sub-query fails the whole read.
    ///
    /// Recent failures cover the same trailing 24 hours as `recent_24h`.
    pub async fn dashboard(&self) -> Result<DashboardView> {
        let last_day = Period::LastDay.window(Utc::now());
        let failures = AttemptFilter {
            success: Some(false),
            ..AttemptFilter::within(last_day)
        };

        let (all_time, recent_24h, total_users, active_users, failed, top) = tokio::try_join!(
            self.compute_stats(None),
            self.compute_stats(last_day),
            self.users.count_all(),
            self.users.count_active(),
            self.attempts
                .page(&failures, Pagination::new(1, self.limits.dashboard_failures)),
            self.users.top_by_login_count(self.limits.dashboard_top_users),
        )?;

        let names = self.resolve_users(&failed.items).await?;
        let recent_failures = failed
            .items
            .into_iter()
            .map(|attempt| attach_user(attempt, &names))
            .collect();

        Ok(DashboardView {
            overview: Overview {
                total_users,
                active_users,
                total_attempts: all_time.total_attempts,
                success_rate: all_time.success_rate,
            },
            all_time,
            recent_24h,
            recent_failures,
            top_users: top.into_iter().map(TopUser::from).collect(),
        })
    }

    /// Profile and most recent attempts of one user.
    pub async fn user_detail(&self, user_id: &str) -> Result<UserDetail> {
        let user = self.require_user(user_id).await?;
        let filter = AttemptFilter {
            user_id: Some(user.id.clone()),
            ..AttemptFilter::default()
        };
        let recent = self
            .attempts
            .page(&filter, Pagination::new(1, USER_ACTIVITY_LIMIT))
            .await?;
        let summary = user.summary();
        let recent_activity = recent
            .items
            .into_iter()
            .map(|attempt| AttemptView {
                attempt,
                user: Some(summary.clone()),
            })
            .collect();
        Ok(UserDetail {
            user,
            recent_activity,
        })
    }

    /// Profile and lifetime stats of one user.
    pub async fn user_stats(&self, user_id: &str) -> Result<UserStatsReport> {
        let user = self.require_user(user_id).await?;
        let filter = AttemptFilter {
            user_id: Some(user.id.clone()),
            ..AttemptFilter::default()
        };
        let acc = self.attempts.fold_stats(&filter).await?;
        Ok(UserStatsReport {
            user,
            authentication_stats: UserStats::from(&acc),
        })
    }

    pub async fn register_user(&self, user: NewUser) -> Result<User> {
        self.users.register(user).await
    }

    pub async fn set_user_active(&self, user_id: &str, active: bool) -> Result<bool> {
        self.users.set_active(user_id, active).await
    }

    pub async fn remove_user(&self, user_id: &str) -> Result<bool> {
        let removed = self.users.remove(user_id).await?;
        if removed {
            tracing::info!(user_id, "user removed; attempts retained");
        }
        Ok(removed)
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| FaceLogError::NotFound(format!("user {user_id}")))
    }

    /// Look up display data for every distinct user referenced by `attempts`.
    /// References that no longer resolve are simply absent from the map.
    async fn resolve_users(&self, attempts: &[AuthAttempt]) -> Result<HashMap<String, UserSummary>> {
        let mut names = HashMap::new();
        for user_id in attempts.iter().filter_map(|a| a.user_id.as_deref()) {
            if names.contains_key(user_id) {
                continue;
            }
            if let Some(user) = self.users.find_by_id(user_id).await? {
                names.insert(user_id.to_string(), user.summary());
            }
        }
        Ok(names)
    }
}

fn attach_user(attempt: AuthAttempt, names: &HashMap<String, UserSummary>) -> AttemptView {
    let user = attempt
        .user_id
        .as_deref()
        .and_then(|id| names.get(id))
        .cloned();
    AttemptView { attempt, user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use facelog_core::{StatsAccumulator, MAX_BUCKETS};
    use facelog_store::SqliteStore;

    async fn service() -> (AuthLogService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let service = AuthLogService::new(store.clone(), store.clone(), ServiceLimits::default());
        (service, store)
    }

    fn input(user: Option<&str>, success: bool, confidence: f64) -> AuthAttemptInput {
        AuthAttemptInput {
            user_id: user.map(str::to_string),
            success: Some(success),
            confidence: Some(confidence),
            ..Default::default()
        }
    }

    fn at(mut input: AuthAttemptInput, t: DateTime<Utc>) -> AuthAttemptInput {
        input.timestamp = Some(t.timestamp_millis() as f64 / 1000.0);
        input
    }

    async fn register(service: &AuthLogService, name: &str, email: &str) -> User {
        service
            .register_user(NewUser { name: name.into(), email: email.into() })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_then_query_returns_entry() {
        let (service, _) = service().await;
        let recorded = service.record(input(None, true, 0.87)).await.unwrap();

        let page = service
            .query(&AttemptFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].attempt, recorded);
        assert!((0.0..=1.0).contains(&page.items[0].attempt.confidence));
        assert!(page.items[0].user.is_none());
    }

    #[tokio::test]
    async fn test_record_rejects_invalid_input() {
        let (service, _) = service().await;
        let err = service.record(input(None, true, 1.2)).await.unwrap_err();
        assert!(matches!(err, FaceLogError::Validation(_)));

        let missing = AuthAttemptInput { confidence: Some(0.5), ..Default::default() };
        assert!(matches!(
            service.record(missing).await,
            Err(FaceLogError::Validation(_))
        ));

        let stats = service.compute_stats(None).await.unwrap();
        assert_eq!(stats.total_attempts, 0, "rejected input is not persisted");
    }

    #[tokio::test]
    async fn test_success_credits_known_user_only() {
        let (service, store) = service().await;
        let user = register(&service, "Ada Lovelace", "ada@example.com").await;

        service.record(input(Some(&user.id), true, 0.9)).await.unwrap();
        service.record(input(Some(&user.id), false, 0.3)).await.unwrap();
        service.record(input(Some(&user.id), true, 0.8)).await.unwrap();
        // Unknown user: still recorded, counter untouched.
        service.record(input(Some("ghost"), true, 0.95)).await.unwrap();

        let user = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.login_count, 2);
        assert!(user.last_login.is_some());
        assert_eq!(service.compute_stats(None).await.unwrap().total_attempts, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_successes_for_one_user() {
        const K: usize = 40;
        let (service, store) = service().await;
        let service = Arc::new(service);
        let user = register(&service, "Grace Hopper", "grace@example.com").await;

        let tasks: Vec<_> = (0..K)
            .map(|_| {
                let service = service.clone();
                let id = user.id.clone();
                tokio::spawn(async move { service.record(input(Some(&id), true, 0.9)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let user = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.login_count, K as u64);
    }

    #[tokio::test]
    async fn test_stats_example_scenario() {
        let (service, _) = service().await;
        for (success, confidence) in [(true, 0.9), (false, 0.4), (true, 0.7)] {
            service.record(input(None, success, confidence)).await.unwrap();
        }
        let stats = service.compute_stats(None).await.unwrap();
        assert_eq!(
            stats,
            Stats {
                total_attempts: 3,
                successful_attempts: 2,
                failed_attempts: 1,
                success_rate: 66.67,
                avg_confidence: 0.667,
            }
        );
    }

    #[tokio::test]
    async fn test_stats_window_excludes_outside_attempts() {
        let (service, _) = service().await;
        let now = Utc::now();
        service.record(at(input(None, true, 0.9), now - Duration::days(3))).await.unwrap();
        service.record(at(input(None, false, 0.2), now - Duration::hours(2))).await.unwrap();

        let window = Period::LastDay.window(Utc::now());
        let stats = service.compute_stats(window).await.unwrap();
        assert_eq!(stats.total_attempts, 1);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_empty_stats_and_dashboard() {
        let (service, _) = service().await;
        assert_eq!(service.compute_stats(None).await.unwrap(), Stats::default());

        let dash = service.dashboard().await.unwrap();
        assert_eq!(dash.overview.total_attempts, 0);
        assert_eq!(dash.overview.success_rate, 0.0);
        assert!(dash.recent_failures.is_empty());
        assert!(dash.top_users.is_empty());
    }

    #[tokio::test]
    async fn test_breakdown_is_sorted_and_capped() {
        let (service, _) = service().await;
        let now = Utc::now();
        for day in 0..30 {
            service
                .record(at(input(None, day % 3 != 0, 0.6), now - Duration::days(day)))
                .await
                .unwrap();
        }

        let breakdown = service.compute_breakdown(None, Granularity::Daily).await.unwrap();
        assert!(breakdown.len() <= MAX_BUCKETS);
        assert!(breakdown.windows(2).all(|w| w[0].bucket_label < w[1].bucket_label));
        assert_eq!(
            breakdown.last().unwrap().bucket_label,
            Granularity::Daily.bucket_label(now)
        );
    }

    #[tokio::test]
    async fn test_unknown_period_behaves_like_24h() {
        let (service, _) = service().await;
        let now = Utc::now();
        service.record(at(input(None, true, 0.9), now - Duration::hours(1))).await.unwrap();
        service.record(at(input(None, true, 0.9), now - Duration::days(2))).await.unwrap();

        let fallback = service.period_report("99x").await.unwrap();
        let day = service.period_report("24h").await.unwrap();
        assert_eq!(fallback.period, Period::LastDay);
        assert_eq!(fallback.summary, day.summary);
        assert_eq!(fallback.summary.stats.total_attempts, 1);

        let all = service.period_report("all").await.unwrap();
        assert_eq!(all.summary.stats.total_attempts, 2);
    }

    #[tokio::test]
    async fn test_hourly_report_for_last_hour() {
        let (service, _) = service().await;
        service.record(input(None, true, 0.9)).await.unwrap();
        let report = service.period_report("1h").await.unwrap();
        assert_eq!(report.breakdown.len(), 1);
        assert!(report.breakdown[0].bucket_label.ends_with(":00"));
    }

    #[tokio::test]
    async fn test_deleted_user_does_not_break_query() {
        let (service, _) = service().await;
        let kept = register(&service, "Alan Turing", "alan@example.com").await;
        let gone = register(&service, "Kurt Godel", "kurt@example.com").await;
        service.record(input(Some(&kept.id), false, 0.2)).await.unwrap();
        service.record(input(Some(&gone.id), false, 0.1)).await.unwrap();
        assert!(service.remove_user(&gone.id).await.unwrap());

        let page = service
            .query(&AttemptFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        for view in &page.items {
            match view.attempt.user_id.as_deref() {
                Some(id) if id == kept.id => {
                    assert_eq!(view.user.as_ref().unwrap().name, "Alan Turing")
                }
                _ => assert!(view.user.is_none()),
            }
        }
    }

    #[tokio::test]
    async fn test_dashboard_composition() {
        let (service, _) = service().await;
        let ada = register(&service, "Ada Lovelace", "ada@example.com").await;
        let bob = register(&service, "Bob Kahn", "bob@example.com").await;
        let idle = register(&service, "Idle User", "idle@example.com").await;
        service.set_user_active(&idle.id, false).await.unwrap();

        for _ in 0..3 {
            service.record(input(Some(&ada.id), true, 0.95)).await.unwrap();
        }
        service.record(input(Some(&bob.id), true, 0.9)).await.unwrap();
        for _ in 0..12 {
            service.record(input(Some(&bob.id), false, 0.2)).await.unwrap();
        }
        let old = Utc::now() - Duration::days(5);
        service.record(at(input(None, true, 0.5), old)).await.unwrap();

        let dash = service.dashboard().await.unwrap();
        assert_eq!(dash.overview.total_users, 3);
        assert_eq!(dash.overview.active_users, 2);
        assert_eq!(dash.all_time.total_attempts, 17);
        assert_eq!(dash.recent_24h.total_attempts, 16);
        assert_eq!(dash.overview.success_rate, dash.all_time.success_rate);

        assert_eq!(dash.recent_failures.len(), 10);
        assert!(dash.recent_failures.iter().all(|v| !v.attempt.success));
        assert_eq!(dash.recent_failures[0].user.as_ref().unwrap().email, "bob@example.com");

        let top: Vec<_> = dash.top_users.iter().map(|u| (u.name.as_str(), u.login_count)).collect();
        assert_eq!(top, [("Ada Lovelace", 3), ("Bob Kahn", 1)]);
        assert!(dash.top_users[0].last_login.is_some());
    }

    #[tokio::test]
    async fn test_user_reports() {
        let (service, _) = service().await;
        let user = register(&service, "Barbara Liskov", "barbara@example.com").await;
        for i in 0..7 {
            service.record(input(Some(&user.id), i % 2 == 0, 0.5)).await.unwrap();
        }

        let detail = service.user_detail(&user.id).await.unwrap();
        assert_eq!(detail.recent_activity.len(), USER_ACTIVITY_LIMIT as usize);
        assert_eq!(detail.user.login_count, 4);

        let report = service.user_stats(&user.id).await.unwrap();
        assert_eq!(report.authentication_stats.stats.total_attempts, 7);
        assert_eq!(report.authentication_stats.stats.successful_attempts, 4);
        assert!(report.authentication_stats.last_attempt.is_some());

        assert!(matches!(
            service.user_stats("nobody").await,
            Err(FaceLogError::NotFound(_))
        ));
        assert!(matches!(
            service.user_detail("nobody").await,
            Err(FaceLogError::NotFound(_))
        ));
    }

    struct FailingRegistry;

    #[async_trait]
    impl UserRegistry for FailingRegistry {
        async fn find_by_id(&self, _: &str) -> Result<Option<User>> {
            Ok(None)
        }
        async fn increment_login_count(&self, _: &str, _: DateTime<Utc>) -> Result<bool> {
            Ok(false)
        }
        async fn count_active(&self) -> Result<u64> {
            Err(FaceLogError::Storage("registry offline".into()))
        }
        async fn count_all(&self) -> Result<u64> {
            Ok(0)
        }
        async fn top_by_login_count(&self, _: usize) -> Result<Vec<User>> {
            Ok(Vec::new())
        }
        async fn register(&self, _: NewUser) -> Result<User> {
            Err(FaceLogError::Storage("registry offline".into()))
        }
        async fn set_active(&self, _: &str, _: bool) -> Result<bool> {
            Ok(false)
        }
        async fn remove(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_dashboard_fails_as_a_whole() {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let service = AuthLogService::new(store, Arc::new(FailingRegistry), ServiceLimits::default());

        service.record(input(Some("u1"), true, 0.9)).await.unwrap();
        let err = service.dashboard().await.unwrap_err();
        assert_eq!(err, FaceLogError::Storage("registry offline".into()));
    }

    #[tokio::test]
    async fn test_dashboard_failures_cover_last_day_only() {
        let (service, _) = service().await;
        let old = Utc::now() - Duration::days(5);
        service.record(at(input(None, false, 0.1), old)).await.unwrap();

        let dash = service.dashboard().await.unwrap();
        assert_eq!(dash.recent_24h.total_attempts, 0);
        assert!(dash.recent_failures.is_empty());

        service.record(input(None, false, 0.2)).await.unwrap();
        let dash = service.dashboard().await.unwrap();
        assert_eq!(dash.recent_failures.len(), 1);
        assert!(dash.recent_failures[0].attempt.timestamp > old);
    }

    #[tokio::test]
    async fn test_user_detail_activity_carries_user() {
        let (service, _) = service().await;
        let user = register(&service, "Frances Allen", "fran@example.com").await;
        service.record(input(Some(&user.id), true, 0.8)).await.unwrap();

        let detail = service.user_detail(&user.id).await.unwrap();
        assert_eq!(detail.recent_activity.len(), 1);
        assert_eq!(detail.recent_activity[0].user, Some(user.summary()));
    }

    /// Delegates to SQLite but refuses every credited write.
    struct CreditFailsStore(SqliteStore);

    #[async_trait]
    impl AttemptStore for CreditFailsStore {
        async fn append(&self, attempt: &AuthAttempt) -> Result<()> {
            self.0.append(attempt).await
        }
        async fn append_crediting(&self, _: &AuthAttempt, _: DateTime<Utc>) -> Result<bool> {
            Err(FaceLogError::Storage("disk I/O error".into()))
        }
        async fn page(&self, filter: &AttemptFilter, pagination: Pagination) -> Result<Page<AuthAttempt>> {
            self.0.page(filter, pagination).await
        }
        async fn fold_stats(&self, filter: &AttemptFilter) -> Result<StatsAccumulator> {
            self.0.fold_stats(filter).await
        }
        async fn fold_breakdown(
            &self,
            filter: &AttemptFilter,
            granularity: Granularity,
        ) -> Result<Vec<BreakdownEntry>> {
            self.0.fold_breakdown(filter, granularity).await
        }
    }

    #[tokio::test]
    async fn test_failed_record_leaves_no_partial_state() {
        let sqlite = SqliteStore::open_in_memory().await.unwrap();
        let users = Arc::new(sqlite.clone());
        let service = AuthLogService::new(
            Arc::new(CreditFailsStore(sqlite)),
            users.clone(),
            ServiceLimits::default(),
        );
        let user = register(&service, "Ada Lovelace", "ada@example.com").await;

        let err = service.record(input(Some(&user.id), true, 0.9)).await.unwrap_err();
        assert_eq!(err, FaceLogError::Storage("disk I/O error".into()));
        assert_eq!(service.compute_stats(None).await.unwrap().total_attempts, 0);
        assert_eq!(users.find_by_id(&user.id).await.unwrap().unwrap().login_count, 0);
    }
}
