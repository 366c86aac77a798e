use crate::service::AuthLogService;
use chrono::{DateTime, NaiveDate, Utc};
use facelog_core::{AttemptFilter, AuthAttemptInput, FaceLogError, NewUser, Pagination};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use zbus::{fdo, interface};

pub const BUS_NAME: &str = "org.freedesktop.FaceLog1";
pub const OBJECT_PATH: &str = "/org/freedesktop/FaceLog1";

/// Query accepted by `Logs`, mirroring the log listing parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogsRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub success: Option<bool>,
    pub user_id: Option<String>,
    /// RFC 3339 timestamp, or `YYYY-MM-DD` for the start of that UTC day.
    #[serde(deserialize_with = "date_bound")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "date_bound")]
    pub date_to: Option<DateTime<Utc>>,
}

fn date_bound<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| {
        parse_date_bound(&value).ok_or_else(|| {
            <D::Error as de::Error>::custom(format!(
                "invalid date {value:?}: expected RFC 3339 or YYYY-MM-DD"
            ))
        })
    })
    .transpose()
}

fn parse_date_bound(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

impl LogsRequest {
    pub fn into_parts(self, default_page_size: u32) -> (AttemptFilter, Pagination) {
        let filter = AttemptFilter {
            success: self.success,
            user_id: self.user_id,
            from: self.date_from,
            to: self.date_to,
        };
        let pagination = Pagination::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(default_page_size),
        );
        (filter, pagination)
    }
}

#[derive(Serialize)]
struct Logged<'a> {
    log_id: &'a str,
}

/// D-Bus interface for the facelog daemon.
///
/// Bus name: org.freedesktop.FaceLog1
/// Object path: /org/freedesktop/FaceLog1
///
/// Structured arguments and results travel as JSON strings.
pub struct FaceLogInterface {
    service: Arc<AuthLogService>,
    db_path: PathBuf,
    default_page_size: u32,
}

impl FaceLogInterface {
    pub fn new(service: Arc<AuthLogService>, db_path: PathBuf, default_page_size: u32) -> Self {
        Self {
            service,
            db_path,
            default_page_size,
        }
    }
}

#[interface(name = "org.freedesktop.FaceLog1")]
impl FaceLogInterface {
    /// Record one authentication attempt. Returns `{"log_id": ...}`.
    async fn log_attempt(&self, attempt: &str) -> fdo::Result<String> {
        let input: AuthAttemptInput = decode(attempt)?;
        let recorded = self.service.record(input).await.map_err(to_fdo)?;
        encode(&Logged {
            log_id: &recorded.id,
        })
    }

    /// Page through attempts, newest first.
    async fn logs(&self, query: &str) -> fdo::Result<String> {
        let request: LogsRequest = if query.trim().is_empty() {
            LogsRequest::default()
        } else {
            decode(query)?
        };
        let (filter, pagination) = request.into_parts(self.default_page_size);
        let page = self
            .service
            .query(&filter, pagination)
            .await
            .map_err(to_fdo)?;
        encode(&page)
    }

    /// Stats and breakdown for `1h`, `24h`, `7d`, `30d` or `all`.
    async fn stats(&self, period: &str) -> fdo::Result<String> {
        let report = self.service.period_report(period).await.map_err(to_fdo)?;
        encode(&report)
    }

    async fn dashboard(&self) -> fdo::Result<String> {
        let view = self.service.dashboard().await.map_err(to_fdo)?;
        encode(&view)
    }

    async fn register_user(&self, name: &str, email: &str) -> fdo::Result<String> {
        tracing::info!(name, "register_user requested");
        let user = self
            .service
            .register_user(NewUser {
                name: name.to_string(),
                email: email.to_string(),
            })
            .await
            .map_err(to_fdo)?;
        encode(&user)
    }

    async fn set_user_active(&self, user_id: &str, active: bool) -> fdo::Result<bool> {
        tracing::info!(user_id, active, "set_user_active requested");
        self.service
            .set_user_active(user_id, active)
            .await
            .map_err(to_fdo)
    }

    async fn remove_user(&self, user_id: &str) -> fdo::Result<bool> {
        tracing::info!(user_id, "remove_user requested");
        self.service.remove_user(user_id).await.map_err(to_fdo)
    }

    async fn user_detail(&self, user_id: &str) -> fdo::Result<String> {
        let detail = self.service.user_detail(user_id).await.map_err(to_fdo)?;
        encode(&detail)
    }

    async fn user_stats(&self, user_id: &str) -> fdo::Result<String> {
        let report = self.service.user_stats(user_id).await.map_err(to_fdo)?;
        encode(&report)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "database": self.db_path.display().to_string(),
        })
        .to_string())
    }
}

fn decode<T: serde::de::DeserializeOwned>(json: &str) -> fdo::Result<T> {
    serde_json::from_str(json).map_err(|e| fdo::Error::InvalidArgs(format!("invalid JSON: {e}")))
}

fn encode<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("encoding reply: {e}")))
}

fn to_fdo(err: FaceLogError) -> fdo::Error {
    match err {
        FaceLogError::Validation(msg) => fdo::Error::InvalidArgs(msg),
        FaceLogError::NotFound(msg) => fdo::Error::UnknownObject(msg),
        FaceLogError::Storage(msg) => {
            tracing::warn!(error = %msg, "storage failure");
            fdo::Error::Failed(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_request_defaults() {
        let (filter, pagination) = LogsRequest::default().into_parts(50);
        assert_eq!(filter, AttemptFilter::default());
        assert_eq!(pagination, Pagination::new(1, 50));
    }

    #[test]
    fn test_logs_request_from_json() {
        let request: LogsRequest = decode(
            r#"{"page": 2, "limit": 500, "success": false, "user_id": "u1",
                "date_from": "2024-01-01T00:00:00Z", "date_to": "2024-01-31T23:59:59Z"}"#,
        )
        .unwrap();
        let (filter, pagination) = request.into_parts(50);
        assert_eq!(pagination.page, 2);
        assert_eq!(pagination.per_page, 100, "limit is clamped");
        assert_eq!(filter.success, Some(false));
        assert_eq!(filter.user_id.as_deref(), Some("u1"));
        assert_eq!(filter.from.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let result: fdo::Result<LogsRequest> = decode(r#"{"pagesize": 3}"#);
        assert!(matches!(result, Err(fdo::Error::InvalidArgs(_))));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            to_fdo(FaceLogError::Validation("bad".into())),
            fdo::Error::InvalidArgs(_)
        ));
        assert!(matches!(
            to_fdo(FaceLogError::NotFound("user x".into())),
            fdo::Error::UnknownObject(_)
        ));
        assert!(matches!(
            to_fdo(FaceLogError::Storage("disk".into())),
            fdo::Error::Failed(_)
        ));
    }

    #[test]
    fn test_logs_request_accepts_bare_dates() {
        let request: LogsRequest =
            decode(r#"{"date_from": "2024-01-31", "date_to": "2024-02-01T12:30:00+02:00"}"#).unwrap();
        let (filter, _) = request.into_parts(50);
        assert_eq!(filter.from.unwrap().to_rfc3339(), "2024-01-31T00:00:00+00:00");
        assert_eq!(filter.to.unwrap().to_rfc3339(), "2024-02-01T10:30:00+00:00");

        let bad: fdo::Result<LogsRequest> = decode(r#"{"date_from": "31/01/2024"}"#);
        assert!(matches!(bad, Err(fdo::Error::InvalidArgs(_))));
    }
}
