//! Appeal records as they travel over the wire and out of the store.
//!
//! Timestamps are UTC and serialize as RFC 3339. Filter dates are plain
//! calendar days interpreted in UTC.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Surrogate key of an appeal, assigned by the store at creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct AppealId(pub i64);

impl fmt::Display for AppealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AppealId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Lifecycle status of an appeal.
///
/// The serialized labels are part of the wire contract and are also what the
/// store persists, so they must never be renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AppealStatus {
    New,
    InProgress,
    Completed,
    Cancelled,
}

impl AppealStatus {
    pub const ALL: [AppealStatus; 4] = [
        AppealStatus::New,
        AppealStatus::InProgress,
        AppealStatus::Completed,
        AppealStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the status labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown appeal status '{}' (expected one of New, InProgress, Completed, Cancelled)",
            self.0
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for AppealStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// A support request tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Appeal {
    pub id: AppealId,
    pub topic: String,
    pub message: String,
    pub status: AppealStatus,
    /// Latest audit message for this appeal. Denormalized from
    /// `appeal_responses`; absent until the appeal reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,
    pub init_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
}

/// Immutable audit row explaining how an appeal reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppealResponse {
    pub id: i64,
    pub appeal_id: AppealId,
    pub response_message: String,
    pub date: DateTime<Utc>,
}

/// Filters accepted by the list operation. All present filters must match.
///
/// An empty query value (`?status=`) counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppealFilter {
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<AppealStatus>,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Half-open `[start, end)` window over `init_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Window covering the calendar days `first..=last`.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Self {
        let start = first.and_time(NaiveTime::default()).and_utc();
        let end = last
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
            .and_time(NaiveTime::default())
            .and_utc();
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

impl AppealFilter {
    pub fn with_status(status: AppealStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Date windows that `init_date` must fall into.
    ///
    /// The range filter only applies when both ends are given.
    pub fn date_windows(&self) -> Vec<DateWindow> {
        let mut windows = Vec::new();
        if let Some(date) = self.date {
            windows.push(DateWindow::days(date, date));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            windows.push(DateWindow::days(start, end));
        }
        windows
    }

    pub fn matches(&self, appeal: &Appeal) -> bool {
        if self.status.is_some_and(|status| status != appeal.status) {
            return false;
        }
        self.date_windows()
            .iter()
            .all(|window| window.contains(appeal.init_date))
    }
}

/// Body of `POST /appeals`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SubmitAppeal {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub message: String,
}

/// Body of `PUT /appeals/:id/complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CompleteAppeal {
    #[serde(default, alias = "response_message")]
    pub solution: Option<String>,
}

/// Body of `PUT /appeals/:id/cancel`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CancelAppeal {
    #[serde(default, alias = "response_message")]
    pub cancellation_reason: Option<String>,
}

/// Body of `PUT /appeals/cancel-all-in-work`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CancelAllInWork {
    #[serde(default)]
    pub response_message: Option<String>,
}

/// Result of a bulk cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkCancelResult {
    pub message: String,
    pub appeals: Vec<Appeal>,
}
