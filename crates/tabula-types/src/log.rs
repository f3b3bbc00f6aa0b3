use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::ContentKey;

/// Audit record of an executed query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLogItem {
    pub query: String,
    pub name: String,
    pub key: ContentKey,
    pub dataset_path: ContentKey,
    pub time: Option<DateTime<Utc>>,
}

/// Lifecycle of a change request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRequestStatus {
    #[default]
    Open,
    Accepted,
    Declined,
}

/// A proposed revision to a dataset, submitted against a target path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeRequest {
    /// Path of the revision being proposed.
    pub path: ContentKey,
    /// Path of the revision it would replace.
    pub target: ContentKey,
    pub status: ChangeRequestStatus,
    pub title: String,
    pub description: String,
    pub created: Option<DateTime<Utc>>,
}
