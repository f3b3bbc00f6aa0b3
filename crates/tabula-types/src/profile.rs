use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{nickname, PeerId};

/// A peer's identity record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: PeerId,
    /// Display handle. Filled from [`nickname`] when left empty.
    pub username: String,
    pub name: String,
    pub email: String,
    pub description: String,
    pub home_url: String,
    pub created: Option<DateTime<Utc>>,
}

impl Profile {
    /// A fresh profile for `id` with a generated username.
    pub fn new(id: PeerId) -> Self {
        let username = nickname(id.as_str());
        Self {
            id,
            username,
            created: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Fill the username from the identifier if it is empty.
    pub fn ensure_username(&mut self, id: &str) {
        if self.username.is_empty() {
            self.username = nickname(id);
        }
    }
}
