use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Activity, ActivityKind, Choices};

/// Step count for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct StepsEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: NaiveDate,
    #[serde(default)]
    pub total_steps: u32,
    pub status: String,
    #[serde(default)]
    pub description: String,
}

impl Activity for StepsEntry {
    const KIND: ActivityKind = ActivityKind::Steps;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    fn draft(_choices: &Choices) -> Self {
        Self {
            id: None,
            date: Utc::now().date_naive(),
            total_steps: 0,
            status: Self::KIND.default_status().to_string(),
            description: String::new(),
        }
    }
}
