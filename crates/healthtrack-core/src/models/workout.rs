use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Activity, ActivityKind, Choices};

/// Fallback when the server offers no workout types
const DEFAULT_WORKOUT_TYPE: &str = "cardio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Workout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub workout_type: String,
    /// Minutes
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub calories_burned: u32,
    pub status: String,
    #[serde(default)]
    pub description: String,
}

impl Workout {
    pub fn is_completed(&self) -> bool {
        self.status == Self::KIND.done_status()
    }
}

impl Activity for Workout {
    const KIND: ActivityKind = ActivityKind::Workout;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }

    fn draft(choices: &Choices) -> Self {
        Self {
            id: None,
            date: Utc::now().date_naive(),
            workout_type: choices
                .first_type()
                .unwrap_or(DEFAULT_WORKOUT_TYPE)
                .to_string(),
            duration: 0,
            calories_burned: 0,
            status: Self::KIND.default_status().to_string(),
            description: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workout() {
        let json = r#"{"id": 12, "date": "2024-05-01", "workout_type": "strength",
            "duration": 45, "calories_burned": 320, "status": "completed", "description": "Legs"}"#;
        let workout: Workout = serde_json::from_str(json).unwrap();
        assert_eq!(workout.id, Some(12));
        assert_eq!(workout.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(workout.duration, 45);
        assert!(workout.is_completed());
    }

    #[test]
    fn test_draft_defaults() {
        let draft = Workout::draft(&Choices::default());
        assert_eq!(draft.id, None);
        assert_eq!(draft.workout_type, "cardio");
        assert_eq!(draft.status, "planned");
        assert_eq!(draft.date, Utc::now().date_naive());
    }

    #[test]
    fn test_new_entry_serializes_without_id() {
        let draft = Workout::draft(&Choices::default());
        let value = serde_json::to_value(&draft).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["workout_type"], "cardio");
    }
}
