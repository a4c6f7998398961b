use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Activity, ActivityKind, Choices};

/// Fallback when the server offers no meal types
const DEFAULT_MEAL_TYPE: &str = "breakfast";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Meal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub meal_type: String,
    #[serde(default)]
    pub food_name: String,
    #[serde(default)]
    pub calories: u32,
    pub status: String,
    #[serde(default)]
    pub description: String,
}

impl Meal {
    pub fn is_consumed(&self) -> bool {
        self.status == Self::KIND.done_status()
    }
}

impl Activity for Meal {
    const KIND: ActivityKind = ActivityKind::Meal;

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
            meal_type: choices.first_type().unwrap_or(DEFAULT_MEAL_TYPE).to_string(),
            food_name: String::new(),
            calories: 0,
            status: Self::KIND.default_status().to_string(),
            description: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Choice;

    #[test]
    fn test_draft_uses_first_server_type() {
        let choices = Choices {
            types: vec![Choice {
                value: "lunch".to_string(),
                label: "Lunch".to_string(),
            }],
            statuses: Vec::new(),
        };
        let draft = Meal::draft(&choices);
        assert_eq!(draft.meal_type, "lunch");
        assert_eq!(draft.status, "planned");
    }

    #[test]
    fn test_parse_meal_with_missing_optionals() {
        let json = r#"{"id": 3, "date": "2024-05-02", "meal_type": "dinner", "status": "consumed"}"#;
        let meal: Meal = serde_json::from_str(json).unwrap();
        assert!(meal.is_consumed());
        assert_eq!(meal.food_name, "");
        assert_eq!(meal.calories, 0);
    }
}
