use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Choice {
    pub value: String,
    pub label: String,
}

/// Option lists for one activity kind.
///
/// The server names the lists per kind (`workout_types`, `meal_statuses`,
/// ...); they are read into the same two fields here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Choices {
    #[serde(default, alias = "workout_types", alias = "meal_types")]
    pub types: Vec<Choice>,
    #[serde(
        default,
        alias = "workout_statuses",
        alias = "meal_statuses",
        alias = "steps_statuses"
    )]
    pub statuses: Vec<Choice>,
}

impl Choices {
    pub fn first_type(&self) -> Option<&str> {
        self.types.first().map(|c| c.value.as_str())
    }

    /// Display label for a status value, falling back to the value itself.
    pub fn status_label<'a>(&'a self, value: &'a str) -> &'a str {
        self.statuses
            .iter()
            .find(|c| c.value == value)
            .map(|c| c.label.as_str())
            .unwrap_or(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workout_choices() {
        let json = r#"{
            "workout_types": [{"value": "strength", "label": "Strength"}, {"value": "cardio", "label": "Cardio"}],
            "workout_statuses": [{"value": "planned", "label": "Planned"}, {"value": "completed", "label": "Completed"}]
        }"#;
        let choices: Choices = serde_json::from_str(json).unwrap();
        assert_eq!(choices.first_type(), Some("strength"));
        assert_eq!(choices.status_label("completed"), "Completed");
        assert_eq!(choices.status_label("skipped"), "skipped");
    }

    #[test]
    fn test_parse_steps_choices_without_types() {
        let json = r#"{"steps_statuses": [{"value": "in_progress", "label": "In Progress"}]}"#;
        let choices: Choices = serde_json::from_str(json).unwrap();
        assert!(choices.types.is_empty());
        assert_eq!(choices.statuses.len(), 1);
    }
}
