use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Choices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Workout,
    Meal,
    Steps,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 3] = [ActivityKind::Workout, ActivityKind::Meal, ActivityKind::Steps];

    /// Collection path, relative to the API base URL.
    pub fn collection_path(&self) -> &'static str {
        match self {
            ActivityKind::Workout => "api/activities/workouts/",
            ActivityKind::Meal => "api/activities/meals/",
            ActivityKind::Steps => "api/activities/steps/",
        }
    }

    pub fn item_path(&self, id: i64) -> String {
        format!("{}{}/", self.collection_path(), id)
    }

    pub fn choices_path(&self) -> &'static str {
        match self {
            ActivityKind::Workout => "api/activities/workout-choices/",
            ActivityKind::Meal => "api/activities/meal-choices/",
            ActivityKind::Steps => "api/activities/steps-choices/",
        }
    }

    /// Status a new entry starts in.
    pub fn default_status(&self) -> &'static str {
        match self {
            ActivityKind::Workout | ActivityKind::Meal => "planned",
            ActivityKind::Steps => "in_progress",
        }
    }

    /// Status marking the entry as done.
    pub fn done_status(&self) -> &'static str {
        match self {
            ActivityKind::Workout | ActivityKind::Steps => "completed",
            ActivityKind::Meal => "consumed",
        }
    }

    /// Flip between the done status and the default status.
    pub fn toggled_status(&self, current: &str) -> &'static str {
        if current == self.done_status() {
            self.default_status()
        } else {
            self.done_status()
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Workout => "workout",
            ActivityKind::Meal => "meal",
            ActivityKind::Steps => "steps",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "workout" | "workouts" => Ok(ActivityKind::Workout),
            "meal" | "meals" => Ok(ActivityKind::Meal),
            "step" | "steps" => Ok(ActivityKind::Steps),
            other => Err(format!("unknown activity kind: {}", other)),
        }
    }
}

/// A logged activity entry.
pub trait Activity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ActivityKind;

    fn id(&self) -> Option<i64>;

    fn status(&self) -> &str;

    fn set_status(&mut self, status: &str);

    /// A new, unsaved entry for today with server-provided defaults.
    fn draft(choices: &Choices) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(ActivityKind::Meal.item_path(7), "api/activities/meals/7/");
        assert_eq!(
            ActivityKind::Steps.choices_path(),
            "api/activities/steps-choices/"
        );
    }

    #[test]
    fn test_status_toggles() {
        assert_eq!(ActivityKind::Workout.toggled_status("planned"), "completed");
        assert_eq!(ActivityKind::Workout.toggled_status("completed"), "planned");
        assert_eq!(ActivityKind::Meal.toggled_status("planned"), "consumed");
        assert_eq!(ActivityKind::Meal.toggled_status("consumed"), "planned");
        assert_eq!(ActivityKind::Steps.toggled_status("in_progress"), "completed");
        assert_eq!(ActivityKind::Steps.toggled_status("completed"), "in_progress");
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Workouts".parse::<ActivityKind>(), Ok(ActivityKind::Workout));
        assert_eq!("meal".parse::<ActivityKind>(), Ok(ActivityKind::Meal));
        assert_eq!("steps".parse::<ActivityKind>(), Ok(ActivityKind::Steps));
        assert!("naps".parse::<ActivityKind>().is_err());
    }
}
