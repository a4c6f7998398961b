//! Field flags shared by `add` and `edit`.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Args;
use healthtrack_core::{Activity, Meal, StepsEntry, Workout};

/// Values to set on an entry. Flags left out keep the current value (the
/// server-provided defaults for `add`, the saved entry for `edit`).
#[derive(Args, Debug, Default, Clone)]
pub struct EntryFields {
    /// Day of the entry, as YYYY-MM-DD
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Workout or meal type, e.g. cardio or breakfast
    #[arg(long = "type")]
    pub activity_type: Option<String>,

    /// Workout length in minutes
    #[arg(long)]
    pub duration: Option<u32>,

    /// Calories burned (workouts) or eaten (meals)
    #[arg(long)]
    pub calories: Option<u32>,

    /// What was eaten
    #[arg(long)]
    pub food: Option<String>,

    /// Step count
    #[arg(long)]
    pub steps: Option<u32>,

    #[arg(long)]
    pub status: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

impl EntryFields {
    /// Fail if any of the named flags was given for a kind that has no
    /// such field.
    fn reject<T: Activity>(&self, flags: &[(&str, bool)]) -> Result<()> {
        let given: Vec<&str> = flags
            .iter()
            .filter(|(_, set)| *set)
            .map(|(name, _)| *name)
            .collect();
        if !given.is_empty() {
            bail!(
                "{} entries have no {}",
                T::KIND,
                given
                    .iter()
                    .map(|f| format!("--{}", f))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(())
    }
}

fn set<V: Clone>(target: &mut V, value: &Option<V>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

/// An entry the field flags can be applied to.
pub trait Editable: Activity {
    fn apply(&mut self, fields: &EntryFields) -> Result<()>;
}

impl Editable for Workout {
    fn apply(&mut self, fields: &EntryFields) -> Result<()> {
        fields.reject::<Self>(&[("food", fields.food.is_some()), ("steps", fields.steps.is_some())])?;

        set(&mut self.date, &fields.date);
        set(&mut self.workout_type, &fields.activity_type);
        set(&mut self.duration, &fields.duration);
        set(&mut self.calories_burned, &fields.calories);
        set(&mut self.status, &fields.status);
        set(&mut self.description, &fields.description);
        Ok(())
    }
}

impl Editable for Meal {
    fn apply(&mut self, fields: &EntryFields) -> Result<()> {
        fields.reject::<Self>(&[
            ("duration", fields.duration.is_some()),
            ("steps", fields.steps.is_some()),
        ])?;

        set(&mut self.date, &fields.date);
        set(&mut self.meal_type, &fields.activity_type);
        set(&mut self.food_name, &fields.food);
        set(&mut self.calories, &fields.calories);
        set(&mut self.status, &fields.status);
        set(&mut self.description, &fields.description);

        if self.food_name.trim().is_empty() {
            bail!("A meal needs a food name (--food)");
        }
        Ok(())
    }
}

impl Editable for StepsEntry {
    fn apply(&mut self, fields: &EntryFields) -> Result<()> {
        fields.reject::<Self>(&[
            ("type", fields.activity_type.is_some()),
            ("duration", fields.duration.is_some()),
            ("calories", fields.calories.is_some()),
            ("food", fields.food.is_some()),
        ])?;

        set(&mut self.date, &fields.date);
        set(&mut self.total_steps, &fields.steps);
        set(&mut self.status, &fields.status);
        set(&mut self.description, &fields.description);
        Ok(())
    }
}
