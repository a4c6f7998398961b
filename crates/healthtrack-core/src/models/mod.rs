//! Data models for the activity-tracking service.
//!
//! - `Workout`, `Meal`, `StepsEntry`: the three kinds of logged activity
//! - `Choices`: server-provided option lists for types and statuses
//! - `ActivityKind` / `Activity`: what the generic activity API needs to know
//!   about each kind

pub mod activity;
pub mod choices;
pub mod meal;
pub mod steps;
pub mod workout;

pub use activity::{Activity, ActivityKind};
pub use choices::{Choice, Choices};
pub use meal::Meal;
pub use steps::StepsEntry;
pub use workout::Workout;
