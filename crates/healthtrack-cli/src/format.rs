//! Plain-text rendering of activity entries.

use chrono::NaiveDate;
use healthtrack_core::{Choices, Meal, StepsEntry, Workout};

/// Widest a description column may get before it is cut.
const MAX_DESCRIPTION_WIDTH: usize = 40;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %d, %Y").to_string()
}

/// Turn a status value such as `in_progress` into `In progress`.
pub fn humanize(value: &str) -> String {
    let spaced = value.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// An entry that can be shown as one table row.
pub trait Row {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

fn id_cell(id: Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

impl Row for Workout {
    const HEADERS: &'static [&'static str] =
        &["ID", "Date", "Type", "Minutes", "Calories", "Status", "Description"];

    fn cells(&self) -> Vec<String> {
        vec![
            id_cell(self.id),
            format_date(self.date),
            humanize(&self.workout_type),
            self.duration.to_string(),
            self.calories_burned.to_string(),
            humanize(&self.status),
            truncate_string(&self.description, MAX_DESCRIPTION_WIDTH),
        ]
    }
}

impl Row for Meal {
    const HEADERS: &'static [&'static str] =
        &["ID", "Date", "Meal", "Food", "Calories", "Status", "Description"];

    fn cells(&self) -> Vec<String> {
        vec![
            id_cell(self.id),
            format_date(self.date),
            humanize(&self.meal_type),
            self.food_name.clone(),
            self.calories.to_string(),
            humanize(&self.status),
            truncate_string(&self.description, MAX_DESCRIPTION_WIDTH),
        ]
    }
}

impl Row for StepsEntry {
    const HEADERS: &'static [&'static str] = &["ID", "Date", "Steps", "Status", "Description"];

    fn cells(&self) -> Vec<String> {
        vec![
            id_cell(self.id),
            format_date(self.date),
            self.total_steps.to_string(),
            humanize(&self.status),
            truncate_string(&self.description, MAX_DESCRIPTION_WIDTH),
        ]
    }
}

/// Render rows as a left-aligned table with a header line.
pub fn render_table<T: Row>(rows: &[T]) -> String {
    let cells: Vec<Vec<String>> = rows.iter().map(Row::cells).collect();

    let mut widths: Vec<usize> = T::HEADERS.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let headers: Vec<String> = T::HEADERS.iter().map(|h| h.to_string()).collect();
    let mut out = String::new();
    for row in std::iter::once(&headers).chain(cells.iter()) {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Render the option lists for one activity kind.
pub fn render_choices(label: &str, choices: &Choices) -> String {
    let join = |list: &[healthtrack_core::Choice]| {
        list.iter()
            .map(|c| format!("{} ({})", c.label, c.value))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut out = format!("{}\n", humanize(label));
    if !choices.types.is_empty() {
        out.push_str(&format!("  types:    {}\n", join(&choices.types)));
    }
    out.push_str(&format!("  statuses: {}\n", join(&choices.statuses)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(id: Option<i64>, total: u32, description: &str) -> StepsEntry {
        StepsEntry {
            id,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            total_steps: total,
            status: "in_progress".to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Läufe am Morgen", 8), "Läufe...");
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(format_date(date), "May 01, 2024");
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("in_progress"), "In progress");
        assert_eq!(humanize("cardio"), "Cardio");
        assert_eq!(humanize(""), "");
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let rows = vec![steps(Some(1), 800, "walk"), steps(None, 12000, "")];
        let table = render_table(&rows);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ID  Date          Steps  Status       Description");
        assert_eq!(lines[1], "1   May 01, 2024  800    In progress  walk");
        assert_eq!(lines[2], "-   May 01, 2024  12000  In progress");
    }

    #[test]
    fn test_render_table_empty() {
        let table = render_table::<StepsEntry>(&[]);
        assert_eq!(table, "ID  Date  Steps  Status  Description\n");
    }
}
