//! Table output formatting for CLI commands
//!
//! Formats scopes using comfy-table. Colors follow the `NO_COLOR` convention.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::cli::output::{percent, truncate};
use crate::domain::models::{Scope, ScopeStatus};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    pub const fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Format a list of scopes as a table
    pub fn format_scopes(&self, scopes: &[&Scope]) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(
            ["Kind", "ID", "Parent", "Status", "Done/Total", "Success", "Blocked", "Tokens"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

        for scope in scopes {
            let counters = &scope.counters;
            let parent = scope
                .parent
                .as_ref()
                .map_or_else(|| "-".to_string(), |p| truncate(&p.id, 20));

            let status_cell = if self.use_colors {
                Cell::new(scope.status).fg(status_color(scope.status))
            } else {
                Cell::new(scope.status)
            };

            table.add_row(vec![
                Cell::new(scope.kind),
                Cell::new(truncate(&scope.id, 30)),
                Cell::new(parent),
                status_cell,
                Cell::new(format!("{}/{}", counters.finished(), counters.total())),
                Cell::new(percent(counters.success_rate())),
                Cell::new(counters.blocked()),
                Cell::new(scope.tokens.input + scope.tokens.output),
            ]);
        }

        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

const fn status_color(status: ScopeStatus) -> Color {
    match status {
        ScopeStatus::InProgress => Color::Cyan,
        ScopeStatus::Completed => Color::Green,
        ScopeStatus::Failed => Color::Red,
        ScopeStatus::Cancelled => Color::DarkGrey,
    }
}

fn supports_color() -> bool {
    env::var_os("NO_COLOR").is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Outcome, ScopeKind, ScopeRef};
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn test_format_scopes() {
        let mut scope = Scope::new(
            ScopeKind::Phase,
            "design",
            Some(ScopeRef::prd("p1")),
            BTreeMap::new(),
            Utc::now(),
        );
        scope.counters.add_total(4);
        scope.counters.record(Outcome::Success);
        scope.counters.record(Outcome::Failure);

        let rendered = TableFormatter::with_colors(false).format_scopes(&[&scope]);
        assert!(rendered.contains("design"));
        assert!(rendered.contains("p1"));
        assert!(rendered.contains("2/4"));
        assert!(rendered.contains("50.0%"));
        assert!(rendered.contains("in_progress"));
    }
}
