//! Best-effort recovery of SQL statements from an agent trace.
//!
//! The output is for display only and is never executed. Pattern order matters:
//! matches are reported pattern by pattern, then in text order within a pattern,
//! so the same statement can appear more than once.

use once_cell::sync::Lazy;
use regex::Regex;

static SQL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?is)Action Input:\s*(SELECT.*?)(?:\n|$)").expect("valid regex"),
        Regex::new(r"(?is)sql_db_query.*?(SELECT.*?)(?:\n|$)").expect("valid regex"),
        Regex::new(r"(?is)(SELECT\s+.*?FROM.*?)(?:\n|$)").expect("valid regex"),
        Regex::new(r"(?is)(INSERT\s+.*?INTO.*?)(?:\n|$)").expect("valid regex"),
        Regex::new(r"(?is)(UPDATE\s+.*?SET.*?)(?:\n|$)").expect("valid regex"),
        Regex::new(r"(?is)(DELETE\s+.*?FROM.*?)(?:\n|$)").expect("valid regex"),
    ]
});

/// Returns every SQL candidate in `trace`, or `None` when nothing matched.
pub fn extract_sql(trace: &str) -> Option<Vec<String>> {
    let mut statements = Vec::new();
    for pattern in SQL_PATTERNS.iter() {
        for captures in pattern.captures_iter(trace) {
            if let Some(statement) = captures.get(1) {
                statements.push(statement.as_str().trim().to_string());
            }
        }
    }

    if statements.is_empty() {
        None
    } else {
        Some(statements)
    }
}
