use crate::config::ConfigOverrides;
use crate::history::InteractionHistory;
use crate::models::{Dashboard, GenerationReport, Interaction};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gpr-agent")]
#[command(about = "Ask natural-language questions about a GPR road defect inventory", long_about = None)]
pub struct Cli {
    /// SQLite store path (defaults to GPR_DB_PATH or gpr_defects.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,
    /// Credential for the agent CLI (defaults to ANTHROPIC_API_KEY)
    #[arg(long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,
    /// Agent CLI binary
    #[arg(long, global = true, value_name = "PATH")]
    pub agent_bin: Option<String>,
    /// Model name passed to the agent CLI
    #[arg(long, global = true)]
    pub model: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Recreate the store and fill it with sample data
    Setup {
        #[arg(long, default_value_t = 15)]
        scans: usize,
        #[arg(long, default_value_t = 30)]
        repairs: usize,
        /// Seed for reproducible sample data
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print dashboard statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Print the store schema with sample rows
    Schema,
    /// Ask a single question
    Ask {
        #[arg(required = true, num_args = 1.., value_name = "QUESTION")]
        question: Vec<String>,
        #[arg(long)]
        show_sql: bool,
    },
    /// Interactive question loop
    Chat {
        #[arg(long)]
        show_sql: bool,
    },
    /// Extract SQL statements from an agent trace (file or stdin)
    Extract { file: Option<PathBuf> },
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            db_path: self.db.clone(),
            api_key: self.api_key.clone(),
            agent_binary: self.agent_bin.clone(),
            agent_model: self.model.clone(),
        }
    }
}

pub fn render_generation_report(report: &GenerationReport) -> String {
    format!(
        "Database created successfully!\n   - {} scans\n   - {} defects\n   - {} measurements\n   - {} repair records",
        report.scans, report.defects, report.measurements, report.repairs
    )
}

pub fn render_dashboard(dashboard: &Dashboard) -> String {
    let summary = &dashboard.summary;
    let mut out = String::new();
    let _ = writeln!(out, "Total Scans       {}", summary.total_scans);
    let _ = writeln!(out, "Total Defects     {}", summary.total_defects);
    let _ = writeln!(out, "Critical Defects  {}", summary.critical_defects);
    let _ = writeln!(out, "Defects/Scan      {:.1}", summary.defects_per_scan());
    let _ = writeln!(out, "Pending Repairs   {}", summary.pending_repairs);

    out.push_str("\nDefect Distribution\n");
    let mut by_type: BTreeMap<_, Vec<_>> = BTreeMap::new();
    for row in &dashboard.distribution {
        by_type.entry(row.defect_type).or_default().push(row);
    }
    if by_type.is_empty() {
        out.push_str("  (no defects)\n");
    }
    for (defect_type, rows) in by_type {
        let total: i64 = rows.iter().map(|row| row.count).sum();
        let _ = writeln!(out, "  {} ({})", defect_type.as_str(), total);
        for row in rows {
            let _ = writeln!(out, "    {:<9} {}", row.severity.as_str(), row.count);
        }
    }

    out.push_str("\nLocation Statistics\n");
    let _ = writeln!(out, "  {:<18} {:>7} {:>10} {:>9}", "location", "defects", "avg depth", "critical");
    for row in &dashboard.locations {
        let avg_depth = row
            .avg_depth
            .map(|depth| format!("{:.2}", depth))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<18} {:>7} {:>10} {:>9}",
            row.location, row.defect_count, avg_depth, row.critical_count
        );
    }
    out
}

pub fn render_interaction(interaction: &Interaction, show_sql: bool) -> String {
    let mut out = format!("Question: {}\n", interaction.question);
    if show_sql {
        if let Some(statements) = &interaction.sql {
            out.push_str("Generated SQL:\n");
            for statement in statements {
                let _ = writeln!(out, "  {}", statement.trim());
            }
        }
    }
    let _ = write!(out, "Answer:\n{}", interaction.answer);
    out
}

/// Every past interaction, newest first, with its SQL and answer.
pub fn render_history(history: &InteractionHistory) -> String {
    if history.is_empty() {
        return "No queries yet.".to_string();
    }
    let mut out = String::new();
    for (index, entry) in history.newest_first().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. [{}] {}{}",
            index + 1,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.question,
            if entry.failed { " [failed]" } else { "" }
        );
        if let Some(statements) = &entry.sql {
            out.push_str("     SQL:\n");
            for statement in statements {
                let _ = writeln!(out, "       {}", statement.trim());
            }
        }
        let mut answer_lines = entry.answer.lines();
        let _ = writeln!(out, "     Answer: {}", answer_lines.next().unwrap_or_default());
        for line in answer_lines {
            let _ = writeln!(out, "             {}", line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{render_dashboard, render_history, render_interaction, Cli, Commands};
    use crate::history::InteractionHistory;
    use crate::models::{
        Dashboard, DefectType, DistributionRow, Interaction, LocationStats, Severity, SummaryStats,
    };
    use chrono::Utc;
    use clap::Parser;

    fn interaction(failed: bool) -> Interaction {
        Interaction {
            id: "1".to_string(),
            timestamp: Utc::now(),
            question: "Show all critical cavities".to_string(),
            answer: "There are 4.".to_string(),
            sql: Some(vec!["SELECT * FROM defects WHERE severity = 'critical'".to_string()]),
            failed,
        }
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gpr-agent", "ask", "how", "many", "--db", "roads.db", "--show-sql"])
            .expect("parse");
        let overrides = cli.overrides();
        assert_eq!(overrides.db_path.as_deref(), Some(std::path::Path::new("roads.db")));
        match cli.command {
            Commands::Ask { question, show_sql } => {
                assert_eq!(question.join(" "), "how many");
                assert!(show_sql);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sql_is_shown_only_when_requested() {
        let hidden = render_interaction(&interaction(false), false);
        assert!(!hidden.contains("Generated SQL"));
        let shown = render_interaction(&interaction(false), true);
        assert!(shown.contains("SELECT * FROM defects WHERE severity = 'critical'"));
    }

    #[test]
    fn dashboard_groups_distribution_by_type() {
        let dashboard = Dashboard {
            summary: SummaryStats {
                total_scans: 2,
                total_defects: 5,
                critical_defects: 1,
                pending_repairs: 3,
            },
            distribution: vec![
                DistributionRow {
                    defect_type: DefectType::Cavity,
                    severity: Severity::High,
                    count: 3,
                },
                DistributionRow {
                    defect_type: DefectType::Cavity,
                    severity: Severity::Critical,
                    count: 1,
                },
                DistributionRow {
                    defect_type: DefectType::Pipe,
                    severity: Severity::Low,
                    count: 1,
                },
            ],
            locations: vec![LocationStats {
                location: "Teheran-ro".to_string(),
                defect_count: 5,
                avg_depth: Some(17.256),
                critical_count: 1,
            }],
            computed_at: Utc::now(),
        };
        let text = render_dashboard(&dashboard);
        assert!(text.contains("Defects/Scan      2.5"));
        assert!(text.contains("  cavity (4)"));
        assert!(text.contains("17.26"));
    }

    #[test]
    fn history_lists_newest_first_and_marks_failures() {
        let mut history = InteractionHistory::new();
        assert_eq!(render_history(&history), "No queries yet.");
        history.push(interaction(true));
        assert!(render_history(&history).contains("  1. "));
        assert!(render_history(&history).contains("[failed]"));
    }

    #[test]
    fn history_shows_full_question_sql_and_answer() {
        let long_question = format!("How many defects total? {}", "Include every road section. ".repeat(4));
        let mut history = InteractionHistory::new();
        history.push(Interaction {
            id: "older".to_string(),
            timestamp: Utc::now(),
            question: "Show defects in Gangnam-daero".to_string(),
            answer: "Section A has 9.\nSection B has 4.".to_string(),
            sql: None,
            failed: false,
        });
        history.push(Interaction {
            id: "newer".to_string(),
            timestamp: Utc::now(),
            question: long_question.clone(),
            answer: "There are 142 defects.".to_string(),
            sql: Some(vec!["SELECT COUNT(*) FROM defects".to_string()]),
            failed: false,
        });

        let text = render_history(&history);
        assert!(text.contains(long_question.as_str()));
        assert!(text.contains("       SELECT COUNT(*) FROM defects"));
        assert!(text.contains("     Answer: There are 142 defects."));
        assert!(text.contains("             Section B has 4."));
        let newer = text.find("There are 142").expect("newer entry");
        let older = text.find("Section A has 9").expect("older entry");
        assert!(newer < older);
        assert!(!text.contains("[failed]"));
    }
}
