use clap::ValueEnum;
use colored::Colorize;

use crate::error::Result;
use crate::legacy::NavMenu;
use crate::report::{Outcome, PassStatus, ReportSummary};
use crate::store::KindSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

fn status_label(status: PassStatus) -> String {
    match status {
        PassStatus::Running => "running".yellow().to_string(),
        PassStatus::Completed => "completed".green().to_string(),
        PassStatus::Failed => "failed".red().bold().to_string(),
    }
}

fn outcome_label(outcome: Outcome, count: usize) -> String {
    let text = format!("{} {count}", outcome.as_str());
    match outcome {
        Outcome::Error if count > 0 => text.red().bold().to_string(),
        Outcome::Notice if count > 0 => text.yellow().to_string(),
        Outcome::Created | Outcome::Changed | Outcome::Published => text.green().to_string(),
        _ => text.dimmed().to_string(),
    }
}

pub fn print_summary(summary: &ReportSummary, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(summary)?),
        Format::Pretty => {
            println!("{} {}", "run".bold(), summary.run_id.to_string().cyan());
            for pass in &summary.passes {
                println!("  {:14} {}", pass.name, status_label(pass.status));
                if let Some(ref error) = pass.error {
                    println!("    {} {}", "error:".dimmed(), error);
                }
            }
            let outcomes: Vec<String> = summary
                .outcomes
                .iter()
                .map(|(outcome, count)| outcome_label(*outcome, *count))
                .collect();
            if outcomes.is_empty() {
                println!("{}", "No records touched.".dimmed());
            } else {
                println!("  {} {}", "outcomes:".dimmed(), outcomes.join(" | "));
            }
            for (kind, count) in &summary.diagnostics {
                println!("  {} {} {}", "diagnostic:".dimmed(), kind.as_str(), count);
            }
        }
        Format::Minimal => {
            let count = |outcome| summary.outcomes.get(&outcome).copied().unwrap_or(0);
            println!(
                "created={} changed={} published={} deleted={} no_change={} notice={} error={}",
                count(Outcome::Created),
                count(Outcome::Changed),
                count(Outcome::Published),
                count(Outcome::Deleted),
                count(Outcome::NoChange),
                count(Outcome::Notice),
                count(Outcome::Error),
            );
        }
    }
    Ok(())
}

pub fn print_store_summary(rows: &[KindSummary], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(rows)?),
        Format::Pretty => {
            if rows.is_empty() {
                println!("{}", "Target store is empty.".dimmed());
            }
            for row in rows {
                println!(
                    "{:16} {} total, {} published, {} migrated",
                    row.kind.bold(),
                    row.total,
                    row.published.to_string().green(),
                    row.migrated.to_string().cyan()
                );
            }
        }
        Format::Minimal => {
            println!("{:16} {:>6} {:>9} {:>8}", "KIND", "TOTAL", "PUBLISHED", "MIGRATED");
            println!("{}", "-".repeat(42));
            for row in rows {
                println!(
                    "{:16} {:>6} {:>9} {:>8}",
                    row.kind, row.total, row.published, row.migrated
                );
            }
        }
    }
    Ok(())
}

pub fn print_menus(menus: &[NavMenu], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(menus)?),
        Format::Pretty => {
            if menus.is_empty() {
                println!("{}", "No navigation menus.".dimmed());
            }
            for menu in menus {
                println!("{} {}", menu.slug.magenta().bold(), menu.name.dimmed());
            }
        }
        Format::Minimal => {
            for menu in menus {
                println!("{}", menu.slug);
            }
        }
    }
    Ok(())
}
