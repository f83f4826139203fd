use anyhow::Result;
use std::fmt::Write as _;

use crate::database_ops::ingest_runs::recent_runs;
use crate::database_ops::lineups::count_lineups;
use crate::database_ops::records::count_by_kind;
use crate::registry::Registry;

#[derive(Debug, Clone, Default)]
pub struct CountsConfig {
    /// Optional override for the database URL.
    pub database_url: Option<String>,
    /// How many recent ingest runs to list (defaults to env RECENT_RUNS_LIMIT or 10).
    pub recent_runs_limit: Option<i64>,
}

/// Print stored records per kind, lineups per lineup kind and the latest ingest runs.
pub async fn run(cfg: CountsConfig) -> Result<()> {
    let db = super::connect(cfg.database_url.as_deref()).await?;
    let mut out = String::new();

    writeln!(out, "== stat records")?;
    let mut total = 0;
    for (kind, count) in count_by_kind(&db).await? {
        writeln!(out, "{kind:<40} {count:>10}")?;
        total += count;
    }
    writeln!(out, "{:<40} {total:>10}", "total")?;

    writeln!(out, "\n== lineups")?;
    let registry = Registry::standard();
    for kind in registry.iter().filter(|kind| kind.is_lineup()) {
        let count = count_lineups(&db, &kind.name).await?;
        if count > 0 {
            writeln!(out, "{:<40} {count:>10}", kind.name)?;
        }
    }

    let limit = cfg
        .recent_runs_limit
        .unwrap_or_else(|| crate::util::env::env_parse("RECENT_RUNS_LIMIT", 10i64));
    writeln!(out, "\n== recent runs")?;
    for run in recent_runs(&db, limit).await? {
        writeln!(out, "#{:<6} {:<14} {}", run.id, run.command, run.status)?;
    }

    print!("{out}");
    Ok(())
}

/// Every registered kind with its natural-key fields, one per line.
pub fn kinds_report(registry: &Registry) -> String {
    let mut kinds: Vec<_> = registry.iter().collect();
    kinds.sort_by(|a, b| a.name.cmp(&b.name));
    kinds
        .iter()
        .map(|kind| format!("{:<40} {}", kind.name, kind.key_fields.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_report_lists_key_fields() {
        let report = kinds_report(&Registry::standard());
        let misc = report
            .lines()
            .find(|line| line.starts_with("TeamMiscSplit "))
            .unwrap();
        assert!(misc.contains("group_set"));
        assert!(misc.contains("team"));
    }
}
