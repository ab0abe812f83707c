use bids_sync_core::Comparison;
use colored::*;
use std::fmt::Write;

const NEW_SHOWN: usize = 20;
const IDENTICAL_SHOWN: usize = 10;
const REMOTE_ONLY_SHOWN: usize = 10;

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn more(out: &mut String, total: usize, shown: usize) {
    if total > shown {
        let _ = writeln!(out, "  ... and {} more", total - shown);
    }
}

/// Human-readable local-vs-remote report.
pub fn render_comparison(comparison: &Comparison) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();

    let _ = writeln!(out, "\n{}", rule);
    let _ = writeln!(out, "{}", "LOCAL vs REMOTE".bold());
    let _ = writeln!(out, "{}", rule);

    if comparison.new.is_empty() {
        let _ = writeln!(out, "\n{} Nothing new to upload", "✓".green());
    } else {
        let _ = writeln!(
            out,
            "\n{} {}",
            "New files (to upload):".cyan().bold(),
            comparison.new.len()
        );
        for entry in comparison.new.iter().take(NEW_SHOWN) {
            let _ = writeln!(
                out,
                "  {} {} ({:.2} MB)",
                "+".green(),
                entry.relative_path,
                mib(entry.size_bytes)
            );
        }
        more(&mut out, comparison.new.len(), NEW_SHOWN);
    }

    if !comparison.identical.is_empty() {
        let _ = writeln!(
            out,
            "\n{} {}",
            "Already present (identical):".green().bold(),
            comparison.identical.len()
        );
        for entry in comparison.identical.iter().take(IDENTICAL_SHOWN) {
            let _ = writeln!(
                out,
                "  = {} ({:.2} MB)",
                entry.relative_path,
                mib(entry.local_size)
            );
        }
        more(&mut out, comparison.identical.len(), IDENTICAL_SHOWN);
    }

    if !comparison.modified.is_empty() {
        let _ = writeln!(
            out,
            "\n{} {}",
            "Modified (size differs):".yellow().bold(),
            comparison.modified.len()
        );
        for entry in &comparison.modified {
            let local = mib(entry.local_size);
            let remote = mib(entry.remote_size);
            let _ = writeln!(out, "  {} {}", "≠".yellow(), entry.relative_path);
            let _ = writeln!(
                out,
                "     local: {:.2} MB | remote: {:.2} MB | diff: {:+.2} MB",
                local,
                remote,
                local - remote
            );
        }
    }

    if !comparison.remote_only.is_empty() {
        let _ = writeln!(
            out,
            "\n{} {}",
            "Remote only (missing locally):".yellow().bold(),
            comparison.remote_only.len()
        );
        for entry in comparison.remote_only.iter().take(REMOTE_ONLY_SHOWN) {
            let _ = writeln!(out, "  {} {}", "-".red(), entry.relative_path);
        }
        more(&mut out, comparison.remote_only.len(), REMOTE_ONLY_SHOWN);
    }

    let _ = writeln!(out, "\n{}", rule);
    let _ = writeln!(out, "{}", "Summary:".bold());
    let _ = writeln!(out, "  New:          {}", comparison.new.len());
    let _ = writeln!(out, "  Identical:    {}", comparison.identical.len());
    let _ = writeln!(out, "  Modified:     {}", comparison.modified.len());
    let _ = writeln!(out, "  Remote only:  {}", comparison.remote_only.len());
    let _ = writeln!(out, "  Local total:  {}", comparison.local_total());
    let _ = writeln!(out, "{}", rule);

    out
}
