//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use colored::Colorize;

use crate::domain::{InspectionRecord, NodeRow};

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print success status (green checkmark)
pub fn success(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

/// Print failure status (red X, indented)
pub fn failure(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print completed action (green label)
pub fn action(label: &str, msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print indented detail (no color)
pub fn detail(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {}", msg);
}

/// Print plain output (no color, for data)
pub fn info(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg);
}

pub fn node(label: &str, row: &NodeRow) {
    action(
        label,
        &format!(
            "{} (group {}, depth {}, parent {})",
            row, row.group_id, row.depth, row.parent_id
        ),
    );
}

/// Print an inspection record with all its discrepancies.
pub fn inspection(record: &InspectionRecord) {
    header(&format!(
        "Inspection #{} of group {} ({})",
        record.id,
        record.group_id,
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(description) = &record.description {
        detail(description);
    }
    match record.root_id {
        Some(root) => detail(&format!("root: {}", root)),
        None => detail(&"root: none".red()),
    }
    if !record.missing_ids.is_empty() {
        let ids: Vec<String> = record.missing_ids.iter().map(|id| id.to_string()).collect();
        detail(&format!("missing: {}", ids.join(", ")));
    }
    if record.is_broken {
        for discrepancy in &record.discrepancies {
            failure(discrepancy);
        }
    } else {
        success("consistent");
    }
}

/// One line per inspection, newest first.
pub fn history_line(record: &InspectionRecord) {
    let status = if record.is_broken {
        "broken".red()
    } else {
        "ok".green()
    };
    let link = record
        .from_inspection_id
        .map(|id| format!(" <- #{}", id))
        .unwrap_or_default();
    println!(
        "#{:<5} {} {:<6} {:>4} discrepancies{}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        status,
        record.discrepancies.len(),
        link
    );
}
