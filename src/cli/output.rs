// Output formatting utilities

use crate::models::{Entity, PipelineKind, StageTable};
use crate::pipeline::{BoardView, Card, Notification, Severity};
use std::io::IsTerminal;

// ANSI escape codes for terminal formatting
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_DIM: &str = "\x1b[2m";
const ANSI_RESET: &str = "\x1b[0m";

const ANSI_FG_RED: &str = "\x1b[31m";
const ANSI_FG_GREEN: &str = "\x1b[32m";

/// Map a color name string to its ANSI foreground constant
fn color_name_to_fg(name: &str) -> Option<&'static str> {
    match name {
        "black" => Some("\x1b[30m"),
        "red" => Some(ANSI_FG_RED),
        "green" => Some(ANSI_FG_GREEN),
        "yellow" => Some("\x1b[33m"),
        "blue" => Some("\x1b[34m"),
        "magenta" => Some("\x1b[35m"),
        "cyan" => Some("\x1b[36m"),
        "white" => Some("\x1b[37m"),
        "bright_black" => Some("\x1b[90m"),
        _ => None,
    }
}

/// Check if stdout is a terminal (TTY)
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Get terminal width dynamically
///
/// Uses the `terminal_size` crate for reliable detection, with fallback to
/// COLUMNS environment variable and a sensible default.
pub fn get_terminal_width() -> usize {
    if let Some((terminal_size::Width(w), _)) = terminal_size::terminal_size() {
        if w > 0 {
            return w as usize;
        }
    }

    if let Ok(cols) = std::env::var("COLUMNS") {
        if let Ok(width) = cols.parse::<usize>() {
            if width > 0 && width < 10000 {
                return width;
            }
        }
    }

    100
}

fn paint(text: &str, code: Option<&str>, is_tty: bool) -> String {
    match code {
        Some(code) if is_tty => format!("{}{}{}", code, text, ANSI_RESET),
        _ => text.to_string(),
    }
}

/// Format a whole-unit amount with thousands separators
pub fn format_value(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width <= 1 {
        return text.chars().take(width).collect();
    }
    let mut out: String = text.chars().take(width - 1).collect();
    out.push('…');
    out
}

fn card_markers(card: &Card) -> String {
    let mut markers = Vec::new();
    if card.pending {
        markers.push("saving");
    }
    if card.awaiting_echo {
        markers.push("unconfirmed");
    }
    if card.pinned {
        markers.push("pinned");
    }
    if markers.is_empty() {
        String::new()
    } else {
        format!("[{}]", markers.join(", "))
    }
}

/// Render the board one column section at a time, in display order
pub fn format_board(board: &BoardView, is_tty: bool, width: usize) -> String {
    let id_width = board
        .columns
        .iter()
        .flat_map(|c| c.cards.iter())
        .map(|card| card.id.as_str().len())
        .max()
        .unwrap_or(2)
        .max(2);
    // id, name, value, markers
    let name_width = width.saturating_sub(id_width + 2 + 2 + 14 + 2 + 24).clamp(12, 48);

    let mut out = String::new();
    for column in &board.columns {
        let count = column.cards.len();
        let noun = match (board.pipeline, count == 1) {
            (PipelineKind::Deals, true) => "deal",
            (PipelineKind::Deals, false) => "deals",
            (PipelineKind::Brokers, true) => "broker",
            (PipelineKind::Brokers, false) => "brokers",
        };
        let mut header = format!("{} ({} {})", column.label, count, noun);
        let total = column.total_value();
        if total > 0 {
            header.push_str(&format!("  ${}", format_value(total)));
        }
        let colored = paint(&header, color_name_to_fg(column.color), is_tty);
        out.push_str(&paint(&colored, Some(ANSI_BOLD), is_tty));
        out.push('\n');

        if column.cards.is_empty() {
            out.push_str(&paint("  (empty)", Some(ANSI_DIM), is_tty));
            out.push('\n');
        }
        for card in &column.cards {
            let value = card.value.map(|v| format!("${}", format_value(v))).unwrap_or_default();
            let line = format!(
                "  {:<id_w$}  {:<name_w$}  {:>14}  {}",
                card.id.as_str(),
                truncate(&card.name, name_width),
                value,
                card_markers(card),
                id_w = id_width,
                name_w = name_width,
            );
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Server-side listing, one entity per line
pub fn format_entity_list(entities: &[Entity], table: &'static StageTable) -> String {
    if entities.is_empty() {
        return format!("No {} found.\n", table.pipeline);
    }

    let id_width = entities.iter().map(|e| e.id.as_str().len()).max().unwrap_or(2).max(2);
    let name_width = entities.iter().map(|e| e.name.chars().count()).max().unwrap_or(4).clamp(4, 40);
    let stage_width = entities.iter().map(|e| e.stage.as_str().len()).max().unwrap_or(5).max(5);

    let mut out = format!(
        "{:<id_w$}  {:<name_w$}  {:<stage_w$}  {:<18}  {:>14}\n",
        "ID", "Name", "Stage", "Column", "Value",
        id_w = id_width, name_w = name_width, stage_w = stage_width,
    );
    for entity in entities {
        let column = table.column_for_stage(&entity.stage);
        let value = entity.value.map(format_value).unwrap_or_default();
        let line = format!(
            "{:<id_w$}  {:<name_w$}  {:<stage_w$}  {:<18}  {:>14}",
            entity.id.as_str(),
            truncate(&entity.name, name_width),
            entity.stage.as_str(),
            column.key(),
            value,
            id_w = id_width, name_w = name_width, stage_w = stage_width,
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Column table: key, label, the stage a drop persists, and folded stages
pub fn format_stage_table(table: &'static StageTable) -> String {
    let mut out = format!("{:<18}  {:<18}  {:<14}  {}\n", "Column", "Label", "Saves as", "Also shows");
    out.push_str(&format!(
        "{:<18}  {:<18}  {:<14}  {}\n",
        table.catch_all.key, table.catch_all.label, "(view only)", "anything unmapped"
    ));
    for column in table.columns {
        let line = format!(
            "{:<18}  {:<18}  {:<14}  {}",
            column.key,
            column.label,
            column.stage,
            column.folds.join(", ")
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

pub fn format_toast(notification: &Notification, is_tty: bool) -> String {
    match notification.severity {
        Severity::Success => paint(&format!("✓ {}", notification.message), Some(ANSI_FG_GREEN), is_tty),
        Severity::Error => paint(&format!("✗ {}", notification.message), Some(ANSI_FG_RED), is_tty),
    }
}
