//! Terminal styling for `beatvault-admin`.

use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::{Color as TermColor, Stylize};

fn ansi(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

pub fn get_styles() -> Styles {
    let heading = ansi(AnsiColor::Cyan).bold().underline();
    Styles::styled()
        .usage(heading)
        .header(heading)
        .literal(ansi(AnsiColor::BrightCyan).bold())
        .valid(ansi(AnsiColor::Green).bold())
        .invalid(ansi(AnsiColor::Red).bold())
        .error(ansi(AnsiColor::Red).bold())
        .placeholder(ansi(AnsiColor::BrightBlack))
}

const ACCENT: TermColor = TermColor::Rgb { r: 0, g: 200, b: 200 };
const OK: TermColor = TermColor::Rgb { r: 80, g: 220, b: 120 };
const WARN: TermColor = TermColor::Rgb { r: 250, g: 190, b: 60 };
const FAIL: TermColor = TermColor::Rgb { r: 240, g: 80, b: 80 };
const MUTED: TermColor = TermColor::Rgb { r: 140, g: 140, b: 150 };

const PANEL_WIDTH: usize = 56;
const RULE: &str = "─";

fn status_line(mark: &str, color: TermColor, message: &str) -> String {
    format!(" {} {}", mark.with(color).bold(), message.with(color))
}

pub fn print_success(message: &str) {
    println!("{}", status_line("✓", OK, message));
}

/// Written to stderr so piped output stays clean.
pub fn print_error(message: &str) {
    eprintln!("{}", status_line("✗", FAIL, message));
}

pub fn print_warning(message: &str) {
    println!("{}", status_line("!", WARN, message));
}

/// Opens a panel: `┌─ title ─────┐`.
pub fn print_section_header(title: &str) {
    let used = title.chars().count() + 4;
    let tail = RULE.repeat(PANEL_WIDTH.saturating_sub(used));
    println!();
    println!(
        "{}{} {} {}{}",
        "┌".with(ACCENT),
        RULE.with(ACCENT),
        title.with(ACCENT).bold(),
        tail.with(ACCENT),
        "┐".with(ACCENT)
    );
}

pub fn print_section_footer() {
    println!(
        "{}{}{}",
        "└".with(ACCENT),
        RULE.repeat(PANEL_WIDTH).with(ACCENT),
        "┘".with(ACCENT)
    );
    println!();
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {:<14} {}", format!("{}:", key).with(MUTED), value.bold());
}

pub fn print_list_item(item: &str, indent: usize) {
    println!("{}{} {}", "  ".repeat(indent), "•".with(ACCENT), item);
}
