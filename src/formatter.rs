use crate::types::{
    Category, InvestmentUpdate, MarketTick, Notice, TransactionKind, TransactionUpdate, UserEvent,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::Value;

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    // Bright colors
    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

const SUMMARY_WIDTH: usize = 60;

/// One-line human summary of a payload. Falls back to compact JSON when the
/// payload does not match the category's model.
pub fn summarize(category: Category, payload: &Value) -> String {
    let typed = match category {
        Category::Market => MarketTick::deserialize(payload).ok().map(|tick| {
            let change = tick
                .change_percent
                .map(|c| format!(" {:+.2}%", c))
                .unwrap_or_default();
            format!("{} {:.2}{}", tick.symbol, tick.price, change)
        }),
        Category::Transaction => TransactionUpdate::deserialize(payload).ok().map(|tx| {
            let kind = match tx.kind {
                TransactionKind::Deposit => "deposit",
                TransactionKind::Withdrawal => "withdrawal",
            };
            format!(
                "{} {} {} {:.2} {}",
                kind,
                tx.id,
                tx.status,
                tx.amount,
                tx.currency.as_deref().unwrap_or("USD")
            )
        }),
        Category::Investment => InvestmentUpdate::deserialize(payload).ok().map(|inv| {
            match inv.value {
                Some(value) => format!("{} x{} = {:.2}", inv.symbol, inv.quantity, value),
                None => format!("{} x{}", inv.symbol, inv.quantity),
            }
        }),
        Category::Notification => {
            Notice::deserialize(payload).ok().map(|n| format!("{}: {}", n.title, n.message))
        }
        Category::User => UserEvent::deserialize(payload).ok().map(|u| match u.user_id {
            Some(id) => format!("{} ({})", u.event, id),
            None => u.event,
        }),
    };

    typed.unwrap_or_else(|| truncate(&payload.to_string(), SUMMARY_WIDTH))
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub struct FrameFormatter {
    format: OutputFormat,
    colored: bool,
    quiet: bool,
    frame_count: u64,
}

impl FrameFormatter {
    pub fn new(format: OutputFormat, colored: bool, quiet: bool) -> Self {
        Self {
            format,
            colored,
            quiet,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn print_header(&self) {
        if self.quiet || self.format != OutputFormat::Table {
            return;
        }

        let (gray, reset) = self.palette(Colors::GRAY);
        println!(
            "{}┌─────────┬──────────┬──────────────┬──────────────────────────────────────────────────────────────┐{}",
            gray, reset
        );
        println!(
            "{}│{} {:<7} {}│{} {:<8} {}│{} {:<12} {}│{} {:<60} {}│{}",
            gray, reset, "COUNT", gray, reset, "TIME", gray, reset, "CATEGORY", gray, reset, "EVENT", gray, reset
        );
        println!(
            "{}├─────────┼──────────┼──────────────┼──────────────────────────────────────────────────────────────┤{}",
            gray, reset
        );
    }

    pub fn print_frame(&mut self, category: Category, payload: &Value) {
        self.frame_count += 1;
        println!("{}", self.render(category, payload));
    }

    /// Formats one frame without printing it.
    pub fn render(&self, category: Category, payload: &Value) -> String {
        let local_time = Local::now();
        match self.format {
            OutputFormat::Table => {
                let (gray, reset) = self.palette(Colors::GRAY);
                let (color, _) = self.palette(category_color(category, payload));
                format!(
                    "{}│{} {:<7} {}│{} {:<8} {}│{} {}{:<12}{} {}│{} {:<60} {}│{}",
                    gray,
                    reset,
                    self.frame_count,
                    gray,
                    reset,
                    local_time.format("%H:%M:%S"),
                    gray,
                    reset,
                    color,
                    category,
                    reset,
                    gray,
                    reset,
                    summarize(category, payload),
                    gray,
                    reset
                )
            }
            OutputFormat::Json => {
                let json_obj = serde_json::json!({
                    "count": self.frame_count,
                    "category": category,
                    "local_time": local_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "payload": payload,
                });
                serde_json::to_string(&json_obj).unwrap_or_default()
            }
            OutputFormat::Minimal => {
                let (color, reset) = self.palette(category_color(category, payload));
                format!(
                    "{} {}{}{} {}",
                    local_time.format("%H:%M:%S"),
                    color,
                    category,
                    reset,
                    summarize(category, payload)
                )
            }
        }
    }

    pub fn print_summary(&self, duration_secs: u64) {
        if self.quiet {
            return;
        }

        let rate = if duration_secs > 0 {
            self.frame_count as f64 / duration_secs as f64
        } else {
            0.0
        };

        println!();
        let (color, reset) = self.palette(Colors::BRIGHT_CYAN);
        println!(
            "{}Summary: {} frames in {}s ({:.2} frames/sec){}",
            color, self.frame_count, duration_secs, rate, reset
        );
    }

    fn palette(&self, color: &'static str) -> (&'static str, &'static str) {
        if self.colored {
            (color, Colors::RESET)
        } else {
            ("", "")
        }
    }
}

fn category_color(category: Category, payload: &Value) -> &'static str {
    match category {
        Category::Market => match MarketTick::deserialize(payload).ok() {
            Some(tick) if tick.change_percent.is_some() && !tick.is_up() => Colors::BRIGHT_RED,
            _ => Colors::BRIGHT_GREEN,
        },
        Category::Transaction => Colors::BRIGHT_YELLOW,
        Category::Investment => Colors::BRIGHT_BLUE,
        Category::Notification => Colors::BRIGHT_MAGENTA,
        Category::User => Colors::BRIGHT_CYAN,
    }
}
