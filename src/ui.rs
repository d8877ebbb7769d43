/// file: src/ui.rs
/// description: terminal presentation of connection lifecycle and notification toasts
use crate::{
    events::{ClientEvent, EventReceiver},
    formatter::Colors,
    types::Notice,
};
use tracing::debug;

pub struct UIController {
    event_receiver: EventReceiver,
    colored: bool,
    quiet: bool,
    notices_shown: u64,
}

impl UIController {
    pub fn new(event_receiver: EventReceiver, colored: bool, quiet: bool) -> Self {
        Self {
            event_receiver,
            colored,
            quiet,
            notices_shown: 0,
        }
    }

    /// Runs until the client emits `Stopping` or the channel closes.
    pub async fn run(&mut self) -> u64 {
        self.print_startup_banner();
        while let Some(event) = self.event_receiver.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        self.notices_shown
    }

    fn handle_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Connecting { url, attempt } => {
                self.print_connection_status("CONNECTING", &format!("{} (attempt {})", url, attempt));
            }
            ClientEvent::Connected { connection_id } => {
                self.print_connection_status("CONNECTED", &format!("ID: {}", connection_id));
            }
            ClientEvent::ConnectionFailed(error) => {
                self.print_error("CONNECTION FAILED", &error);
            }
            ClientEvent::Reconnecting { attempt, delay_ms } => {
                self.print_reconnect_info(delay_ms, attempt);
            }
            ClientEvent::Disconnected => {
                self.print_connection_status("DISCONNECTED", "Connection closed");
            }
            ClientEvent::Notice(notice) => {
                self.notices_shown += 1;
                self.print_toast(&notice);
            }
            ClientEvent::Stopping => {
                debug!("Client stopping; UI loop exiting");
                return false;
            }
        }

        true
    }

    fn paint(&self, color: &'static str) -> (&'static str, &'static str, &'static str) {
        if self.colored {
            (Colors::BOLD, color, Colors::RESET)
        } else {
            ("", "", "")
        }
    }

    fn print_startup_banner(&self) {
        if self.quiet {
            return;
        }

        let (bold, cyan, reset) = self.paint(Colors::BRIGHT_CYAN);
        println!();
        println!(
            "{}{}╔══════════════════════════════════════════════════════════════════════════════╗{}",
            bold, cyan, reset
        );
        println!(
            "{}{}║                         DASHBOARD EVENT STREAM v{:<8}                    ║{}",
            bold,
            cyan,
            env!("CARGO_PKG_VERSION"),
            reset
        );
        println!(
            "{}{}╚══════════════════════════════════════════════════════════════════════════════╝{}",
            bold, cyan, reset
        );
        println!();
    }

    fn print_connection_status(&self, status: &str, message: &str) {
        if self.quiet {
            return;
        }

        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            _ => (Colors::WHITE, "-"),
        };
        let (bold, color, reset) = self.paint(color);
        let (_, white, _) = self.paint(Colors::WHITE);

        println!(
            "{}{}[{}]{} {} {}{}{}",
            bold, color, status, reset, symbol, white, message, reset
        );
    }

    // notices are shown even in quiet mode; they are meant for the user
    fn print_toast(&self, notice: &Notice) {
        let (bold, magenta, reset) = self.paint(Colors::BRIGHT_MAGENTA);
        let (_, dim, _) = self.paint(Colors::DIM);
        println!(
            "{}{}[NOTICE]{} {}{}{} {}{}{}",
            bold, magenta, reset, bold, notice.title, reset, dim, notice.message, reset
        );
    }

    fn print_error(&self, error_type: &str, message: &str) {
        if self.quiet {
            return;
        }

        let (bold, bright_red, reset) = self.paint(Colors::BRIGHT_RED);
        let (_, red, _) = self.paint(Colors::RED);
        println!(
            "{}{}[{}]{} ! {}{}{}",
            bold, bright_red, error_type, reset, red, message, reset
        );
    }

    fn print_reconnect_info(&self, delay_ms: u64, attempt: u32) {
        if self.quiet {
            return;
        }

        let (bold, yellow, reset) = self.paint(Colors::BRIGHT_YELLOW);
        println!(
            "{}{}[RECONNECTING]{} > Attempt {} in {:.1}s...",
            bold,
            yellow,
            reset,
            attempt,
            delay_ms as f64 / 1000.0
        );
    }
}
