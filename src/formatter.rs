use crate::types::{ChatEvent, Sender};

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const GRAY: &'static str = "\x1b[90m";

    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Text,
        }
    }
}

pub struct MessageFormatter {
    format: OutputFormat,
    colored: bool,
    message_count: u64,
}

impl MessageFormatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self {
            format,
            colored,
            message_count: 0,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Renders a completed message. Transient stream events never go through here.
    pub fn render_message(&mut self, event: &ChatEvent) -> String {
        self.message_count += 1;
        match self.format {
            OutputFormat::Text => self.render_text(event),
            OutputFormat::Json => render_json(event),
            OutputFormat::Minimal => render_minimal(event),
        }
    }

    /// Prefix printed when an assistant stream begins.
    pub fn render_stream_prefix(&self) -> String {
        self.paint(Colors::BRIGHT_GREEN, &format!("{} ", label(Sender::Assistant)))
    }

    /// Trailer after an inline stream: a newline plus any related questions.
    pub fn render_stream_trailer(&mut self, event: &ChatEvent) -> String {
        self.message_count += 1;
        let mut out = String::from("\n");
        out.push_str(&self.render_related(event));
        out
    }

    pub fn render_status(&self, status: &str, message: &str) -> String {
        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "AUTHENTICATING" => (Colors::BRIGHT_BLUE, "~"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            "RECONNECTING" => (Colors::BRIGHT_YELLOW, ">"),
            "STOPPING" => (Colors::BRIGHT_MAGENTA, "!"),
            _ => (Colors::GRAY, "-"),
        };
        if self.colored {
            format!(
                "{}{}[{}]{} {} {}{}{}",
                Colors::BOLD,
                color,
                status,
                Colors::RESET,
                symbol,
                Colors::DIM,
                message,
                Colors::RESET
            )
        } else {
            format!("[{}] {} {}", status, symbol, message)
        }
    }

    pub fn render_error(&self, message: &str) -> String {
        if self.colored {
            format!(
                "{}{}[ERROR]{} ! {}{}{}",
                Colors::BOLD,
                Colors::BRIGHT_RED,
                Colors::RESET,
                Colors::RED,
                message,
                Colors::RESET
            )
        } else {
            format!("[ERROR] ! {}", message)
        }
    }

    fn render_text(&self, event: &ChatEvent) -> String {
        let color = match event.sender {
            Sender::User => Colors::BRIGHT_CYAN,
            Sender::Assistant => Colors::BRIGHT_GREEN,
        };
        let time = event.timestamp.format("%H:%M:%S").to_string();

        let mut out = format!(
            "{} {} {}",
            self.paint(Colors::GRAY, &time),
            self.paint(color, label(event.sender)),
            event.content
        );
        if let Some(source) = &event.source {
            out.push_str(&format!(" {}", self.paint(Colors::DIM, &format!("[{}]", source))));
        }
        out.push('\n');
        out.push_str(&self.render_related(event));
        out
    }

    fn render_related(&self, event: &ChatEvent) -> String {
        let questions = event.related_questions();
        if questions.is_empty() || self.format != OutputFormat::Text {
            return String::new();
        }
        let mut out = self.paint(Colors::BRIGHT_MAGENTA, "  Related questions:");
        out.push('\n');
        for (i, question) in questions.iter().enumerate() {
            out.push_str(&format!("    {}. {}\n", i + 1, question));
        }
        out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}{}", Colors::BOLD, color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }
}

fn label(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "you>",
        Sender::Assistant => "assistant>",
    }
}

fn render_json(event: &ChatEvent) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|e| {
        serde_json::json!({ "error": format!("failed to serialize event: {e}") }).to_string()
    });
    line.push('\n');
    line
}

fn render_minimal(event: &ChatEvent) -> String {
    format!("{}: {}\n", event.sender.as_str(), event.content)
}
