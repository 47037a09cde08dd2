/// file: src/ui.rs
/// description: terminal presentation layer that renders events from the chat client
use crate::{
    client_state::ConnectionState,
    events::{ClientEvent, EventReceiver},
    formatter::{MessageFormatter, OutputFormat},
};
use std::io::Write;
use tracing::debug;

pub struct UIController {
    event_receiver: EventReceiver,
    formatter: MessageFormatter,
    quiet_mode: bool,
    streaming_inline: bool,
}

pub struct UIOptions {
    pub format: OutputFormat,
    pub colored: bool,
    pub quiet: bool,
}

impl UIController {
    pub fn new(event_receiver: EventReceiver, options: UIOptions) -> Self {
        Self {
            event_receiver,
            formatter: MessageFormatter::new(options.format, options.colored),
            quiet_mode: options.quiet,
            streaming_inline: false,
        }
    }

    pub async fn run(&mut self) {
        while let Some(event) = self.event_receiver.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
    }

    fn handle_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Connecting { url } => {
                self.print_status("CONNECTING", &url);
            }
            ClientEvent::Authenticating { connection_id } => {
                self.print_status("AUTHENTICATING", &format!("ID: {}", connection_id));
            }
            ClientEvent::Connected { message, .. } => {
                let message = message.unwrap_or_else(|| "Chat ready".to_string());
                self.print_status("CONNECTED", &message);
            }
            ClientEvent::StreamStarted => {
                debug!("Assistant stream started");
            }
            ClientEvent::StreamProgress { delta, .. } => {
                if self.formatter.format() == OutputFormat::Text {
                    if !self.streaming_inline {
                        self.streaming_inline = true;
                        emit(&self.formatter.render_stream_prefix());
                    }
                    emit(&delta);
                }
            }
            ClientEvent::Message(message) => {
                let out = if self.streaming_inline {
                    self.streaming_inline = false;
                    self.formatter.render_stream_trailer(&message)
                } else {
                    self.formatter.render_message(&message)
                };
                emit(&out);
            }
            ClientEvent::Error(error) => {
                self.finish_inline_stream();
                println!("{}", self.formatter.render_error(&error));
            }
            ClientEvent::Reconnecting { attempt, delay } => {
                self.print_status(
                    "RECONNECTING",
                    &format!("Attempt {} in {:.1}s...", attempt, delay.as_secs_f64()),
                );
            }
            ClientEvent::Disconnected { state } => {
                self.finish_inline_stream();
                let reason = match state {
                    ConnectionState::AuthFailed => "Authentication failed; use /token to supply a new token",
                    _ => "Connection closed",
                };
                self.print_status("DISCONNECTED", reason);
            }
            ClientEvent::Stopped => {
                self.print_status("STOPPING", "Chat client shut down");
                return false;
            }
        }

        true
    }

    fn finish_inline_stream(&mut self) {
        if self.streaming_inline {
            self.streaming_inline = false;
            println!();
        }
    }

    fn print_status(&self, status: &str, message: &str) {
        if self.quiet_mode {
            return;
        }
        println!("{}", self.formatter.render_status(status, message));
    }
}

pub fn emit(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}
