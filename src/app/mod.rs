#[cfg(test)]
#[path = "app_test.rs"]
mod tests;

pub mod input;
pub mod render;

pub use input::{HELP, Input, parse_input};

use std::collections::HashSet;
use std::io::{self, Stdout, Write};

use eyre::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{ConversationSettings, TransportEvent};
use crate::session::Session;

use render::{format_error, format_message, format_participant};

/// Line oriented front end over a [`Session`]. Conversation output goes to
/// `out`, diagnostics to stderr.
pub struct App<W = Stdout> {
    session: Session,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    cancel_token: CancellationToken,
    printed: HashSet<String>,
    out: W,
}

impl App<Stdout> {
    pub fn new(
        session: Session,
        event_rx: mpsc::UnboundedReceiver<TransportEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self::with_output(session, event_rx, cancel_token, io::stdout())
    }
}

impl<W: Write> App<W> {
    pub fn with_output(
        session: Session,
        event_rx: mpsc::UnboundedReceiver<TransportEvent>,
        cancel_token: CancellationToken,
        out: W,
    ) -> Self {
        Self {
            session,
            event_rx,
            cancel_token,
            printed: HashSet::new(),
            out,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.run_with_input(BufReader::new(tokio::io::stdin())).await
    }

    async fn run_with_input<R: AsyncBufRead + Unpin>(&mut self, input: R) -> Result<()> {
        if !self.session.load().await {
            self.print_ui_error();
        }

        match self.session.connection_error() {
            Some(err) if !self.session.is_connected() => {
                eprintln!("Realtime unavailable ({}), messages go over REST", err)
            }
            _ => {}
        }
        if let Some(title) = self.session.conversation().and_then(|c| c.title().map(str::to_string)) {
            self.print(format!("== {} ==", title));
        }
        self.print_new_messages();

        let mut lines = input.lines();
        let mut events_open = true;
        self.prompt();
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log::debug!("App cancelled");
                    break;
                }

                event = self.event_rx.recv(), if events_open => {
                    match event {
                        Some(event) => self.on_event(event),
                        None => events_open = false,
                    }
                }

                line = lines.next_line() => {
                    let Some(line) = line.wrap_err("reading input")? else {
                        break;
                    };
                    if !self.on_line(&line).await {
                        break;
                    }
                    self.prompt();
                }
            }
        }

        self.session.dispose().await;
        Ok(())
    }

    /// Handles one line of user input. Returns false when the user quits.
    async fn on_line(&mut self, line: &str) -> bool {
        match parse_input(line) {
            Ok(Input::Quit) => return false,
            Ok(input) => self.on_input(input).await,
            Err(err) => eprintln!("{}", err),
        }
        true
    }

    async fn on_input(&mut self, input: Input) {
        let ok = match input {
            Input::Empty | Input::Quit => return,
            Input::Send(text) => self.session.send_message(&text).await,
            Input::Delete(id) => {
                let ok = self.session.delete_message(&id).await;
                if ok {
                    self.printed.remove(&id);
                    self.print(format!("deleted {}", id));
                }
                ok
            }
            Input::Generate(participant_id) => {
                let participant_id = participant_id.or_else(|| {
                    self.session
                        .conversation()
                        .and_then(|c| c.assistant().map(|p| p.id().to_string()))
                });
                match participant_id {
                    Some(id) => self.session.generate_ai_response(&id).await,
                    None => {
                        eprintln!("No assistant in this conversation, use /ai <participant-id>");
                        return;
                    }
                }
            }
            Input::AddParticipant(id) => self.session.add_participant(&id).await,
            Input::RemoveParticipant(id) => self.session.remove_participant(&id).await,
            Input::Set(key, value) => {
                let mut settings = self
                    .session
                    .conversation()
                    .map(|c| c.settings().clone())
                    .unwrap_or_else(ConversationSettings::default);
                if let Err(err) = settings.set(&key, &value) {
                    eprintln!("{}", err);
                    return;
                }
                self.session.update_settings(settings).await
            }
            Input::Who => {
                for participant in self.session.participants() {
                    self.print(format_participant(&participant));
                }
                let typing = self.session.typing_names();
                if !typing.is_empty() {
                    self.print(format!("typing: {}", typing.join(", ")));
                }
                return;
            }
            Input::Errors => {
                for err in self.session.recent_errors() {
                    self.print(format_error(&err));
                }
                return;
            }
            Input::Help => {
                self.print(HELP);
                return;
            }
        };

        if !ok {
            self.print_ui_error();
        }
        self.print_new_messages();
    }

    fn on_event(&mut self, event: TransportEvent) {
        match &event {
            TransportEvent::TypingStarted(id) => {
                if let Some(name) = self.session.directory().display_name(id) {
                    let line = format!("{} is typing...", name);
                    self.print(line);
                }
            }
            TransportEvent::Disconnected(_) => {
                eprintln!("Realtime connection lost, messages go over REST");
            }
            TransportEvent::ServerError(message) => eprintln!("Server: {}", message),
            _ => {}
        }

        if self.session.handle_event(&event) {
            self.print_new_messages();
        }
    }

    fn print_new_messages(&mut self) {
        let Some(page) = self.session.messages() else {
            return;
        };
        let directory = self.session.directory();
        for message in page.items.iter() {
            if self.printed.insert(message.id().to_string()) {
                self.print(format_message(message, &directory));
            }
        }
    }

    fn print_ui_error(&self) {
        if let Some(err) = self.session.ui_error() {
            eprintln!("{}", err);
        }
    }

    fn print(&mut self, line: impl AsRef<str>) {
        if let Err(err) = writeln!(self.out, "{}", line.as_ref()) {
            log::warn!("Failed to write output: {}", err);
        }
    }

    fn prompt(&mut self) {
        let _ = write!(self.out, "> ");
        let _ = self.out.flush();
    }
}
