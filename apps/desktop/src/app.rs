//! UI thread of the `watch` mode. Owns the inventory session exclusively.

use std::io::{self, Write};

use client_core::{EventOutcome, InventorySession, SortPolicy, SyncPhase};
use crossbeam_channel::{never, select, Receiver, Sender};
use tracing::{debug, info};

use crate::{
    backend_bridge::commands::BackendCommand,
    controller::{
        events::{UiErrorContext, UiEvent},
        input::{parse_command, ConsoleCommand, HELP},
        orchestration::dispatch_backend_command,
    },
    view::{format_row, TerminalListView},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct ConsoleApp<W: Write> {
    cmd_tx: Sender<BackendCommand>,
    initial_sort: SortPolicy,
    session: Option<InventorySession>,
    view: TerminalListView<W>,
    status: String,
}

impl<W: Write> ConsoleApp<W> {
    pub fn new(cmd_tx: Sender<BackendCommand>, initial_sort: SortPolicy, view: TerminalListView<W>) -> Self {
        Self {
            cmd_tx,
            initial_sort,
            session: None,
            view,
            status: String::new(),
        }
    }

    pub fn session(&self) -> Option<&InventorySession> {
        self.session.as_ref()
    }

    pub fn handle_ui_event(&mut self, event: UiEvent) -> io::Result<Flow> {
        match event {
            UiEvent::Info(message) => self.view.line(message)?,
            UiEvent::LoggedIn { user_id, username } => {
                self.session = Some(InventorySession::new(user_id, self.initial_sort));
                self.view
                    .line(format!("Signed in as {username} (user {user_id})"))?;
                self.view.loading_started()?;
            }
            UiEvent::Sync(event) => {
                let Some(session) = self.session.as_mut() else {
                    debug!(kind = event.kind(), "sync event without a session ignored");
                    return Ok(Flow::Continue);
                };
                match session.handle(event, &mut self.view) {
                    EventOutcome::PrimingComplete => self.view.loading_finished(session.collection())?,
                    EventOutcome::Cancelled(reason) => {
                        self.view.line(format!(
                            "Item stream closed ({reason}); the list is no longer live. Restart to resubscribe."
                        ))?;
                    }
                    EventOutcome::Rejected(err) => {
                        self.view.line(format!("Ignored remote change: {err}"))?;
                    }
                    EventOutcome::Applied | EventOutcome::Ignored => {
                        self.view.flush(session.collection())?;
                    }
                }
            }
            UiEvent::ItemSaved(item) => self.view.line(format!("Saved: {}", format_row(&item)))?,
            UiEvent::ItemDeleted(item_id) => self.view.line(format!("Deleted item {item_id}"))?,
            UiEvent::ExpiredItems(items) => {
                self.view
                    .line(format!("{} expired item(s):", items.len()))?;
                for item in &items {
                    self.view.line(format!("  ! {}", format_row(item)))?;
                }
            }
            UiEvent::Error(err) => {
                self.view.line(format!(
                    "Error ({:?}, {:?}): {}",
                    err.category(),
                    err.context(),
                    err.message()
                ))?;
                if matches!(
                    err.context(),
                    UiErrorContext::Login | UiErrorContext::BackendStartup
                ) {
                    return Ok(Flow::Exit);
                }
                if err.requires_reauth() {
                    self.view.line("Session is no longer valid; signing out.")?;
                    return self.request_sign_out();
                }
            }
            UiEvent::SignedOut => {
                if let Some(session) = self.session.take() {
                    session.teardown();
                }
                self.view.line("Signed out.")?;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    pub fn handle_input(&mut self, line: &str) -> io::Result<Flow> {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(err) => {
                self.view.line(err.to_string())?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            ConsoleCommand::Help => self.view.line(HELP)?,
            ConsoleCommand::List => match &self.session {
                Some(session) => self.view.render(session.collection().items())?,
                None => self.view.line("Not signed in yet.")?,
            },
            ConsoleCommand::Sort { field, direction } => {
                let Some(session) = self.session.as_mut() else {
                    return self.say("Not signed in yet.");
                };
                if session.phase() == SyncPhase::Priming {
                    return self.say("Still loading; sorting is enabled once the list has loaded.");
                }
                let mut sort = session.sort();
                if let Some(field) = field {
                    sort = sort.with_field(field);
                }
                if let Some(direction) = direction {
                    sort = sort.with_direction(direction);
                }
                session.set_sort_policy(sort, &mut self.view);
                self.view.line(format!("Sorted by {} {}", sort.field, sort.direction))?;
                self.view.flush(session.collection())?;
            }
            ConsoleCommand::Add(item) => self.dispatch(BackendCommand::CreateItem { item })?,
            ConsoleCommand::Edit { row, edits } => {
                let Some(item) = self.item_at(row) else {
                    return self.say(format!("No item at row {row}."));
                };
                let item = edits.apply_to(&item);
                self.dispatch(BackendCommand::UpdateItem { item })?;
            }
            ConsoleCommand::Remove { row } => {
                let Some(item_id) = self.item_at(row).and_then(|item| item.id) else {
                    return self.say(format!("No item at row {row}."));
                };
                self.dispatch(BackendCommand::DeleteItem { item_id })?;
            }
            ConsoleCommand::CheckExpired => self.dispatch(BackendCommand::CheckExpired)?,
            ConsoleCommand::Quit => return self.request_sign_out(),
        }
        Ok(Flow::Continue)
    }

    /// Asks the backend to sign out; exits right away if it cannot be reached.
    pub fn request_sign_out(&mut self) -> io::Result<Flow> {
        if dispatch_backend_command(&self.cmd_tx, BackendCommand::SignOut, &mut self.status) {
            info!("sign out requested");
            Ok(Flow::Continue)
        } else {
            self.view.line(self.status.clone())?;
            Ok(Flow::Exit)
        }
    }

    fn item_at(&self, row: usize) -> Option<shared::domain::Item> {
        self.session
            .as_ref()?
            .collection()
            .get(row.checked_sub(1)?)
            .cloned()
    }

    fn dispatch(&mut self, cmd: BackendCommand) -> io::Result<()> {
        if !dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status) {
            self.view.line(self.status.clone())?;
        }
        Ok(())
    }

    fn say(&mut self, text: impl AsRef<str>) -> io::Result<Flow> {
        self.view.line(text)?;
        Ok(Flow::Continue)
    }
}

/// Multiplexes backend events and console lines until the app exits.
///
/// End of input counts as `quit`; the loop then waits for the backend to
/// confirm the sign out.
pub fn run<W: Write>(
    app: &mut ConsoleApp<W>,
    ui_rx: &Receiver<UiEvent>,
    input_rx: Receiver<String>,
) -> io::Result<()> {
    let closed_input = never();
    let mut input_closed = false;
    loop {
        let input = if input_closed { &closed_input } else { &input_rx };
        let flow = select! {
            recv(ui_rx) -> event => match event {
                Ok(event) => app.handle_ui_event(event)?,
                Err(_) => {
                    app.view.line("Backend worker stopped.")?;
                    Flow::Exit
                }
            },
            recv(input) -> line => match line {
                Ok(line) => app.handle_input(&line)?,
                Err(_) => {
                    input_closed = true;
                    app.request_sign_out()?
                }
            },
        };
        if flow == Flow::Exit {
            return Ok(());
        }
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
