use std::{
    io::{self, BufRead},
    sync::Arc,
    thread,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use client_core::{ClientHandle, ExpiryCheck, ExpiryNotifier, RealtimeClient};
use crossbeam_channel::{bounded, Receiver};
use shared::domain::{Item, ItemId, SortDirection, SortField};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod backend_bridge;
mod config;
mod controller;
mod view;

use app::ConsoleApp;
use backend_bridge::{
    commands::BackendCommand,
    runtime::{launch, BackendConfig},
};
use config::{load_settings, ClientSettings};
use controller::{events::UiEvent, input::ItemEdits};
use view::{format_row, TerminalListView};

#[derive(Parser, Debug)]
#[command(name = "warehouse", about = "Terminal client for the warehouse item service")]
struct Cli {
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    username: Option<String>,
    #[arg(long, global = true)]
    sort_field: Option<SortField>,
    #[arg(long, global = true)]
    sort_direction: Option<SortDirection>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live, sorted item list with console commands (default).
    Watch,
    /// Print the current items once.
    List,
    Add {
        name: String,
        amount: i64,
        exp_date: String,
        #[arg(value_name = "BOX")]
        box_label: String,
    },
    Edit {
        item_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        amount: Option<i64>,
        #[arg(long)]
        exp_date: Option<String>,
        #[arg(long = "box")]
        box_label: Option<String>,
    },
    Remove {
        item_id: String,
    },
    /// Run the expired-item check once.
    CheckExpired {
        /// Check date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

impl Cli {
    fn apply_to(&self, mut settings: ClientSettings) -> ClientSettings {
        if let Some(server_url) = &self.server_url {
            settings.server_url = server_url.clone();
        }
        if let Some(username) = &self.username {
            settings.username = Some(username.clone());
        }
        if let Some(field) = self.sort_field {
            settings.sort.field = field;
        }
        if let Some(direction) = self.sort_direction {
            settings.sort.direction = direction;
        }
        settings
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.apply_to(load_settings());
    let username = settings
        .username
        .clone()
        .ok_or_else(|| anyhow!("username required: pass --username, set WAREHOUSE_USERNAME or add it to {}", config::SETTINGS_FILE))?;

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => run_watch(&settings, username),
        command => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;
            runtime.block_on(run_once(&settings, &username, command))
        }
    }
}

fn run_watch(settings: &ClientSettings, username: String) -> Result<()> {
    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    let backend = launch(
        BackendConfig {
            server_url: settings.server_url.clone(),
            username,
            expiry_interval: settings.expiry_interval,
        },
        cmd_rx,
        ui_tx,
    )
    .context("failed to start backend worker")?;
    let input_rx = spawn_stdin_reader().context("failed to start console reader")?;

    let mut app = ConsoleApp::new(cmd_tx, settings.sort, TerminalListView::new(io::stdout()));
    app::run(&mut app, &ui_rx, input_rx)?;
    // Closing the command queue stops the backend if it is still running.
    drop(app);
    if backend.join().is_err() {
        warn!("backend worker panicked");
    }
    Ok(())
}

fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (line_tx, line_rx) = bounded(16);
    thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(line_rx)
}

async fn run_once(settings: &ClientSettings, username: &str, command: Command) -> Result<()> {
    let client = Arc::new(RealtimeClient::new());
    client.login(&settings.server_url, username).await?;

    match command {
        Command::Watch => bail!("watch runs on its own worker thread"),
        Command::List => {
            let mut items = client.list_items().await?;
            settings.sort.apply(&mut items);
            if items.is_empty() {
                println!("(no items)");
            }
            for (row, item) in items.iter().enumerate() {
                println!("{:>3}. {}  [{}]", row + 1, format_row(item), display_id(item));
            }
        }
        Command::Add {
            name,
            amount,
            exp_date,
            box_label,
        } => {
            let created = client
                .create_item(Item::draft(name, amount, exp_date, box_label))
                .await?;
            println!("created {}  [{}]", format_row(&created), display_id(&created));
        }
        Command::Edit {
            item_id,
            name,
            amount,
            exp_date,
            box_label,
        } => {
            let edits = ItemEdits {
                name,
                amount,
                exp_date,
                box_label,
            };
            if edits.is_empty() {
                bail!("nothing to change; pass at least one of --name, --amount, --exp-date, --box");
            }
            let item_id = ItemId::new(item_id);
            let current = client
                .list_items()
                .await?
                .into_iter()
                .find(|item| item.id.as_ref() == Some(&item_id))
                .ok_or_else(|| anyhow!("item {item_id} not found"))?;
            let updated = client.update_item(edits.apply_to(&current)).await?;
            println!("updated {}  [{}]", format_row(&updated), display_id(&updated));
        }
        Command::Remove { item_id } => {
            let item_id = ItemId::new(item_id);
            client.delete_item(&item_id).await?;
            println!("removed {item_id}");
        }
        Command::CheckExpired { today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let check = ExpiryCheck::new(client.clone(), Arc::new(PrintNotifier));
            let report = check.run_once(today).await?;
            println!(
                "checked {} item(s) on {today}: {} expired, {} with unreadable dates",
                report.checked,
                report.expired.len(),
                report.unparseable
            );
        }
    }

    client.sign_out().await?;
    info!("done");
    Ok(())
}

fn display_id(item: &Item) -> &str {
    item.id.as_ref().map(ItemId::as_str).unwrap_or("-")
}

struct PrintNotifier;

impl ExpiryNotifier for PrintNotifier {
    fn notify_expired(&self, expired: &[Item]) {
        for item in expired {
            println!("  ! {}  [{}]", format_row(item), display_id(item));
        }
    }
}
