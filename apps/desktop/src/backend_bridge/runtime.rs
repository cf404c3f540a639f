//! Backend worker: owns the tokio runtime, the item service client and the
//! expired-item schedule. Talks to the UI thread only through the queues.

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::Local;
use client_core::{
    ClientHandle, ExistingSchedulePolicy, ExpiryCheck, ExpiryNotifier, PeriodicScheduler,
    RealtimeClient, Subscription, SyncEvent, EXPIRED_ITEMS_TASK,
};
use crossbeam_channel::{Receiver, Sender};
use shared::domain::Item;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{classify_login_failure, UiError, UiErrorContext, UiEvent};

const SYNC_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub server_url: String,
    pub username: String,
    pub expiry_interval: Duration,
}

pub fn launch(
    config: BackendConfig,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("warehouse-backend".into())
        .spawn(move || run_backend(config, cmd_rx, ui_tx))
}

fn run_backend(config: BackendConfig, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::BackendStartup,
                format!("backend worker startup failure: failed to build runtime: {err}"),
            )));
            error!("failed to build backend runtime: {err}");
            return;
        }
    };

    runtime.block_on(serve(config, cmd_rx, ui_tx));
}

async fn serve(config: BackendConfig, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    let client = Arc::new(RealtimeClient::new());
    let user_id = match client.login(&config.server_url, &config.username).await {
        Ok(user_id) => user_id,
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::Login,
                classify_login_failure(&format!("{err:#}")),
            )));
            return;
        }
    };
    let _ = ui_tx.try_send(UiEvent::LoggedIn {
        user_id,
        username: config.username.clone(),
    });

    let (sync_tx, sync_rx) = mpsc::channel(SYNC_EVENT_BUFFER);
    let mut subscription: Option<Subscription> = match client.subscribe_items(sync_tx).await {
        Ok(subscription) => Some(subscription),
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_error(
                UiErrorContext::Subscribe,
                &err,
            )));
            None
        }
    };
    let forwarder = tokio::spawn(forward_sync_events(sync_rx, ui_tx.clone()));

    let scheduler = PeriodicScheduler::new();
    let expiry_check = Arc::new(ExpiryCheck::new(
        client.clone(),
        Arc::new(UiExpiryNotifier {
            ui_tx: ui_tx.clone(),
        }),
    ));
    scheduler.enqueue_unique_periodic(
        EXPIRED_ITEMS_TASK,
        config.expiry_interval,
        ExistingSchedulePolicy::Keep,
        expiry_check.clone(),
    );

    while let Ok(cmd) = cmd_rx.recv() {
        debug!(command = cmd.name(), "backend command received");
        match cmd {
            BackendCommand::CreateItem { item } => match client.create_item(item).await {
                Ok(created) => {
                    let _ = ui_tx.try_send(UiEvent::ItemSaved(created));
                }
                Err(err) => report(&ui_tx, UiErrorContext::SaveItem, &err),
            },
            BackendCommand::UpdateItem { item } => match client.update_item(item).await {
                Ok(updated) => {
                    let _ = ui_tx.try_send(UiEvent::ItemSaved(updated));
                }
                Err(err) => report(&ui_tx, UiErrorContext::SaveItem, &err),
            },
            BackendCommand::DeleteItem { item_id } => match client.delete_item(&item_id).await {
                Ok(()) => {
                    let _ = ui_tx.try_send(UiEvent::ItemDeleted(item_id));
                }
                Err(err) => report(&ui_tx, UiErrorContext::DeleteItem, &err),
            },
            BackendCommand::CheckExpired => {
                match expiry_check.run_once(Local::now().date_naive()).await {
                    Ok(report) if report.expired.is_empty() => {
                        let _ = ui_tx.try_send(UiEvent::Info(format!(
                            "No expired items ({} checked, {} with unreadable dates)",
                            report.checked, report.unparseable
                        )));
                    }
                    // The notifier already delivered the expired items.
                    Ok(_) => {}
                    Err(err) => report(&ui_tx, UiErrorContext::ExpiryCheck, &err),
                }
            }
            BackendCommand::SignOut => {
                drop(subscription.take());
                scheduler.cancel(EXPIRED_ITEMS_TASK);
                if let Err(err) = client.sign_out().await {
                    report(&ui_tx, UiErrorContext::General, &err);
                }
                let _ = ui_tx.send(UiEvent::SignedOut);
                break;
            }
            BackendCommand::Shutdown => break,
        }
    }

    drop(subscription);
    scheduler.shutdown();
    forwarder.abort();
    info!("backend worker stopped");
}

fn report(ui_tx: &Sender<UiEvent>, context: UiErrorContext, err: &anyhow::Error) {
    warn!(?context, error = %format!("{err:#}"), "backend command failed");
    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_error(context, err)));
}

/// Moves sync events onto the UI queue in order. Blocks for room instead of
/// dropping, since a lost event would desynchronize the list.
async fn forward_sync_events(mut sync_rx: mpsc::Receiver<SyncEvent>, ui_tx: Sender<UiEvent>) {
    while let Some(event) = sync_rx.recv().await {
        let delivered = tokio::task::block_in_place(|| ui_tx.send(UiEvent::Sync(event)));
        if delivered.is_err() {
            debug!("ui event queue closed; stopping sync forwarder");
            break;
        }
    }
}

struct UiExpiryNotifier {
    ui_tx: Sender<UiEvent>,
}

impl ExpiryNotifier for UiExpiryNotifier {
    fn notify_expired(&self, expired: &[Item]) {
        warn!(count = expired.len(), "expired items found");
        let _ = self.ui_tx.try_send(UiEvent::ExpiredItems(expired.to_vec()));
    }
}
