use shared::{
    domain::{Item, ItemId, UserId},
    error::{ApiError, ErrorCode},
    protocol::ServerEvent,
};
use storage::Storage;
use tracing::debug;

const MAX_USERNAME_CHARS: usize = 64;
const MAX_NAME_CHARS: usize = 120;
const MAX_BOX_CHARS: usize = 40;
const MAX_EXP_DATE_CHARS: usize = 32;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn login(ctx: &ApiContext, username: &str) -> Result<UserId, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("username must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::validation("username is too long"));
    }
    ctx.storage.create_user(username).await.map_err(internal)
}

pub async fn list_items(ctx: &ApiContext, user_id: UserId) -> Result<Vec<Item>, ApiError> {
    ensure_known_user(ctx, user_id).await?;
    ctx.storage
        .list_items_for_user(user_id)
        .await
        .map_err(internal)
}

/// The initial state of `items/{user_id}`: one add per stored item, then the
/// snapshot marker.
pub async fn snapshot_events(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<Vec<ServerEvent>, ApiError> {
    let items = list_items(ctx, user_id).await?;
    let item_count = items.len();
    let mut events = Vec::with_capacity(item_count + 1);
    let mut prev_key = None;
    for item in items {
        let next_prev = item.id.clone();
        events.push(ServerEvent::ItemAdded { item, prev_key });
        prev_key = next_prev;
    }
    events.push(ServerEvent::SnapshotComplete { item_count });
    Ok(events)
}

pub async fn create_item(
    ctx: &ApiContext,
    user_id: UserId,
    item: Item,
) -> Result<ServerEvent, ApiError> {
    ensure_known_user(ctx, user_id).await?;
    if item.id.is_some() {
        return Err(ApiError::validation("item id is assigned by the store"));
    }
    validate_item(&item)?;

    let stored = ctx
        .storage
        .insert_item(user_id, &item)
        .await
        .map_err(internal)?;
    let prev_key = ctx
        .storage
        .preceding_item_id(user_id, &stored)
        .await
        .map_err(internal)?;
    debug!(user_id = user_id.0, item_id = ?stored.id, "item created");
    Ok(ServerEvent::ItemAdded {
        item: stored,
        prev_key,
    })
}

/// Emits `item_changed`, followed by `item_moved` when the edit shifted the
/// item's position in expiration order.
pub async fn update_item(
    ctx: &ApiContext,
    user_id: UserId,
    item_id: ItemId,
    mut item: Item,
) -> Result<Vec<ServerEvent>, ApiError> {
    ensure_known_user(ctx, user_id).await?;
    if item_id.is_blank() {
        return Err(ApiError::validation("item id must not be empty"));
    }
    if let Some(body_id) = item.assigned_id() {
        if body_id != &item_id {
            return Err(ApiError::validation("item id does not match request path"));
        }
    }
    validate_item(&item)?;
    item.id = Some(item_id.clone());

    let current = ctx
        .storage
        .load_item(user_id, &item_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("item {item_id} not found")))?;
    let prev_before = ctx
        .storage
        .preceding_item_id(user_id, &current)
        .await
        .map_err(internal)?;

    let updated = ctx
        .storage
        .update_item(user_id, &item)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("item {item_id} not found")))?;
    let prev_after = ctx
        .storage
        .preceding_item_id(user_id, &updated)
        .await
        .map_err(internal)?;

    let mut events = vec![ServerEvent::ItemChanged {
        item: updated.clone(),
        prev_key: prev_after.clone(),
    }];
    if prev_before != prev_after {
        events.push(ServerEvent::ItemMoved {
            item: updated,
            prev_key: prev_after,
        });
    }
    Ok(events)
}

pub async fn delete_item(
    ctx: &ApiContext,
    user_id: UserId,
    item_id: ItemId,
) -> Result<ServerEvent, ApiError> {
    ensure_known_user(ctx, user_id).await?;
    let removed = ctx
        .storage
        .delete_item(user_id, &item_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("item {item_id} not found")))?;
    debug!(user_id = user_id.0, item_id = %item_id, "item deleted");
    Ok(ServerEvent::ItemRemoved { item: removed })
}

pub fn validate_item(item: &Item) -> Result<(), ApiError> {
    let name = item.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("item name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ApiError::validation("item name is too long"));
    }
    if item.amount < 0 {
        return Err(ApiError::validation("item amount must not be negative"));
    }
    if item.exp_date.chars().count() > MAX_EXP_DATE_CHARS {
        return Err(ApiError::validation("expiration date is too long"));
    }
    if item.box_label.chars().count() > MAX_BOX_CHARS {
        return Err(ApiError::validation("box label is too long"));
    }
    Ok(())
}

async fn ensure_known_user(ctx: &ApiContext, user_id: UserId) -> Result<(), ApiError> {
    ctx.storage
        .username_for_user(user_id)
        .await
        .map_err(internal)?
        .map(|_| ())
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "unknown user"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
