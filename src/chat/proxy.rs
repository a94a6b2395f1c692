use tracing::{debug, warn};

use crate::{
    db::User,
    error::BotError,
    messenger::{Inbound, Payload},
    AppState,
};

use super::relay;

/// Copies the message to the other party of the sender's open chat. Returns
/// false when there is nothing to relay it to.
pub async fn relay_message(state: &AppState, sender: &User, msg: &Inbound) -> Result<bool, BotError> {
    if !matches!(msg.payload, Payload::Text(_) | Payload::Photo(_) | Payload::Video(_)) {
        return Ok(false);
    }
    let Some(active) = relay::active_chat(&state.repos, sender).await? else {
        return Ok(false);
    };

    // a copy carries the content but not its author
    match state.messenger.copy_to(msg.chat, msg.message_id, active.peer.external_id).await {
        Ok(()) => debug!(chat_id = active.chat.id, "message relayed"),
        Err(err) => warn!(chat_id = active.chat.id, "relay to peer failed: {err:#}"),
    }
    Ok(true)
}
