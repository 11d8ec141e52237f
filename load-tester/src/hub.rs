//! Hub handshake
//!
//! Opens a WebSocket to the live hub, sends the JSON protocol handshake and
//! waits briefly for anything to come back.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::runner::{ScenarioContext, StepError};
use crate::tls::install_crypto_provider;

/// Handshake text frame. The trailing 0x1E record separator terminates the
/// message and must be sent as-is.
pub const HANDSHAKE_FRAME: &str = "{\"protocol\":\"json\",\"version\":1}\u{1e}";

/// How long to wait for a reply after the handshake
pub const REPLY_WAIT: Duration = Duration::from_secs(2);

/// Connect, send the handshake frame, then wait for a reply or `REPLY_WAIT`.
///
/// Succeeds whether or not a reply arrives; only connect and send failures
/// (or cancellation) are errors. The connection is closed before returning.
pub async fn handshake_once(ctx: &ScenarioContext, hub_uri: &str) -> Result<(), StepError> {
    install_crypto_provider();
    let (mut ws, _) = ctx.cancellable(connect_async(hub_uri)).await??;

    ctx.cancellable(ws.send(Message::Text(HANDSHAKE_FRAME.to_string().into())))
        .await??;

    tokio::select! {
        _ = ctx.token().cancelled() => return Err(StepError::Cancelled),
        reply = ws.next() => {
            if let Some(Err(e)) = reply {
                debug!("Hub reply error ignored: {}", e);
            }
        }
        _ = tokio::time::sleep(REPLY_WAIT) => {}
    }

    if let Ok(Err(e)) = ctx.cancellable(ws.close(None)).await {
        debug!("Hub close failed: {}", e);
    }
    Ok(())
}
