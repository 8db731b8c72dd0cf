//! The logic-side host loop.

use crate::state::Page;
use anyhow::{Context as _, Error};
use bridge::InboundEvent;
use log::{debug, info};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{Instrument as _, info_span};

/// Drain the page, then dispatch inbound host events one at a time, draining
/// after each. Returns the page once the host closes its channel.
pub async fn serve(page: Page, inbound: UnboundedReceiver<InboundEvent>) -> Result<Page, Error> {
    drive(page, inbound).instrument(info_span!("page.serve")).await
}

async fn drive(mut page: Page, inbound: UnboundedReceiver<InboundEvent>) -> Result<Page, Error> {
    page.run_until_idle().context("initial drain")?;
    let mut events = UnboundedReceiverStream::new(inbound);
    while let Some(event) = events.next().await {
        debug!("host event `{}` for {}", event.event_type, event.target_id);
        if page.handle_host_event(event).is_none() {
            debug!("host event dropped");
        }
        page.run_until_idle().context("draining after a host event")?;
    }
    info!("host event channel closed; {} batches sent", page.counters().batches_sent);
    Ok(page)
}
