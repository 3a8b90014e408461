//! Persistence lane worker

use crate::lane::LaneReader;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::message::Message;
use crate::pipeline::stats::PipelineStats;
use crate::store::{NewRow, StoreConnector};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Drain the persistence lane into the store.
///
/// Connects and migrates before touching the queue, then signals `ready`.
/// Each message is committed on its own, in lane order. Any store failure
/// ends the worker with that error.
pub async fn run_persistence(
    mut reader: LaneReader<Message>,
    connector: Box<dyn StoreConnector>,
    ready: oneshot::Sender<()>,
    stats: Arc<PipelineStats>,
) -> PipelineResult<()> {
    let mut store = connector.connect().await?;
    store.migrate().await?;
    let _ = ready.send(());
    log::debug!("Lane '{}': store migrated, accepting messages", reader.lane());

    let mut batch = Vec::new();
    while reader.next_batch(&mut batch).await {
        for message in batch.drain(..) {
            let row = store.append(NewRow::from(&message)).await?;
            stats.record_persisted();
            log::trace!("Lane '{}': committed row {}", reader.lane(), row.id);
        }
    }
    Ok(())
}
