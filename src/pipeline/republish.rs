//! Republish lane worker

use crate::broker::Outbound;
use crate::lane::LaneReader;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::message::Message;
use crate::pipeline::stats::PipelineStats;
use std::sync::Arc;

/// Drain the republish lane onto `topic`, in lane order.
///
/// `topic` is the topic the pipeline consumes, so every republished message
/// comes back for another classification. A failed send ends the worker.
pub async fn run_republish(
    mut reader: LaneReader<Message>,
    outbound: Outbound,
    topic: String,
    stats: Arc<PipelineStats>,
) -> PipelineResult<()> {
    let mut batch = Vec::new();
    while reader.next_batch(&mut batch).await {
        for message in batch.drain(..) {
            outbound.send(&topic, message).await?;
            stats.record_republished();
            log::trace!("Lane '{}': republished to '{}'", reader.lane(), topic);
        }
    }
    Ok(())
}
