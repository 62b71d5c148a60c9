use crate::error::{GearmanError, Result};
use crate::protocol::{Packet, PacketKind};
use crate::task::Task;
use crate::taskset::tracker::{HandleKey, ProgressTracker};

/// Route one packet read from `server` to the tasks it concerns.
///
/// Never touches the network. Tasks whose failure handler asked for another
/// attempt are handed back; the caller resubmits them.
pub fn dispatch<T: Task>(
    awaiting: &mut Option<T>,
    tracker: &mut ProgressTracker<T>,
    server: &str,
    packet: &Packet,
) -> Result<Vec<T>> {
    let mut retries = Vec::new();

    match packet.kind {
        PacketKind::JobCreated => {
            let handle = packet.handle()?;
            let mut task = awaiting.take().ok_or_else(|| {
                GearmanError::Protocol(format!(
                    "job created {} on {} with no submission pending",
                    handle, server
                ))
            })?;
            task.handle_created(handle);
            if task.is_background() {
                tracker.finish(task);
            } else {
                tracker.track(HandleKey::new(server, handle), task);
            }
        }
        PacketKind::WorkComplete => {
            let (handle, result) = packet.handle_and_body()?;
            for mut task in tracker.take(&HandleKey::new(server, handle))? {
                task.handle_completion(result);
                tracker.finish(task);
            }
        }
        PacketKind::WorkFail => {
            let handle = packet.handle()?;
            for mut task in tracker.take(&HandleKey::new(server, handle))? {
                if task.handle_failure() {
                    retries.push(task);
                } else {
                    tracker.finish(task);
                }
            }
        }
        PacketKind::WorkException => {
            let (handle, message) = packet.handle_and_body()?;
            for task in tracker.bucket_mut(&HandleKey::new(server, handle))? {
                task.handle_exception(message);
            }
        }
        PacketKind::WorkStatus => {
            let (handle, numerator, denominator) = packet.status()?;
            for task in tracker.bucket_mut(&HandleKey::new(server, handle))? {
                task.handle_status(numerator, denominator);
            }
        }
        PacketKind::WorkWarning => {
            let (handle, message) = packet.handle_and_body()?;
            for task in tracker.bucket_mut(&HandleKey::new(server, handle))? {
                task.handle_warning(message);
            }
        }
        PacketKind::WorkData => {
            let (handle, data) = packet.handle_and_body()?;
            let bucket = tracker
                .bucket_mut(&HandleKey::new(server, handle))
                .map_err(|_| {
                    GearmanError::Protocol(format!(
                        "work data for unknown handle {} on {}",
                        handle, server
                    ))
                })?;
            for task in bucket {
                task.handle_data(data);
            }
        }
        PacketKind::Error => {
            let args = packet.args(2);
            tracing::warn!(
                server,
                code = %String::from_utf8_lossy(args.first().copied().unwrap_or_default()),
                message = %String::from_utf8_lossy(args.get(1).copied().unwrap_or_default()),
                "Job server reported an error"
            );
        }
        other => {
            tracing::debug!(server, kind = ?other, "Ignoring packet");
        }
    }

    Ok(retries)
}
