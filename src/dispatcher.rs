//! Receive task: polls the transport and fans frames out

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::rules::ResponseRuleEngine;
use crate::session::SessionCore;
use crate::types::ConnectionState;
use crate::{BusError, Result};

/// Handle to a running receive task.
pub(crate) struct ReceiveDispatcher {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReceiveDispatcher {
    /// Spawn the receive task for a freshly connected session.
    pub(crate) fn spawn(
        core: Arc<SessionCore>,
        rules: Arc<ResponseRuleEngine>,
        config: &SessionConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::receive_task(core, rules, config.clone(), cancel.clone()));
        Self { cancel, task }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to stop and wait up to `timeout` for it to exit.
    ///
    /// A task that overstays is aborted and reported as
    /// [`BusError::ShutdownTimeout`]; a task that panicked is reported as
    /// [`BusError::ReceiveTaskFailed`].
    pub(crate) async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();
        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_error)) => {
                Err(BusError::ReceiveTaskFailed { details: join_error.to_string() })
            }
            Err(_) => {
                task.abort();
                Err(BusError::ShutdownTimeout { duration: timeout })
            }
        }
    }

    async fn receive_task(
        core: Arc<SessionCore>,
        rules: Arc<ResponseRuleEngine>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) {
        info!("Receive task started");
        let poll_timeout = config.poll_timeout();
        let mut frame_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = core.transport().receive(poll_timeout) => result,
            };

            match result {
                Ok(Some(frame)) => {
                    error_count = 0;
                    if core.is_paused() {
                        trace!(id = frame.id, "Reception paused, frame dropped");
                        continue;
                    }

                    frame_count += 1;
                    core.record_received(frame.clone());

                    // Responses run inline so delays hold back later frames
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!(id = frame.id, "Receive task cancelled while responding");
                            break;
                        }
                        fired = rules.respond(&core, &frame) => {
                            if fired > 0 {
                                trace!(id = frame.id, fired, "Auto-responses sent");
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(source) => {
                    if cancel.is_cancelled() || core.state() == ConnectionState::Disconnecting {
                        debug!("Receive fault during shutdown ignored: {source}");
                        break;
                    }

                    error_count = error_count.saturating_add(1);
                    core.record_receive_error(source);

                    let backoff = config.error_backoff(error_count);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!("Receive task stopped (processed {} frames)", frame_count);
    }
}
