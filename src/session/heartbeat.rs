//! Connection liveness monitoring
//!
//! A background task keeps the transport alive and notices silent peer
//! death: every interval it checks whether the previous heartbeat was
//! acknowledged, warns if not, and sends the next one. A failed send
//! means the transport is dead; the monitor exits and leaves the verdict
//! to the dispatch loop, which observes the failure independently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use super::frames::Outbound;
use crate::transport::SharedSink;

/// Bounded wait when joining the monitor task
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared "last heartbeat acknowledged" cell
///
/// The only state shared between the monitor and the frame handler.
/// The contract is two operations: the frame handler calls
/// [`mark_acked`](AckFlag::mark_acked) when a `heartbeat_ack` arrives;
/// the monitor calls [`begin_beat`](AckFlag::begin_beat) once per
/// interval, which atomically clears the flag and reports whether the
/// previous beat was ever acknowledged. There are no other access paths.
pub struct AckFlag(AtomicBool);

impl AckFlag {
    /// New flag, initially acknowledged (no beat outstanding)
    pub fn new() -> Self {
        AckFlag(AtomicBool::new(true))
    }

    /// Record an acknowledgment from the peer
    pub fn mark_acked(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Start a new beat; returns whether the previous one was acked
    pub fn begin_beat(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for AckFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Background keep-alive for an active session
pub struct LivenessMonitor {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl LivenessMonitor {
    /// Spawn the monitor task
    ///
    /// Runs until stopped or until a send fails. Writes go through the
    /// shared sink mutex, so heartbeats and protocol replies never
    /// interleave on the wire.
    pub fn spawn(sink: SharedSink, period: Duration, ack: Arc<AckFlag>) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // A fresh interval yields its first tick immediately; the
            // first heartbeat belongs one full period after `hello`
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        if !ack.begin_beat() {
                            warn!("missed heartbeat ack");
                        }
                        let frame = match Outbound::Heartbeat.encode() {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!("heartbeat encode error: {e}");
                                break;
                            }
                        };
                        let mut sink = sink.lock().await;
                        if let Err(e) = sink.send(frame).await {
                            debug!("heartbeat send error: {e}");
                            break;
                        }
                    }
                }
            }
        });

        LivenessMonitor { handle, stop }
    }

    /// Signal the task and join it with a bounded wait
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        if timeout(JOIN_TIMEOUT, &mut self.handle).await.is_err() {
            warn!("liveness monitor did not stop in time, aborting");
            self.handle.abort();
        }
    }
}
