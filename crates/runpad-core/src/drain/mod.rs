//! Drain loop: the periodic single consumer that flushes the relay into the log sink.
use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{relay::RelayReceiver, sink::LogSink};

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct DrainLoop;

impl DrainLoop {
    /// Run the loop on the current runtime until `shutdown` is cancelled.
    ///
    /// Every `period` it forwards whatever the relay holds to `sink`. On shutdown it
    /// performs one last drain and hands the sink back.
    pub fn spawn<S: LogSink>(
        mut receiver: RelayReceiver,
        mut sink: S,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<S> {
        let period = period.max(MIN_PERIOD);

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(target: "runpad.core.drain", period_ms = period.as_millis() as u64, "drain loop started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        Self::drain_once(&mut receiver, &mut sink);
                    }
                }
            }

            let n = Self::drain_once(&mut receiver, &mut sink);
            debug!(target: "runpad.core.drain", last = n, "drain loop stopped");
            sink
        })
    }

    /// Forward everything currently queued. Returns the number of messages forwarded.
    pub fn drain_once<S: LogSink>(receiver: &mut RelayReceiver, sink: &mut S) -> usize {
        let batch = receiver.drain();
        if batch.is_empty() {
            return 0;
        }
        for msg in &batch {
            sink.append(&msg.to_string());
        }
        sink.flush();
        trace!(target: "runpad.core.drain", count = batch.len(), "drained");
        batch.len()
    }
}
