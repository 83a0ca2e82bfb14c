//! PushFleet - per-vehicle push workers for parallel tick fan-out.

use contracts::{Command, Tick, VehicleIndex, TICK_ID_INVALID};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::PushClient;

struct PushJob {
    tick: Tick,
    /// Set for acknowledged sends (scenario end); the worker reports the
    /// push result back through it.
    ack: Option<oneshot::Sender<bool>>,
}

/// Handle to one vehicle's push worker.
///
/// The worker owns the vehicle's [`PushClient`] and drains a bounded queue,
/// so concurrent fan-outs to the same vehicle stay ordered while different
/// vehicles push in parallel.
pub struct PushHandle {
    index: VehicleIndex,
    connection: String,
    tx: mpsc::Sender<PushJob>,
    worker: JoinHandle<()>,
}

impl PushHandle {
    /// Spawn the worker task for one vehicle.
    pub fn spawn(index: VehicleIndex, connection: impl Into<String>, queue_capacity: usize) -> Self {
        let connection = connection.into();
        let (tx, rx) = mpsc::channel(queue_capacity);

        let client = PushClient::new(connection.clone());
        let worker = tokio::spawn(push_worker(index, client, rx));

        Self {
            index,
            connection,
            tx,
            worker,
        }
    }

    pub fn index(&self) -> VehicleIndex {
        self.index
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Enqueue a tick push without waiting (fan-out path).
    ///
    /// Returns false if the queue is full; the tick is dropped and the
    /// vehicle will observe the gap on the next push.
    pub fn try_send(&self, tick: Tick) -> bool {
        match self.tx.try_send(PushJob { tick, ack: None }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    index = self.index,
                    tick_id = job.tick.tick_id,
                    "push queue full, tick dropped"
                );
                metrics::counter!("fleet_coord_push_queue_drops_total").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(index = self.index, "push worker closed unexpectedly");
                false
            }
        }
    }

    /// Enqueue a push and wait for the worker to complete it (END path).
    pub async fn send_acked(&self, tick: Tick) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        let job = PushJob {
            tick,
            ack: Some(ack_tx),
        };

        if self.tx.send(job).await.is_err() {
            error!(index = self.index, "push worker closed unexpectedly");
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    /// Stop the worker after draining its queue.
    #[instrument(name = "push_handle_shutdown", skip(self), fields(index = self.index))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(index = self.index, error = ?e, "push worker panicked");
        }
        debug!(index = self.index, "push worker stopped");
    }
}

/// Worker loop: drain jobs, push, report acks.
async fn push_worker(
    index: VehicleIndex,
    mut client: PushClient,
    mut rx: mpsc::Receiver<PushJob>,
) {
    debug!(index, peer = %client.connection(), "push worker started");

    while let Some(job) = rx.recv().await {
        let ok = client.push_tick(&job.tick).await;
        if let Some(ack) = job.ack {
            let _ = ack.send(ok);
        }
    }

    debug!(index, "push worker exiting");
}

/// The coordinator's collection of vehicle push workers for one scenario.
pub struct PushFleet {
    handles: Vec<PushHandle>,
    queue_capacity: usize,
}

impl PushFleet {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            handles: Vec::new(),
            queue_capacity,
        }
    }

    /// Register the push worker for a newly assigned vehicle.
    pub fn add(&mut self, index: VehicleIndex, connection: impl Into<String>) {
        self.handles
            .push(PushHandle::spawn(index, connection, self.queue_capacity));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Fan a tick out to every vehicle; returns immediately once every
    /// worker has the job queued.
    #[instrument(name = "fleet_broadcast", skip(self, tick), fields(tick_id = tick.tick_id, vehicles = self.handles.len()))]
    pub fn broadcast(&self, tick: &Tick) {
        for handle in &self.handles {
            handle.try_send(*tick);
        }
    }

    /// Push END to every vehicle, one at a time in registration order,
    /// waiting for each attempt so shutdown cannot race server teardown.
    #[instrument(name = "fleet_broadcast_end", skip(self), fields(vehicles = self.handles.len()))]
    pub async fn broadcast_end(&self) {
        let end = Tick::new(TICK_ID_INVALID, Command::End, 0);
        for handle in &self.handles {
            let ok = handle.send_acked(end).await;
            if !ok {
                warn!(index = handle.index(), "END push failed");
            }
        }
    }

    /// Shut every worker down (scenario restart).
    pub async fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            handle.shutdown().await;
        }
    }
}
