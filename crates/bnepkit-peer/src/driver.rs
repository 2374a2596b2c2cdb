//! Runs a [`Bnep`] engine on a single tokio task.
//!
//! All inputs (lifecycle records, received packets, application calls) are
//! serialized through one queue, and handshake timers fire from the same
//! task, so the engine never needs a lock.

use std::future;

use bnepkit_transport::L2capTransport;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::Bnep;
use crate::error::{PeerError, Result};
use crate::timer::DeadlineTimers;

/// Default input queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

type Call<T> = Box<dyn FnOnce(&mut Bnep<T, DeadlineTimers>) + Send>;

enum Input<T> {
    Event(Vec<u8>),
    Data { cid: u16, packet: Vec<u8> },
    Call(Call<T>),
}

/// Owns the engine and its input queue. Consume it with [`run`](Self::run).
pub struct EngineDriver<T> {
    engine: Bnep<T, DeadlineTimers>,
    inputs: mpsc::Receiver<Input<T>>,
    cancel: CancellationToken,
}

/// Cloneable sender side of an [`EngineDriver`].
pub struct DriverHandle<T> {
    inputs: mpsc::Sender<Input<T>>,
    cancel: CancellationToken,
}

impl<T> Clone for DriverHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inputs: self.inputs.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

fn runtime_now() -> std::time::Instant {
    Instant::now().into_std()
}

impl<T> EngineDriver<T>
where
    T: L2capTransport + Send + 'static,
{
    pub fn new(transport: T, config: EngineConfig) -> (Self, DriverHandle<T>) {
        Self::with_capacity(transport, config, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(
        transport: T,
        config: EngineConfig,
        capacity: usize,
    ) -> (Self, DriverHandle<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        // Deadlines follow the runtime clock so paused-time tests work.
        let timers = DeadlineTimers::with_clock(runtime_now);
        let driver = Self {
            engine: Bnep::with_config(transport, timers, config),
            inputs: rx,
            cancel: cancel.clone(),
        };
        (driver, DriverHandle { inputs: tx, cancel })
    }

    /// Process inputs and timers until cancelled or every handle is dropped.
    /// Returns the engine for inspection.
    pub async fn run(mut self) -> Bnep<T, DeadlineTimers> {
        info!("engine driver started");
        loop {
            let deadline = self
                .engine
                .timers()
                .next_deadline()
                .map(Instant::from_std);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                input = self.inputs.recv() => match input {
                    Some(input) => self.apply(input),
                    None => break,
                },
                _ = expiry(deadline) => self.fire_timers(),
            }
        }
        info!("engine driver stopped");
        self.engine
    }

    fn apply(&mut self, input: Input<T>) {
        match input {
            Input::Event(record) => {
                if let Err(err) = self.engine.handle_event(&record) {
                    warn!(error = %err, "failed to handle event record");
                }
            }
            Input::Data { cid, packet } => {
                if let Err(err) = self.engine.handle_data(cid, &packet) {
                    warn!(cid, error = %err, "failed to handle packet");
                }
            }
            Input::Call(call) => call(&mut self.engine),
        }
    }

    fn fire_timers(&mut self) {
        for cid in self.engine.timers_mut().take_expired_now() {
            debug!(cid, "handshake timer fired");
            self.engine.handle_timeout(cid);
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

impl<T> DriverHandle<T>
where
    T: L2capTransport + Send + 'static,
{
    /// Queue an L2CAP lifecycle record.
    pub async fn event(&self, record: Vec<u8>) -> Result<()> {
        self.send(Input::Event(record)).await
    }

    /// Queue a packet received on `cid`.
    pub async fn data(&self, cid: u16, packet: Vec<u8>) -> Result<()> {
        self.send(Input::Data { cid, packet }).await
    }

    /// Run `f` against the engine on the driver task and return its result.
    pub async fn with_engine<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Bnep<T, DeadlineTimers>) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(Input::Call(Box::new(move |engine| {
            let _ = tx.send(f(engine));
        })))
        .await?;
        rx.await.map_err(|_| PeerError::DriverStopped)
    }

    /// Stop the driver. Queued inputs are dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn send(&self, input: Input<T>) -> Result<()> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| PeerError::DriverStopped)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bnepkit_transport::{BdAddr, L2capEvent, MemoryTransport, TransportAction, PSM_BNEP};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;
    use crate::events::{handler, BnepEvent, Packet, PacketHandler};

    const LOCAL: BdAddr = BdAddr::new([0x00, 0x1B, 0xDC, 0x00, 0x00, 0x01]);
    const PEER: BdAddr = BdAddr::new([0x00, 0x1B, 0xDC, 0x00, 0x00, 0x02]);
    const CID: u16 = 0x0041;

    fn event_sink() -> (PacketHandler, UnboundedReceiver<BnepEvent>) {
        let (tx, rx) = unbounded_channel();
        let h = handler(move |packet| {
            if let Packet::Event(record) = packet {
                if let Some(event) = BnepEvent::parse(record) {
                    let _ = tx.send(event);
                }
            }
        });
        (h, rx)
    }

    fn spawn() -> (
        DriverHandle<MemoryTransport>,
        tokio::task::JoinHandle<Bnep<MemoryTransport, DeadlineTimers>>,
    ) {
        let (driver, handle) =
            EngineDriver::new(MemoryTransport::new(LOCAL), EngineConfig::default());
        (handle, tokio::spawn(driver.run()))
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_channel_times_out() {
        let (handle, task) = spawn();
        handle
            .with_engine(|engine| engine.register_service(0x1116, 1500, handler(|_| {})))
            .await
            .expect("driver should run")
            .expect("service should register");

        let record = L2capEvent::IncomingConnection {
            addr: PEER,
            handle: 1,
            psm: PSM_BNEP,
            local_cid: CID,
            remote_cid: 0x50,
        }
        .to_record();
        handle
            .event(record)
            .await
            .expect("driver should accept input");
        let open = handle
            .with_engine(|engine| engine.channels().len())
            .await
            .unwrap();
        assert_eq!(open, 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        let (open, actions) = handle
            .with_engine(|engine| {
                (
                    engine.channels().len(),
                    engine.transport().actions().to_vec(),
                )
            })
            .await
            .unwrap();
        assert_eq!(open, 0);
        assert!(actions.contains(&TransportAction::Disconnect { cid: CID }));

        handle.shutdown();
        task.await.expect("driver task should finish");
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_retries_once_then_times_out() {
        let (handle, task) = spawn();
        let (sink, mut events) = event_sink();
        handle
            .with_engine(move |engine| engine.connect(PEER, PSM_BNEP, 0x1115, 0x1116, sink))
            .await
            .unwrap()
            .expect("connect should start");

        let opened = L2capEvent::ChannelOpened {
            status: 0,
            addr: PEER,
            handle: 1,
            psm: PSM_BNEP,
            local_cid: CID,
            remote_cid: 0x50,
            local_mtu: 1691,
            remote_mtu: 1691,
        }
        .to_record();
        handle.event(opened).await.unwrap();
        handle
            .event(L2capEvent::CanSendNow { local_cid: CID }.to_record())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10) + Duration::from_millis(500)).await;
        let retries = handle
            .with_engine(|engine| engine.channel(CID).map(|c| c.retry_count()))
            .await
            .unwrap();
        assert_eq!(retries, Some(1));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let event = events.recv().await.expect("timeout should be reported");
        assert!(matches!(
            event,
            BnepEvent::ChannelTimeout {
                cid: CID,
                state: 3,
                ..
            }
        ));

        handle.shutdown();
        let engine = task.await.unwrap();
        assert!(engine.channels().is_empty());
    }

    #[tokio::test]
    async fn stopped_driver_rejects_input() {
        let (handle, task) = spawn();
        handle.shutdown();
        task.await.unwrap();
        assert!(matches!(
            handle.event(vec![0x71, 2, 0x41, 0]).await,
            Err(PeerError::DriverStopped)
        ));
        assert!(matches!(
            handle.with_engine(|engine| engine.channels().len()).await,
            Err(PeerError::DriverStopped)
        ));
    }
}
