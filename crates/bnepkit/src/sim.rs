//! Two engines joined by an in-memory link.
//!
//! [`Link`] plays the L2CAP layer for both sides: it drains each engine's
//! [`MemoryTransport`] and turns the recorded calls into the lifecycle
//! records and packets the other side would see. Credit is always
//! available, so every can-send-now request is answered immediately.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use bnepkit_frame::{decode_packet, BnepPacket, EthernetFrame};
use bnepkit_peer::{
    handler, Bnep, BnepEvent, EngineConfig, ManualTimers, Packet, PacketHandler, Result,
};
use bnepkit_transport::{BdAddr, L2capEvent, L2capTransport, MemoryTransport, TransportAction};
use serde::Serialize;
use tracing::{debug, warn};

pub type SimEngine = Bnep<MemoryTransport, ManualTimers>;

/// Connection handle reported for every simulated channel.
pub const SIM_CON_HANDLE: u16 = 0x0040;

/// Channel-opened status for a declined or unreachable channel.
pub const STATUS_REFUSED: u8 = 0x04;

const FIRST_CID: u16 = 0x0040;
const MAX_ROUNDS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn peer(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("a"),
            Side::B => f.write_str("b"),
        }
    }
}

/// Something that happened on the link, in order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// A BNEP packet written by `from` on its channel `cid`.
    Packet {
        from: Side,
        cid: u16,
        #[serde(serialize_with = "bnepkit_frame::hex::serialize")]
        bytes: Vec<u8>,
        decoded: Option<BnepPacket>,
    },
    /// A notification record delivered to `side`'s handler.
    Notification { side: Side, event: BnepEvent },
    /// An Ethernet frame delivered to `side`'s handler.
    Frame {
        side: Side,
        cid: u16,
        frame: EthernetFrame,
    },
}

struct Opening {
    psm: u16,
    initiator_cid: u16,
}

pub struct Link {
    a: SimEngine,
    b: SimEngine,
    /// `(side, local cid)` to the other side's cid.
    routes: HashMap<(Side, u16), u16>,
    /// Incoming channels not yet accepted, keyed by the acceptor.
    opening: HashMap<(Side, u16), Opening>,
    next_cid: u16,
    log: Arc<Mutex<Vec<Observation>>>,
}

impl Link {
    pub fn new(a_addr: BdAddr, b_addr: BdAddr) -> Self {
        Self::with_config(a_addr, b_addr, EngineConfig::default())
    }

    pub fn with_config(a_addr: BdAddr, b_addr: BdAddr, config: EngineConfig) -> Self {
        Self {
            a: Bnep::with_config(
                MemoryTransport::new(a_addr),
                ManualTimers::new(),
                config.clone(),
            ),
            b: Bnep::with_config(MemoryTransport::new(b_addr), ManualTimers::new(), config),
            routes: HashMap::new(),
            opening: HashMap::new(),
            next_cid: FIRST_CID,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn engine(&self, side: Side) -> &SimEngine {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn engine_mut(&mut self, side: Side) -> &mut SimEngine {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }

    pub fn addr(&self, side: Side) -> BdAddr {
        self.engine(side).local_addr()
    }

    /// The connected channel `side` holds towards the other side.
    pub fn cid(&self, side: Side) -> Option<u16> {
        self.engine(side)
            .channel_for_addr(&self.addr(side.peer()))
            .filter(|channel| channel.is_connected())
            .and_then(|channel| channel.cid())
    }

    /// Handler that records what `side`'s application receives.
    pub fn recorder(&self, side: Side) -> PacketHandler {
        let log = Arc::clone(&self.log);
        handler(move |packet| {
            let observation = match packet {
                Packet::Event(record) => match BnepEvent::parse(record) {
                    Some(event) => Observation::Notification { side, event },
                    None => return,
                },
                Packet::Data { cid, frame } => Observation::Frame {
                    side,
                    cid,
                    frame: frame.clone(),
                },
            };
            if let Ok(mut log) = log.lock() {
                log.push(observation);
            }
        })
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn take_observations(&self) -> Vec<Observation> {
        self.log
            .lock()
            .map(|mut log| std::mem::take(&mut *log))
            .unwrap_or_default()
    }

    /// Deliver queued transport calls until both sides are idle. Returns the
    /// number of calls delivered.
    pub fn pump(&mut self) -> Result<usize> {
        let mut delivered = 0;
        for _ in 0..MAX_ROUNDS {
            let mut idle = true;
            for side in [Side::A, Side::B] {
                let actions = self.engine_mut(side).transport_mut().take_actions();
                for action in actions {
                    idle = false;
                    delivered += 1;
                    self.deliver(side, action)?;
                }
            }
            if idle {
                return Ok(delivered);
            }
        }
        warn!(delivered, "link did not settle");
        Ok(delivered)
    }

    fn deliver(&mut self, side: Side, action: TransportAction) -> Result<()> {
        let peer = side.peer();
        match action {
            TransportAction::Register { psm, .. } => debug!(%side, psm, "psm registered"),
            TransportAction::Unregister { psm } => debug!(%side, psm, "psm unregistered"),
            TransportAction::Create { addr, psm, mtu } => {
                let local_cid = self.allocate_cid();
                if addr != self.addr(peer) {
                    debug!(%side, %addr, "no device at address");
                    let record = L2capEvent::ChannelOpened {
                        status: STATUS_REFUSED,
                        addr,
                        handle: 0,
                        psm,
                        local_cid,
                        remote_cid: 0,
                        local_mtu: mtu,
                        remote_mtu: 0,
                    };
                    return self.send_event(side, record);
                }
                let remote_cid = self.allocate_cid();
                self.routes.insert((side, local_cid), remote_cid);
                self.routes.insert((peer, remote_cid), local_cid);
                self.opening.insert(
                    (peer, remote_cid),
                    Opening {
                        psm,
                        initiator_cid: local_cid,
                    },
                );
                let record = L2capEvent::IncomingConnection {
                    addr: self.addr(side),
                    handle: SIM_CON_HANDLE,
                    psm,
                    local_cid: remote_cid,
                    remote_cid: local_cid,
                };
                self.send_event(peer, record)?;
            }
            TransportAction::Accept { cid } => {
                let Some(opening) = self.opening.remove(&(side, cid)) else {
                    warn!(%side, cid, "accept without a pending connection");
                    return Ok(());
                };
                let mtu = self.link_mtu();
                for (target, local_cid, remote_cid) in [
                    (side, cid, opening.initiator_cid),
                    (peer, opening.initiator_cid, cid),
                ] {
                    let record = L2capEvent::ChannelOpened {
                        status: 0,
                        addr: self.addr(target.peer()),
                        handle: SIM_CON_HANDLE,
                        psm: opening.psm,
                        local_cid,
                        remote_cid,
                        local_mtu: mtu,
                        remote_mtu: mtu,
                    };
                    self.send_event(target, record)?;
                }
            }
            TransportAction::Decline { cid } => {
                let Some(opening) = self.opening.remove(&(side, cid)) else {
                    return Ok(());
                };
                self.routes.remove(&(side, cid));
                self.routes.remove(&(peer, opening.initiator_cid));
                let record = L2capEvent::ChannelOpened {
                    status: STATUS_REFUSED,
                    addr: self.addr(side),
                    handle: SIM_CON_HANDLE,
                    psm: opening.psm,
                    local_cid: opening.initiator_cid,
                    remote_cid: cid,
                    local_mtu: 0,
                    remote_mtu: 0,
                };
                self.send_event(peer, record)?;
            }
            TransportAction::Disconnect { cid } => {
                self.send_event(side, L2capEvent::ChannelClosed { local_cid: cid })?;
                if let Some(remote_cid) = self.routes.remove(&(side, cid)) {
                    self.routes.remove(&(peer, remote_cid));
                    self.send_event(
                        peer,
                        L2capEvent::ChannelClosed {
                            local_cid: remote_cid,
                        },
                    )?;
                }
            }
            TransportAction::RequestCanSendNow { cid } => {
                self.send_event(side, L2capEvent::CanSendNow { local_cid: cid })?;
            }
            TransportAction::Sent { cid, bytes } => {
                self.record(Observation::Packet {
                    from: side,
                    cid,
                    decoded: decode_packet(&bytes).ok(),
                    bytes: bytes.clone(),
                });
                let route = self.routes.get(&(side, cid)).copied();
                match route {
                    Some(remote_cid) => self.engine_mut(peer).handle_data(remote_cid, &bytes)?,
                    None => warn!(%side, cid, "packet on unrouted channel dropped"),
                }
            }
        }
        Ok(())
    }

    fn send_event(&mut self, side: Side, event: L2capEvent) -> Result<()> {
        self.engine_mut(side).handle_event(&event.to_record())?;
        Ok(())
    }

    fn allocate_cid(&mut self) -> u16 {
        let cid = self.next_cid;
        self.next_cid = self.next_cid.wrapping_add(1).max(FIRST_CID);
        cid
    }

    fn link_mtu(&self) -> u16 {
        self.a
            .transport()
            .max_mtu()
            .min(self.b.transport().max_mtu())
    }

    fn record(&self, observation: Observation) {
        if let Ok(mut log) = self.log.lock() {
            log.push(observation);
        }
    }
}
