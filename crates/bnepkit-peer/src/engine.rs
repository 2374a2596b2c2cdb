use std::mem;
use std::time::Duration;

use bnepkit_frame::{
    decode_packet, encode_control_packet, encode_ethernet, max_frame_size_for_mtu, ControlError,
    ControlMessage, EthernetFrame, FrameError, MulticastRange, NetTypeRange, PacketBody,
    VLAN_TAG_LEN,
};
use bnepkit_transport::{BdAddr, L2capEvent, L2capTransport, PSM_BNEP};
use bytes::BytesMut;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelState};
use crate::config::EngineConfig;
use crate::error::{PeerError, Result};
use crate::events::{BnepEvent, Packet, PacketHandler};
use crate::handshake::evaluate_setup_request;
use crate::pending::PendingAction;
use crate::registry::{ChannelTable, ServiceRegistry};
use crate::timer::TimerService;

/// Outcome of [`Bnep::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// The frame was written. For a filtered 802.1Q frame only the tag was.
    Sent,
    /// The peer's filters rejected the frame and nothing was written.
    Filtered,
}

/// A BNEP protocol engine.
///
/// Single-threaded and callback-driven: all state changes happen inside
/// the `handle_*` entry points or an application call.
pub struct Bnep<T, S> {
    transport: T,
    timers: S,
    config: EngineConfig,
    services: ServiceRegistry,
    channels: ChannelTable,
}

impl<T: L2capTransport, S: TimerService> Bnep<T, S> {
    pub fn new(transport: T, timers: S) -> Self {
        Self::with_config(transport, timers, EngineConfig::default())
    }

    pub fn with_config(transport: T, timers: S, config: EngineConfig) -> Self {
        Self {
            transport,
            timers,
            channels: ChannelTable::new(config.max_channels),
            services: ServiceRegistry::new(),
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn timers(&self) -> &S {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut S {
        &mut self.timers
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn local_addr(&self) -> BdAddr {
        self.transport.local_addr()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn channel(&self, cid: u16) -> Option<&Channel> {
        self.channels.by_cid(cid)
    }

    pub fn channel_for_addr(&self, addr: &BdAddr) -> Option<&Channel> {
        self.channels.by_addr(addr)
    }

    /// Register a PAN role. The first registration also registers the BNEP
    /// PSM with the transport.
    pub fn register_service(
        &mut self,
        uuid: u16,
        max_frame_size: u16,
        handler: PacketHandler,
    ) -> Result<()> {
        let first = self.services.is_empty();
        self.services.register(uuid, max_frame_size, handler)?;
        if first {
            if let Err(err) = self
                .transport
                .register_service(PSM_BNEP, self.config.service_mtu)
            {
                self.services.unregister(uuid);
                return Err(err.into());
            }
        }
        info!(uuid, max_frame_size, "service registered");
        Ok(())
    }

    /// Remove a PAN role. Removing the last one unregisters the PSM.
    pub fn unregister_service(&mut self, uuid: u16) -> bool {
        if !self.services.unregister(uuid) {
            return false;
        }
        info!(uuid, "service unregistered");
        if self.services.is_empty() {
            self.transport.unregister_service(PSM_BNEP);
        }
        true
    }

    /// Open a channel to `addr`. The setup handshake starts once the
    /// transport reports the channel open.
    pub fn connect(
        &mut self,
        addr: BdAddr,
        psm: u16,
        source_uuid: u16,
        dest_uuid: u16,
        handler: PacketHandler,
    ) -> Result<()> {
        let mut channel = self.new_channel(addr, psm);
        channel.source_uuid = source_uuid;
        channel.dest_uuid = dest_uuid;
        channel.handler = Some(handler);
        self.channels.insert(channel)?;

        info!(%addr, psm, source_uuid, dest_uuid, "connecting");
        let mtu = self.transport.max_mtu();
        if let Err(err) = self.transport.create_channel(addr, psm, mtu) {
            self.channels.remove_by_addr(&addr);
            return Err(err.into());
        }
        Ok(())
    }

    /// Tear down the channel to `addr` and close its transport channel.
    pub fn disconnect(&mut self, addr: BdAddr) -> Result<()> {
        if self.channels.by_addr(&addr).is_none() {
            return Err(PeerError::UnknownPeer(addr));
        }
        info!(%addr, "disconnecting");
        self.finalize(addr, true);
        Ok(())
    }

    /// Send an Ethernet frame given as `dst(6) src(6) type(2) payload`.
    pub fn send(&mut self, cid: u16, frame: &[u8]) -> Result<SendStatus> {
        self.check_sendable(cid)?;
        let frame = EthernetFrame::parse(frame)?;
        self.send_frame(cid, &frame)
    }

    /// Send an Ethernet frame through the peer's filters.
    pub fn send_frame(&mut self, cid: u16, frame: &EthernetFrame) -> Result<SendStatus> {
        let channel = self.check_sendable(cid)?;

        let Some(protocol) = frame.filter_protocol() else {
            debug!(cid, "omitting 802.1Q frame without inner protocol type");
            return Ok(SendStatus::Filtered);
        };
        let admitted = channel.net_filter.admits(&protocol)
            && channel.multicast_filter.admits_destination(&frame.dst);

        let truncated;
        let outgoing = if admitted {
            frame
        } else if frame.is_vlan_tagged() {
            truncated = frame.truncated(VLAN_TAG_LEN);
            &truncated
        } else {
            debug!(cid, protocol, dst = %frame.dst, "frame filtered");
            return Ok(SendStatus::Filtered);
        };

        if outgoing.payload.len() > channel.max_frame_size as usize {
            return Err(PeerError::DataLenExceedsMtu {
                len: outgoing.payload.len(),
                max: channel.max_frame_size,
            });
        }

        let mut buf = BytesMut::new();
        encode_ethernet(outgoing, channel.local_addr, channel.remote_addr, &mut buf);
        self.transport.send_prepared(cid, &buf)?;
        Ok(SendStatus::Sent)
    }

    fn check_sendable(&self, cid: u16) -> Result<&Channel> {
        let channel = self
            .channels
            .by_cid(cid)
            .ok_or(PeerError::UnknownChannel(cid))?;
        if !channel.is_connected() {
            return Err(PeerError::NotConnected(cid));
        }
        if !self.transport.can_send_now(cid) {
            return Err(PeerError::NoCredit(cid));
        }
        Ok(channel)
    }

    /// Queue a protocol-type filter-set message for the peer.
    pub fn set_net_filter(&mut self, cid: u16, ranges: &[NetTypeRange]) -> Result<()> {
        let max = self.config.max_net_filter_out;
        let channel = self.connected_channel_mut(cid)?;
        if ranges.len() > max {
            return Err(PeerError::TooManyFilters {
                len: ranges.len(),
                max,
            });
        }
        channel.net_filter_out = ranges.to_vec();
        channel.pending.insert(PendingAction::NetFilterSet);
        self.transport.request_can_send_now(cid);
        Ok(())
    }

    /// Queue a multicast filter-set message for the peer.
    pub fn set_multicast_filter(&mut self, cid: u16, ranges: &[MulticastRange]) -> Result<()> {
        let max = self.config.max_multicast_filter_out;
        let channel = self.connected_channel_mut(cid)?;
        if ranges.len() > max {
            return Err(PeerError::TooManyFilters {
                len: ranges.len(),
                max,
            });
        }
        channel.multicast_filter_out = ranges.to_vec();
        channel.pending.insert(PendingAction::MultiAddrSet);
        self.transport.request_can_send_now(cid);
        Ok(())
    }

    fn connected_channel_mut(&mut self, cid: u16) -> Result<&mut Channel> {
        let channel = self
            .channels
            .by_cid_mut(cid)
            .ok_or(PeerError::UnknownChannel(cid))?;
        if !channel.is_connected() {
            return Err(PeerError::NotConnected(cid));
        }
        Ok(channel)
    }

    pub fn can_send_now(&self, cid: u16) -> bool {
        self.channels.by_cid(cid).is_some() && self.transport.can_send_now(cid)
    }

    /// Ask for a can-send-now notification once queued control traffic
    /// has gone out.
    pub fn request_can_send_now(&mut self, cid: u16) -> Result<()> {
        let channel = self
            .channels
            .by_cid_mut(cid)
            .ok_or(PeerError::UnknownChannel(cid))?;
        channel.waiting_for_can_send_now = true;
        self.transport.request_can_send_now(cid);
        Ok(())
    }

    /// Feed an L2CAP lifecycle record. Returns false for records that do not
    /// concern this engine.
    pub fn handle_event(&mut self, record: &[u8]) -> Result<bool> {
        let Some(event) = L2capEvent::parse(record)? else {
            return Ok(false);
        };

        match event {
            L2capEvent::IncomingConnection {
                addr,
                handle,
                psm,
                local_cid,
                ..
            } => {
                if psm != PSM_BNEP {
                    return Ok(false);
                }
                self.on_incoming_connection(addr, handle, local_cid);
                Ok(true)
            }
            L2capEvent::ChannelOpened {
                status,
                addr,
                handle,
                psm,
                local_cid: cid,
                local_mtu: mtu,
                ..
            } => {
                let opened = self.on_channel_opened(status, addr, handle, psm, cid, mtu);
                Ok(opened)
            }
            L2capEvent::ChannelClosed { local_cid } => {
                let Some(channel) = self.channels.by_cid(local_cid) else {
                    return Ok(false);
                };
                if channel.state == ChannelState::Closed {
                    return Ok(false);
                }
                let addr = channel.remote_addr;
                info!(cid = local_cid, %addr, state = %channel.state, "transport channel closed");
                self.finalize(addr, false);
                Ok(true)
            }
            L2capEvent::CanSendNow { local_cid } => {
                if self.channels.by_cid(local_cid).is_none() {
                    return Ok(false);
                }
                self.handle_can_send_now(local_cid)?;
                Ok(true)
            }
        }
    }

    fn on_incoming_connection(&mut self, addr: BdAddr, handle: u16, cid: u16) {
        if self.services.is_empty() {
            warn!(cid, %addr, "declining connection: no service registered");
            self.transport.decline_connection(cid);
            return;
        }

        let channel = self.new_channel(addr, PSM_BNEP);
        let channel = match self.channels.insert(channel) {
            Ok(channel) => channel,
            Err(err) => {
                warn!(cid, %addr, error = %err, "declining connection");
                self.transport.decline_connection(cid);
                return;
            }
        };

        channel.cid = Some(cid);
        channel.con_handle = handle;
        channel.state = ChannelState::WaitForConnectionRequest;
        arm_timer(&mut self.timers, self.config.connection_timeout, channel);

        info!(cid, %addr, "accepting connection");
        self.transport.accept_connection(cid);
    }

    fn on_channel_opened(
        &mut self,
        status: u8,
        addr: BdAddr,
        handle: u16,
        psm: u16,
        cid: u16,
        local_mtu: u16,
    ) -> bool {
        let Some(channel) = self.channels.by_addr_mut(&addr) else {
            debug!(cid, %addr, "channel opened for unknown peer");
            return false;
        };
        if channel.psm != psm || channel.cid.is_some_and(|known| known != cid) {
            debug!(cid, %addr, psm, "channel opened for another service");
            return false;
        }

        if status != 0 {
            warn!(cid, %addr, status, "channel open failed");
            notify(channel, opened_event(channel, status));
            disarm_timer(&mut self.timers, channel);
            self.channels.remove_by_addr(&addr);
            return true;
        }

        match channel.state {
            ChannelState::Closed => {
                channel.cid = Some(cid);
                channel.con_handle = handle;
                channel.max_frame_size = max_frame_size_for_mtu(local_mtu);
                channel.state = ChannelState::WaitForConnectionResponse;
                arm_timer(&mut self.timers, self.config.connection_timeout, channel);
                channel.pending.insert(PendingAction::ConnectionRequest);
                info!(
                    cid,
                    %addr,
                    max_frame_size = channel.max_frame_size,
                    "channel open, sending setup request"
                );
                self.transport.request_can_send_now(cid);
            }
            ChannelState::WaitForConnectionRequest => {
                channel.max_frame_size = max_frame_size_for_mtu(local_mtu);
                debug!(cid, %addr, max_frame_size = channel.max_frame_size, "channel mtu known");
            }
            state => warn!(cid, %addr, %state, "channel opened in unexpected state"),
        }
        true
    }

    /// Feed a packet received on `cid`.
    ///
    /// Malformed packets are logged and dropped; control messages that fail
    /// validation are answered with command-not-understood.
    pub fn handle_data(&mut self, cid: u16, buf: &[u8]) -> Result<()> {
        let channel = self
            .channels
            .by_cid(cid)
            .ok_or(PeerError::UnknownChannel(cid))?;
        let addr = channel.remote_addr;
        let local = channel.local_addr;

        let packet = match decode_packet(buf) {
            Ok(packet) => packet,
            Err(FrameError::Control(err)) => {
                warn!(cid, %addr, error = %err, "control message not understood");
                self.reject_control(cid, err);
                return Ok(());
            }
            Err(err) => {
                debug!(cid, %addr, error = %err, "dropping malformed packet");
                return Ok(());
            }
        };

        if let PacketBody::Control(message) = &packet.body {
            self.dispatch_control(cid, message, false);
        }

        for extension in &packet.extensions {
            if self.channels.by_cid(cid).is_none() {
                return Ok(());
            }
            if !extension.is_control() {
                debug!(cid, ext_type = extension.ext_type, "dropping unknown extension");
                continue;
            }
            match ControlMessage::decode(&extension.data) {
                Ok((message, consumed)) => {
                    if consumed != extension.data.len() {
                        debug!(
                            cid,
                            consumed,
                            len = extension.data.len(),
                            "control extension length mismatch"
                        );
                    }
                    self.dispatch_control(cid, &message, true);
                }
                Err(err) => {
                    warn!(cid, error = %err, "invalid control extension");
                    self.reject_control(cid, err);
                }
            }
        }

        if let Some(frame) = packet.ethernet_frame(local, addr) {
            let Some(channel) = self.channels.by_cid(cid) else {
                return Ok(());
            };
            if channel.state != ChannelState::Connected {
                debug!(cid, state = %channel.state, "dropping data on unconnected channel");
                return Ok(());
            }
            if let Some(handler) = &channel.handler {
                handler(Packet::Data { cid, frame: &frame });
            }
        }
        Ok(())
    }

    fn reject_control(&mut self, cid: u16, err: ControlError) {
        let Some(channel) = self.channels.by_cid_mut(cid) else {
            return;
        };
        if let Some(control_type) = err.control_type() {
            channel.last_control_type = control_type;
        }
        channel.pending.insert(PendingAction::CommandNotUnderstood);
        self.transport.request_can_send_now(cid);
    }

    fn dispatch_control(&mut self, cid: u16, message: &ControlMessage, in_extension: bool) {
        let Some(channel) = self.channels.by_cid_mut(cid) else {
            return;
        };
        let control_type = message.control_type().as_u8();
        channel.last_control_type = control_type;
        let addr = channel.remote_addr;

        match message {
            ControlMessage::CommandNotUnderstood {
                control_type: rejected,
            } => {
                warn!(cid, %addr, rejected, "peer did not understand our command");
                self.finalize(addr, true);
            }
            ControlMessage::SetupConnectionRequest { .. }
            | ControlMessage::SetupConnectionResponse { .. }
                if in_extension =>
            {
                warn!(cid, control_type, "ignoring setup message in extension header");
            }
            ControlMessage::SetupConnectionRequest {
                uuid_size,
                dest_uuid: dest,
                source_uuid: source,
            } => {
                if !matches!(
                    channel.state,
                    ChannelState::WaitForConnectionRequest | ChannelState::Connected
                ) {
                    warn!(cid, state = %channel.state, "ignoring setup request");
                    return;
                }
                let services = &self.services;
                let registered = |role| services.lookup(role).is_some();
                let decision = evaluate_setup_request(*uuid_size, dest, source, registered);
                if let Some(uuid) = decision.dest_uuid {
                    channel.dest_uuid = uuid;
                }
                if let Some(uuid) = decision.source_uuid {
                    channel.source_uuid = uuid;
                }
                if let Some(service) = decision.service.and_then(|role| services.lookup(role)) {
                    channel.handler = Some(service.handler.clone());
                }
                info!(cid, %addr, code = %decision.code, "setup request received");
                channel.setup_response = decision.code;
                channel.pending.insert(PendingAction::ConnectionResponse);
                self.transport.request_can_send_now(cid);
            }
            ControlMessage::SetupConnectionResponse { code } => {
                if channel.state != ChannelState::WaitForConnectionResponse {
                    warn!(cid, state = %channel.state, "ignoring setup response");
                    return;
                }
                if code.is_success() {
                    channel.state = ChannelState::Connected;
                    disarm_timer(&mut self.timers, channel);
                    info!(cid, %addr, "channel connected");
                    notify(channel, opened_event(channel, 0));
                } else {
                    warn!(cid, %addr, %code, "setup rejected by peer");
                    let status = u8::try_from(code.0).unwrap_or(u8::MAX);
                    notify(channel, opened_event(channel, status));
                    self.finalize(addr, true);
                }
            }
            ControlMessage::FilterNetTypeSet { ranges } => {
                if !accepts_filter_messages(channel) {
                    debug!(cid, state = %channel.state, "ignoring net-type filter set");
                    return;
                }
                let policy = self.config.filter_policy;
                let code = channel.net_filter.rebuild(ranges, policy);
                info!(cid, ranges = ranges.len(), %code, "net-type filter set");
                channel.net_filter_response = code;
                channel.pending.insert(PendingAction::NetFilterResponse);
                self.transport.request_can_send_now(cid);
            }
            ControlMessage::FilterMultiAddrSet { ranges } => {
                if !accepts_filter_messages(channel) {
                    debug!(cid, state = %channel.state, "ignoring multicast filter set");
                    return;
                }
                let policy = self.config.filter_policy;
                let code = channel.multicast_filter.rebuild(ranges, policy);
                info!(cid, ranges = ranges.len(), %code, "multicast filter set");
                channel.multicast_filter_response = code;
                channel.pending.insert(PendingAction::MultiAddrResponse);
                self.transport.request_can_send_now(cid);
            }
            ControlMessage::FilterNetTypeResponse { code }
            | ControlMessage::FilterMultiAddrResponse { code } => {
                if !accepts_filter_messages(channel) {
                    debug!(cid, control_type, "ignoring filter response");
                } else if code.is_success() {
                    info!(cid, control_type, "filter accepted by peer");
                } else {
                    warn!(cid, control_type, %code, "filter rejected by peer");
                }
            }
        }
    }

    /// Spend one send credit on `cid`: transmit the highest-priority
    /// pending control message, or tell the application it may send.
    pub fn handle_can_send_now(&mut self, cid: u16) -> Result<()> {
        let Some(channel) = self.channels.by_cid_mut(cid) else {
            return Ok(());
        };

        let result = match channel.pending.pop() {
            Some(action) => self.perform(cid, action),
            None => {
                if channel.waiting_for_can_send_now {
                    channel.waiting_for_can_send_now = false;
                    notify(channel, BnepEvent::CanSendNow { cid });
                }
                return Ok(());
            }
        };

        // A failed write puts its action back, so this also covers retries.
        if let Some(channel) = self.channels.by_cid(cid) {
            if !channel.pending.is_empty() || channel.waiting_for_can_send_now {
                self.transport.request_can_send_now(cid);
            }
        }
        result
    }

    fn perform(&mut self, cid: u16, action: PendingAction) -> Result<()> {
        let Some(channel) = self.channels.by_cid_mut(cid) else {
            return Ok(());
        };

        let message = match action {
            PendingAction::CommandNotUnderstood => ControlMessage::CommandNotUnderstood {
                control_type: channel.last_control_type,
            },
            PendingAction::ConnectionRequest => {
                channel.state = ChannelState::WaitForConnectionResponse;
                ControlMessage::setup_request(channel.source_uuid, channel.dest_uuid)
            }
            PendingAction::ConnectionResponse => ControlMessage::SetupConnectionResponse {
                code: channel.setup_response,
            },
            PendingAction::NetFilterSet => {
                if channel.net_filter_out.is_empty() {
                    return Ok(());
                }
                ControlMessage::FilterNetTypeSet {
                    ranges: mem::take(&mut channel.net_filter_out),
                }
            }
            PendingAction::NetFilterResponse => ControlMessage::FilterNetTypeResponse {
                code: channel.net_filter_response,
            },
            PendingAction::MultiAddrSet => {
                if channel.multicast_filter_out.is_empty() {
                    return Ok(());
                }
                ControlMessage::FilterMultiAddrSet {
                    ranges: mem::take(&mut channel.multicast_filter_out),
                }
            }
            PendingAction::MultiAddrResponse => ControlMessage::FilterMultiAddrResponse {
                code: channel.multicast_filter_response,
            },
        };

        let mut buf = BytesMut::new();
        encode_control_packet(&message, &mut buf);
        if let Err(err) = self.transport.send_prepared(cid, &buf) {
            channel.pending.insert(action);
            match message {
                ControlMessage::FilterNetTypeSet { ranges } => channel.net_filter_out = ranges,
                ControlMessage::FilterMultiAddrSet { ranges } => {
                    channel.multicast_filter_out = ranges
                }
                _ => {}
            }
            return Err(err.into());
        }
        debug!(cid, ?action, "control message sent");

        if action == PendingAction::ConnectionResponse
            && channel.setup_response.is_success()
            && matches!(
                channel.state,
                ChannelState::Closed | ChannelState::WaitForConnectionRequest
            )
        {
            channel.state = ChannelState::Connected;
            disarm_timer(&mut self.timers, channel);
            info!(cid, addr = %channel.remote_addr, "channel connected");
            notify(channel, opened_event(channel, 0));
        }
        Ok(())
    }

    /// Report that the handshake timer for `cid` fired.
    ///
    /// An outbound channel still waiting for the setup response resends its
    /// request while retries remain; otherwise the channel times out.
    pub fn handle_timeout(&mut self, cid: u16) {
        let Some(channel) = self.channels.by_cid_mut(cid) else {
            return;
        };
        channel.timer_active = false;

        if channel.state == ChannelState::WaitForConnectionResponse
            && channel.retry_count < self.config.max_retries
        {
            channel.retry_count += 1;
            debug!(cid, retry = channel.retry_count, "resending setup request");
            arm_timer(&mut self.timers, self.config.connection_timeout, channel);
            channel.pending.insert(PendingAction::ConnectionRequest);
            self.transport.request_can_send_now(cid);
            return;
        }

        let addr = channel.remote_addr;
        warn!(cid, %addr, state = %channel.state, "channel timed out");
        notify(
            channel,
            BnepEvent::ChannelTimeout {
                cid,
                source_uuid: channel.source_uuid,
                dest_uuid: channel.dest_uuid,
                remote_addr: addr,
                state: channel.state.as_u8(),
            },
        );
        self.finalize(addr, true);
    }

    /// Channel record sized for the largest MTU the transport offers. The
    /// frame size is narrowed once the channel-opened event reports the
    /// negotiated MTU.
    fn new_channel(&self, addr: BdAddr, psm: u16) -> Channel {
        let mut channel = Channel::new(addr, self.transport.local_addr(), &self.config);
        channel.psm = psm;
        channel.max_frame_size = max_frame_size_for_mtu(self.transport.max_mtu());
        channel
    }

    /// Destroy the channel to `addr`, cancelling its timer first.
    fn finalize(&mut self, addr: BdAddr, disconnect_transport: bool) {
        let Some(channel) = self.channels.by_addr_mut(&addr) else {
            return;
        };
        disarm_timer(&mut self.timers, channel);
        let Some(channel) = self.channels.remove_by_addr(&addr) else {
            return;
        };

        if channel.state == ChannelState::Connected {
            notify(
                &channel,
                BnepEvent::ChannelClosed {
                    cid: channel.cid.unwrap_or(0),
                    source_uuid: channel.source_uuid,
                    dest_uuid: channel.dest_uuid,
                    remote_addr: addr,
                },
            );
        }
        debug!(cid = ?channel.cid, %addr, "channel released");

        if disconnect_transport {
            if let Some(cid) = channel.cid {
                self.transport.disconnect(cid);
            }
        }
    }
}

/// Filter messages are handled once connected, or while the setup response
/// is still queued.
fn accepts_filter_messages(channel: &Channel) -> bool {
    channel.state == ChannelState::Connected
        || (channel.state == ChannelState::WaitForConnectionRequest
            && channel.pending.contains(PendingAction::ConnectionResponse))
}

fn arm_timer<S: TimerService>(timers: &mut S, timeout: Duration, channel: &mut Channel) {
    if let Some(cid) = channel.cid {
        timers.start(cid, timeout);
        channel.timer_active = true;
    }
}

fn disarm_timer<S: TimerService>(timers: &mut S, channel: &mut Channel) {
    if channel.timer_active {
        if let Some(cid) = channel.cid {
            timers.stop(cid);
        }
        channel.timer_active = false;
    }
}

fn opened_event(channel: &Channel, status: u8) -> BnepEvent {
    BnepEvent::ChannelOpened {
        status,
        cid: channel.cid.unwrap_or(0),
        source_uuid: channel.source_uuid,
        dest_uuid: channel.dest_uuid,
        max_frame_size: channel.max_frame_size,
        remote_addr: channel.remote_addr,
        con_handle: channel.con_handle,
    }
}

fn notify(channel: &Channel, event: BnepEvent) {
    let Some(handler) = &channel.handler else {
        return;
    };
    match event.encode() {
        Ok(record) => handler(Packet::Event(&record)),
        Err(err) => warn!(error = %err, "failed to encode notification"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bnepkit_frame::{
        SetupResponseCode, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_IPV6, ETHERTYPE_VLAN,
    };
    use bnepkit_transport::{MemoryTransport, TransportAction};

    use super::*;
    use crate::events::handler;
    use crate::timer::ManualTimers;

    const LOCAL: BdAddr = BdAddr::new([0x00, 0x1B, 0xDC, 0x00, 0x00, 0x01]);
    const PEER: BdAddr = BdAddr::new([0x00, 0x1B, 0xDC, 0x00, 0x00, 0x02]);
    const OTHER: BdAddr = BdAddr::new([0x00, 0x1B, 0xDC, 0x00, 0x00, 0x03]);
    const CID: u16 = 0x0041;
    const PANU: u16 = 0x1115;
    const NAP: u16 = 0x1116;

    type Engine = Bnep<MemoryTransport, ManualTimers>;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Event(BnepEvent),
        Data(u16, EthernetFrame),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Seen>>>);

    impl Recorder {
        fn handler(&self) -> PacketHandler {
            let seen = Arc::clone(&self.0);
            handler(move |packet| {
                let item = match packet {
                    Packet::Event(record) => {
                        Seen::Event(BnepEvent::parse(record).expect("record should decode"))
                    }
                    Packet::Data { cid, frame } => Seen::Data(cid, frame.clone()),
                };
                seen.lock().expect("recorder lock").push(item);
            })
        }

        fn take(&self) -> Vec<Seen> {
            std::mem::take(&mut *self.0.lock().expect("recorder lock"))
        }
    }

    fn engine() -> Engine {
        Bnep::new(MemoryTransport::new(LOCAL), ManualTimers::new())
    }

    fn control(message: &ControlMessage) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_control_packet(message, &mut buf);
        buf.to_vec()
    }

    fn incoming(engine: &mut Engine, addr: BdAddr, cid: u16) {
        let record = L2capEvent::IncomingConnection {
            addr,
            handle: 0x000B,
            psm: PSM_BNEP,
            local_cid: cid,
            remote_cid: 0x0050,
        }
        .to_record();
        assert!(engine.handle_event(&record).expect("record should parse"));
    }

    fn opened(engine: &mut Engine, status: u8, addr: BdAddr, cid: u16, mtu: u16) {
        let record = L2capEvent::ChannelOpened {
            status,
            addr,
            handle: 0x000B,
            psm: PSM_BNEP,
            local_cid: cid,
            remote_cid: 0x0050,
            local_mtu: mtu,
            remote_mtu: mtu,
        }
        .to_record();
        engine.handle_event(&record).expect("record should parse");
    }

    fn opened_record(status: u8, psm: u16, cid: u16) -> Vec<u8> {
        L2capEvent::ChannelOpened {
            status,
            addr: PEER,
            handle: 0x000B,
            psm,
            local_cid: cid,
            remote_cid: 0x0051,
            local_mtu: 672,
            remote_mtu: 672,
        }
        .to_record()
    }

    /// NAP service with an inbound channel from PANU, handshake completed.
    fn connected_nap(recorder: &Recorder) -> Engine {
        let mut engine = engine();
        engine
            .register_service(NAP, 1500, recorder.handler())
            .expect("service should register");
        incoming(&mut engine, PEER, CID);
        opened(&mut engine, 0, PEER, CID, 1691);
        engine
            .handle_data(CID, &control(&ControlMessage::setup_request(PANU, NAP)))
            .expect("setup request should be handled");
        engine
            .handle_can_send_now(CID)
            .expect("response should send");
        let state = engine.channel(CID).unwrap().state();
        assert_eq!(state, ChannelState::Connected);
        engine.transport_mut().take_actions();
        recorder.take();
        engine
    }

    /// Outbound PANU channel waiting for the setup response.
    fn outbound(recorder: &Recorder) -> Engine {
        let mut engine = engine();
        engine
            .connect(PEER, PSM_BNEP, PANU, NAP, recorder.handler())
            .expect("connect should start");
        opened(&mut engine, 0, PEER, CID, 1691);
        engine
    }

    fn sent(engine: &mut Engine) -> Vec<Vec<u8>> {
        engine
            .transport_mut()
            .take_sent()
            .into_iter()
            .map(|(_, bytes)| bytes)
            .collect()
    }

    #[test]
    fn psm_follows_service_registry() {
        let mut engine = engine();
        engine.register_service(NAP, 1500, handler(|_| {})).unwrap();
        engine
            .register_service(PANU, 1500, handler(|_| {}))
            .unwrap();
        assert!(matches!(
            engine.register_service(NAP, 1500, handler(|_| {})),
            Err(PeerError::ServiceAlreadyRegistered(NAP))
        ));

        assert!(engine.unregister_service(NAP));
        assert!(engine.unregister_service(PANU));
        assert!(!engine.unregister_service(PANU));
        assert_eq!(
            engine.transport().actions(),
            &[
                TransportAction::Register {
                    psm: PSM_BNEP,
                    mtu: u16::MAX
                },
                TransportAction::Unregister { psm: PSM_BNEP },
            ]
        );
    }

    #[test]
    fn inbound_handshake_panu_to_nap() {
        let recorder = Recorder::default();
        let mut engine = engine();
        engine
            .register_service(NAP, 1500, recorder.handler())
            .unwrap();
        engine.transport_mut().take_actions();

        incoming(&mut engine, PEER, CID);
        let channel = engine.channel(CID).expect("channel should exist");
        assert_eq!(channel.state(), ChannelState::WaitForConnectionRequest);
        assert!(engine.timers().is_armed(CID));
        assert_eq!(engine.timers().timeout(CID), Some(Duration::from_secs(10)));
        assert_eq!(
            engine.transport_mut().take_actions(),
            vec![TransportAction::Accept { cid: CID }]
        );

        opened(&mut engine, 0, PEER, CID, 1691);
        assert_eq!(engine.channel(CID).unwrap().max_frame_size(), 1676);

        engine
            .handle_data(CID, &control(&ControlMessage::setup_request(PANU, NAP)))
            .unwrap();
        assert!(engine
            .channel(CID)
            .unwrap()
            .pending()
            .contains(PendingAction::ConnectionResponse));
        assert_eq!(
            engine.transport_mut().take_actions(),
            vec![TransportAction::RequestCanSendNow { cid: CID }]
        );

        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(sent(&mut engine), vec![vec![0x01, 0x02, 0x00, 0x00]]);

        let channel = engine.channel(CID).unwrap();
        assert_eq!(channel.state(), ChannelState::Connected);
        assert_eq!(channel.source_uuid(), PANU);
        assert_eq!(channel.dest_uuid(), NAP);
        assert!(!engine.timers().is_armed(CID));
        assert_eq!(
            recorder.take(),
            vec![Seen::Event(BnepEvent::ChannelOpened {
                status: 0,
                cid: CID,
                source_uuid: PANU,
                dest_uuid: NAP,
                max_frame_size: 1676,
                remote_addr: PEER,
                con_handle: 0x000B,
            })]
        );
    }

    #[test]
    fn nap_to_nap_request_is_rejected() {
        let recorder = Recorder::default();
        let mut engine = engine();
        engine
            .register_service(NAP, 1500, recorder.handler())
            .unwrap();
        incoming(&mut engine, PEER, CID);

        engine
            .handle_data(CID, &control(&ControlMessage::setup_request(NAP, NAP)))
            .unwrap();
        engine.handle_can_send_now(CID).unwrap();

        assert_eq!(sent(&mut engine), vec![vec![0x01, 0x02, 0x00, 0x02]]);
        let channel = engine
            .channel(CID)
            .expect("rejected channel stays until closed");
        assert_eq!(channel.state(), ChannelState::WaitForConnectionRequest);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn one_channel_per_address() {
        let mut engine = engine();
        engine.register_service(NAP, 1500, handler(|_| {})).unwrap();
        incoming(&mut engine, PEER, CID);
        incoming(&mut engine, PEER, CID + 1);

        assert_eq!(engine.channels().len(), 1);
        assert!(engine
            .transport()
            .actions()
            .contains(&TransportAction::Decline { cid: CID + 1 }));
        assert!(matches!(
            engine.connect(PEER, PSM_BNEP, PANU, NAP, handler(|_| {})),
            Err(PeerError::ChannelExists(PEER))
        ));
    }

    #[test]
    fn incoming_declined_without_service_or_room() {
        let mut engine = Bnep::with_config(
            MemoryTransport::new(LOCAL),
            ManualTimers::new(),
            EngineConfig {
                max_channels: 1,
                ..Default::default()
            },
        );
        incoming(&mut engine, PEER, CID);
        assert!(engine.channels().is_empty());

        engine.register_service(NAP, 1500, handler(|_| {})).unwrap();
        incoming(&mut engine, PEER, CID);
        incoming(&mut engine, OTHER, CID + 1);
        assert_eq!(engine.channels().len(), 1);

        let declined: Vec<_> = engine
            .transport()
            .actions()
            .iter()
            .filter(|a| matches!(a, TransportAction::Decline { .. }))
            .cloned()
            .collect();
        assert_eq!(
            declined,
            vec![
                TransportAction::Decline { cid: CID },
                TransportAction::Decline { cid: CID + 1 }
            ]
        );
    }

    #[test]
    fn foreign_psm_is_not_ours() {
        let mut engine = engine();
        engine.register_service(NAP, 1500, handler(|_| {})).unwrap();
        let record = L2capEvent::IncomingConnection {
            addr: PEER,
            handle: 1,
            psm: 0x0001,
            local_cid: CID,
            remote_cid: 0x50,
        }
        .to_record();
        assert!(!engine.handle_event(&record).unwrap());
        assert!(engine.channels().is_empty());
    }

    #[test]
    fn outbound_handshake() {
        let recorder = Recorder::default();
        let mut engine = engine();
        engine
            .connect(PEER, PSM_BNEP, PANU, NAP, recorder.handler())
            .unwrap();
        assert_eq!(
            engine.transport_mut().take_actions(),
            vec![TransportAction::Create {
                addr: PEER,
                psm: PSM_BNEP,
                mtu: 1691
            }]
        );
        assert_eq!(engine.channel_for_addr(&PEER).unwrap().cid(), None);

        opened(&mut engine, 0, PEER, CID, 1691);
        let channel = engine.channel(CID).expect("cid assigned on open");
        assert_eq!(channel.state(), ChannelState::WaitForConnectionResponse);
        assert_eq!(channel.max_frame_size(), 1676);
        assert!(engine.timers().is_armed(CID));

        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(
            sent(&mut engine),
            vec![vec![0x01, 0x01, 0x02, 0x11, 0x16, 0x11, 0x15]]
        );

        let response = ControlMessage::SetupConnectionResponse {
            code: SetupResponseCode::SUCCESS,
        };
        engine.handle_data(CID, &control(&response)).unwrap();
        assert!(engine.channel(CID).unwrap().is_connected());
        assert!(!engine.timers().is_armed(CID));
        let seen = recorder.take();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            seen[0],
            Seen::Event(BnepEvent::ChannelOpened {
                status: 0,
                cid: CID,
                ..
            })
        ));
    }

    #[test]
    fn failed_inbound_open_cancels_timer() {
        let recorder = Recorder::default();
        let mut engine = engine();
        engine
            .register_service(NAP, 1500, recorder.handler())
            .unwrap();
        incoming(&mut engine, PEER, CID);
        assert!(engine.timers().is_armed(CID));

        opened(&mut engine, 0x68, PEER, CID, 0);
        assert!(engine.channels().is_empty());
        assert!(!engine.timers().is_armed(CID));
    }

    #[test]
    fn open_events_for_other_channels_are_ignored() {
        let recorder = Recorder::default();
        let mut engine = engine();
        engine
            .connect(PEER, PSM_BNEP, PANU, NAP, recorder.handler())
            .unwrap();
        engine.transport_mut().take_actions();

        let foreign = opened_record(0, 0x0019, 0x0060);
        assert!(!engine.handle_event(&foreign).unwrap());
        let channel = engine.channel_for_addr(&PEER).unwrap();
        assert_eq!(channel.cid(), None);
        assert_eq!(channel.state(), ChannelState::Closed);

        let failed = opened_record(0x68, 0x0019, 0x0060);
        assert!(!engine.handle_event(&failed).unwrap());
        assert_eq!(engine.channels().len(), 1);

        opened(&mut engine, 0, PEER, CID, 1691);
        assert_eq!(
            engine.channel(CID).unwrap().state(),
            ChannelState::WaitForConnectionResponse
        );

        let stale = opened_record(0x68, PSM_BNEP, 0x0060);
        assert!(!engine.handle_event(&stale).unwrap());
        assert!(engine.channel(CID).is_some());
        assert!(recorder.take().is_empty());
        assert_eq!(
            engine.transport().actions(),
            &[TransportAction::RequestCanSendNow { cid: CID }]
        );
    }

    #[test]
    fn inbound_frame_size_starts_from_transport_mtu() {
        let mut engine = engine();
        engine.register_service(NAP, 1500, handler(|_| {})).unwrap();
        incoming(&mut engine, PEER, CID);
        assert_eq!(
            engine.channel(CID).unwrap().max_frame_size(),
            max_frame_size_for_mtu(engine.transport().max_mtu())
        );

        opened(&mut engine, 0, PEER, CID, 672);
        assert_eq!(engine.channel(CID).unwrap().max_frame_size(), 657);
    }

    #[test]
    fn failed_open_drops_channel() {
        let recorder = Recorder::default();
        let mut engine = engine();
        engine
            .connect(PEER, PSM_BNEP, PANU, NAP, recorder.handler())
            .unwrap();
        engine.transport_mut().take_actions();

        opened(&mut engine, 0x68, PEER, CID, 0);
        assert!(engine.channels().is_empty());
        assert!(engine.transport().actions().is_empty());
        assert!(matches!(
            recorder.take().as_slice(),
            [Seen::Event(BnepEvent::ChannelOpened { status: 0x68, .. })]
        ));
    }

    #[test]
    fn refused_create_removes_channel() {
        let mut engine = engine();
        engine.transport_mut().refuse_create(true);
        let err = engine
            .connect(PEER, PSM_BNEP, PANU, NAP, handler(|_| {}))
            .unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)));
        assert!(engine.channels().is_empty());
    }

    #[test]
    fn rejected_setup_response_destroys_channel() {
        let recorder = Recorder::default();
        let mut engine = outbound(&recorder);
        engine.handle_can_send_now(CID).unwrap();
        engine.transport_mut().take_actions();

        let response = ControlMessage::SetupConnectionResponse {
            code: SetupResponseCode::CONNECTION_NOT_ALLOWED,
        };
        engine.handle_data(CID, &control(&response)).unwrap();

        assert!(engine.channels().is_empty());
        assert!(!engine.timers().is_armed(CID));
        assert_eq!(
            engine.transport().actions(),
            &[TransportAction::Disconnect { cid: CID }]
        );
        let seen = recorder.take();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            seen[0],
            Seen::Event(BnepEvent::ChannelOpened {
                status: 0x04,
                cid: CID,
                ..
            })
        ));
    }

    #[test]
    fn one_retry_then_timeout() {
        let recorder = Recorder::default();
        let mut engine = outbound(&recorder);
        engine.handle_can_send_now(CID).unwrap();
        engine.transport_mut().take_actions();

        engine.handle_timeout(CID);
        let channel = engine.channel(CID).expect("first timeout retries");
        assert_eq!(channel.retry_count(), 1);
        assert!(channel.pending().contains(PendingAction::ConnectionRequest));
        assert!(engine.timers().is_armed(CID));
        assert_eq!(engine.timers().starts(), 2);

        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(sent(&mut engine).len(), 1);

        engine.handle_timeout(CID);
        assert!(engine.channels().is_empty());
        assert!(engine
            .transport()
            .actions()
            .contains(&TransportAction::Disconnect { cid: CID }));
        assert_eq!(
            recorder.take(),
            vec![Seen::Event(BnepEvent::ChannelTimeout {
                cid: CID,
                source_uuid: PANU,
                dest_uuid: NAP,
                remote_addr: PEER,
                state: ChannelState::WaitForConnectionResponse.as_u8(),
            })]
        );
    }

    #[test]
    fn inbound_handshake_timeout_does_not_retry() {
        let recorder = Recorder::default();
        let mut engine = engine();
        engine
            .register_service(NAP, 1500, recorder.handler())
            .unwrap();
        incoming(&mut engine, PEER, CID);

        engine.handle_timeout(CID);
        assert!(engine.channels().is_empty());
        // No handler is bound before the setup request names a service.
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn one_action_per_credit_in_priority_order() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);

        engine
            .set_net_filter(CID, &[NetTypeRange::new(0x0800, 0x0806)])
            .unwrap();
        let multicast_set = ControlMessage::FilterMultiAddrSet { ranges: vec![] };
        engine.handle_data(CID, &control(&multicast_set)).unwrap();
        engine.handle_data(CID, &[0x01, 0x0A]).unwrap();

        let pending: Vec<_> = engine.channel(CID).unwrap().pending().iter().collect();
        assert_eq!(
            pending,
            vec![
                PendingAction::CommandNotUnderstood,
                PendingAction::NetFilterSet,
                PendingAction::MultiAddrResponse,
            ]
        );
        engine.transport_mut().take_actions();

        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(
            engine.transport_mut().take_actions(),
            vec![
                TransportAction::Sent {
                    cid: CID,
                    bytes: vec![0x01, 0x00, 0x0A]
                },
                TransportAction::RequestCanSendNow { cid: CID },
            ]
        );

        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(
            engine.transport_mut().take_actions(),
            vec![
                TransportAction::Sent {
                    cid: CID,
                    bytes: vec![0x01, 0x03, 0x00, 0x04, 0x08, 0x00, 0x08, 0x06]
                },
                TransportAction::RequestCanSendNow { cid: CID },
            ]
        );

        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(
            engine.transport_mut().take_actions(),
            vec![TransportAction::Sent {
                cid: CID,
                bytes: vec![0x01, 0x06, 0x00, 0x00]
            }]
        );
        assert!(engine.channel(CID).unwrap().pending().is_empty());
    }

    #[test]
    fn failed_write_keeps_action_pending() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        engine
            .set_net_filter(CID, &[NetTypeRange::single(ETHERTYPE_IPV4)])
            .unwrap();

        engine.transport_mut().take_actions();

        engine.transport_mut().set_credit(CID, false);
        assert!(engine.handle_can_send_now(CID).is_err());
        let channel = engine.channel(CID).unwrap();
        assert!(channel.pending().contains(PendingAction::NetFilterSet));
        assert_eq!(
            engine.transport_mut().take_actions(),
            vec![TransportAction::RequestCanSendNow { cid: CID }]
        );

        engine.transport_mut().set_credit(CID, true);
        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(
            sent(&mut engine),
            vec![vec![0x01, 0x03, 0x00, 0x04, 0x08, 0x00, 0x08, 0x00]]
        );
    }

    #[test]
    fn application_can_send_now() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        engine.request_can_send_now(CID).unwrap();
        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(
            recorder.take(),
            vec![Seen::Event(BnepEvent::CanSendNow { cid: CID })]
        );

        engine.handle_can_send_now(CID).unwrap();
        assert!(recorder.take().is_empty());
        assert!(matches!(
            engine.request_can_send_now(0x99),
            Err(PeerError::UnknownChannel(0x99))
        ));
    }

    #[test]
    fn protocol_filter_admits_and_denies() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);

        let set = ControlMessage::FilterNetTypeSet {
            ranges: vec![NetTypeRange::single(ETHERTYPE_IPV4)],
        };
        engine.handle_data(CID, &control(&set)).unwrap();
        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(sent(&mut engine), vec![vec![0x01, 0x04, 0x00, 0x00]]);

        let ipv4 = EthernetFrame::new(PEER, LOCAL, ETHERTYPE_IPV4, vec![0x45, 0x00]);
        let arp = EthernetFrame::new(PEER, LOCAL, ETHERTYPE_ARP, vec![0x00, 0x01]);
        let ipv6 = EthernetFrame::new(PEER, LOCAL, ETHERTYPE_IPV6, vec![0x60]);
        assert_eq!(engine.send_frame(CID, &ipv4).unwrap(), SendStatus::Sent);
        assert_eq!(engine.send_frame(CID, &arp).unwrap(), SendStatus::Filtered);
        assert_eq!(engine.send_frame(CID, &ipv6).unwrap(), SendStatus::Filtered);
        assert_eq!(sent(&mut engine), vec![vec![0x02, 0x08, 0x00, 0x45, 0x00]]);
    }

    #[test]
    fn filtered_vlan_frame_keeps_its_tag() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        let set = ControlMessage::FilterNetTypeSet {
            ranges: vec![NetTypeRange::single(ETHERTYPE_IPV4)],
        };
        engine.handle_data(CID, &control(&set)).unwrap();
        engine.handle_can_send_now(CID).unwrap();
        sent(&mut engine);

        // Tag (priority/VID) then the inner ARP type, then ARP payload.
        let tagged = EthernetFrame::new(
            PEER,
            LOCAL,
            ETHERTYPE_VLAN,
            vec![0x00, 0x05, 0x08, 0x06, 0xAA, 0xBB],
        );
        assert_eq!(engine.send_frame(CID, &tagged).unwrap(), SendStatus::Sent);
        assert_eq!(
            sent(&mut engine),
            vec![vec![0x02, 0x81, 0x00, 0x00, 0x05, 0x08, 0x06]]
        );

        let short = EthernetFrame::new(PEER, LOCAL, ETHERTYPE_VLAN, vec![0x00, 0x05]);
        let status = engine.send_frame(CID, &short).unwrap();
        assert_eq!(status, SendStatus::Filtered);
    }

    #[test]
    fn multicast_filter_applies_to_group_destinations() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        let group = BdAddr::new([0x01, 0x00, 0x5E, 0x00, 0x00, 0x01]);
        let set = ControlMessage::FilterMultiAddrSet {
            ranges: vec![MulticastRange::new(group, group)],
        };
        engine.handle_data(CID, &control(&set)).unwrap();
        engine.handle_can_send_now(CID).unwrap();
        sent(&mut engine);

        let other_group = BdAddr::new([0x01, 0x00, 0x5E, 0x00, 0x00, 0x02]);
        let to_group = EthernetFrame::new(group, LOCAL, ETHERTYPE_IPV4, vec![1]);
        let to_other_group = EthernetFrame::new(other_group, LOCAL, ETHERTYPE_IPV4, vec![1]);
        let unicast = EthernetFrame::new(OTHER, LOCAL, ETHERTYPE_IPV4, vec![1]);

        assert_eq!(engine.send_frame(CID, &to_group).unwrap(), SendStatus::Sent);
        assert_eq!(
            engine.send_frame(CID, &to_other_group).unwrap(),
            SendStatus::Filtered
        );
        assert_eq!(engine.send_frame(CID, &unicast).unwrap(), SendStatus::Sent);
    }

    #[test]
    fn send_errors() {
        let recorder = Recorder::default();
        let mut engine = outbound(&recorder);
        let mut raw = Vec::new();
        raw.extend_from_slice(PEER.as_bytes());
        raw.extend_from_slice(LOCAL.as_bytes());
        raw.extend_from_slice(&[0x08, 0x00, 0x45]);

        assert!(matches!(
            engine.send(0x99, &raw),
            Err(PeerError::UnknownChannel(0x99))
        ));
        assert!(matches!(
            engine.send(CID, &raw),
            Err(PeerError::NotConnected(CID))
        ));

        let mut engine = connected_nap(&recorder);
        assert_eq!(engine.send(CID, &raw).unwrap(), SendStatus::Sent);
        assert!(matches!(
            engine.send(CID, &raw[..10]),
            Err(PeerError::Frame(FrameError::EthernetTooShort(10)))
        ));

        let big = EthernetFrame::new(PEER, LOCAL, ETHERTYPE_IPV4, vec![0u8; 1677]);
        assert!(matches!(
            engine.send_frame(CID, &big),
            Err(PeerError::DataLenExceedsMtu {
                len: 1677,
                max: 1676
            })
        ));

        engine.transport_mut().set_credit(CID, false);
        assert!(!engine.can_send_now(CID));
        assert!(matches!(
            engine.send(CID, &raw),
            Err(PeerError::NoCredit(CID))
        ));
    }

    #[test]
    fn outbound_filter_limits() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        let too_many = vec![NetTypeRange::single(ETHERTYPE_IPV4); 422];
        assert!(matches!(
            engine.set_net_filter(CID, &too_many),
            Err(PeerError::TooManyFilters { len: 422, max: 421 })
        ));
        assert!(matches!(
            engine.set_multicast_filter(0x99, &[]),
            Err(PeerError::UnknownChannel(0x99))
        ));

        // An empty outbound list is consumed without writing anything.
        engine.set_multicast_filter(CID, &[]).unwrap();
        engine.handle_can_send_now(CID).unwrap();
        assert!(sent(&mut engine).is_empty());
    }

    #[test]
    fn received_frames_are_rebuilt() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);

        engine
            .handle_data(CID, &[0x02, 0x08, 0x00, 0x45, 0x00])
            .unwrap();
        let mut source_only = vec![0x03];
        source_only.extend_from_slice(OTHER.as_bytes());
        source_only.extend_from_slice(&[0x86, 0xDD, 0x60]);
        engine.handle_data(CID, &source_only).unwrap();

        let ipv4 = EthernetFrame::new(LOCAL, PEER, ETHERTYPE_IPV4, vec![0x45, 0x00]);
        let ipv6 = EthernetFrame::new(LOCAL, OTHER, ETHERTYPE_IPV6, vec![0x60]);
        assert_eq!(
            recorder.take(),
            vec![Seen::Data(CID, ipv4), Seen::Data(CID, ipv6)]
        );
    }

    #[test]
    fn data_before_connect_is_dropped() {
        let recorder = Recorder::default();
        let mut engine = outbound(&recorder);
        engine.handle_data(CID, &[0x02, 0x08, 0x00, 0x45]).unwrap();
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn malformed_packets_are_dropped() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        engine.handle_data(CID, &[0x02]).unwrap();
        engine.handle_data(CID, &[0x00, 0x01, 0x02]).unwrap();
        engine
            .handle_data(CID, &[0x82, 0x08, 0x00, 0x00, 0x09])
            .unwrap();

        assert!(recorder.take().is_empty());
        assert!(engine.channel(CID).unwrap().pending().is_empty());
        assert!(engine.transport().actions().is_empty());
    }

    #[test]
    fn truncated_control_is_not_understood() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        // Net-type filter set declaring 8 bytes of ranges but carrying 4.
        engine
            .handle_data(CID, &[0x01, 0x03, 0x00, 0x08, 0x08, 0x00, 0x08, 0x00])
            .unwrap();
        engine.handle_can_send_now(CID).unwrap();
        assert_eq!(sent(&mut engine), vec![vec![0x01, 0x00, 0x03]]);
    }

    #[test]
    fn control_extension_with_data() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);

        let mut ext = BytesMut::new();
        ControlMessage::FilterNetTypeSet {
            ranges: vec![NetTypeRange::single(ETHERTYPE_IPV4)],
        }
        .encode(&mut ext);
        let mut packet = vec![0x82, 0x08, 0x00, 0x00, ext.len() as u8];
        packet.extend_from_slice(&ext);
        packet.extend_from_slice(&[0x45]);

        engine.handle_data(CID, &packet).unwrap();
        let channel = engine.channel(CID).unwrap();
        let ipv4_only = [NetTypeRange::single(ETHERTYPE_IPV4)];
        assert_eq!(channel.net_filter().ranges(), &ipv4_only);
        assert!(channel.pending().contains(PendingAction::NetFilterResponse));
        assert!(matches!(recorder.take().as_slice(), [Seen::Data(CID, _)]));
    }

    #[test]
    fn setup_messages_in_extensions_are_ignored() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);

        let mut ext = BytesMut::new();
        ControlMessage::setup_request(PANU, NAP).encode(&mut ext);
        let mut packet = vec![0x82, 0x08, 0x00, 0x00, ext.len() as u8];
        packet.extend_from_slice(&ext);

        engine.handle_data(CID, &packet).unwrap();
        assert!(engine.channel(CID).unwrap().pending().is_empty());
        assert!(engine.transport().actions().is_empty());
    }

    #[test]
    fn filter_set_ignored_before_setup() {
        let mut engine = engine();
        engine.register_service(NAP, 1500, handler(|_| {})).unwrap();
        incoming(&mut engine, PEER, CID);
        engine.transport_mut().take_actions();

        let set = ControlMessage::FilterNetTypeSet {
            ranges: vec![NetTypeRange::single(ETHERTYPE_IPV4)],
        };
        engine.handle_data(CID, &control(&set)).unwrap();
        let channel = engine.channel(CID).unwrap();
        assert!(channel.net_filter().is_empty());
        assert!(channel.pending().is_empty());
        assert!(engine.transport().actions().is_empty());

        // Once the setup request is in, filters ride along with the response.
        engine
            .handle_data(CID, &control(&ControlMessage::setup_request(PANU, NAP)))
            .unwrap();
        engine.handle_data(CID, &control(&set)).unwrap();
        assert_eq!(engine.channel(CID).unwrap().net_filter().len(), 1);
    }

    #[test]
    fn not_understood_from_peer_closes_channel() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        engine.handle_data(CID, &[0x01, 0x00, 0x03]).unwrap();

        assert!(engine.channels().is_empty());
        assert_eq!(
            engine.transport().actions(),
            &[TransportAction::Disconnect { cid: CID }]
        );
        assert!(matches!(
            recorder.take().as_slice(),
            [Seen::Event(BnepEvent::ChannelClosed { cid: CID, .. })]
        ));
    }

    #[test]
    fn transport_closure_notifies_without_disconnect() {
        let recorder = Recorder::default();
        let mut engine = connected_nap(&recorder);
        let record = L2capEvent::ChannelClosed { local_cid: CID }.to_record();
        assert!(engine.handle_event(&record).unwrap());

        assert!(engine.channels().is_empty());
        assert!(engine.transport().actions().is_empty());
        assert_eq!(
            recorder.take(),
            vec![Seen::Event(BnepEvent::ChannelClosed {
                cid: CID,
                source_uuid: PANU,
                dest_uuid: NAP,
                remote_addr: PEER,
            })]
        );
        assert!(!engine.handle_event(&record).unwrap());
    }

    #[test]
    fn explicit_disconnect_cancels_timer() {
        let recorder = Recorder::default();
        let mut engine = outbound(&recorder);
        assert!(engine.timers().is_armed(CID));
        engine.transport_mut().take_actions();

        engine.disconnect(PEER).unwrap();
        assert!(!engine.timers().is_armed(CID));
        assert!(engine.channels().is_empty());
        assert_eq!(
            engine.transport().actions(),
            &[TransportAction::Disconnect { cid: CID }]
        );
        assert!(recorder.take().is_empty());
        assert!(matches!(
            engine.disconnect(PEER),
            Err(PeerError::UnknownPeer(PEER))
        ));
    }
}
