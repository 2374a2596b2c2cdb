//! Engine-owned service and channel tables.

use std::fmt;

use bnepkit_frame::ServiceClass;
use bnepkit_transport::BdAddr;

use crate::channel::Channel;
use crate::error::{PeerError, Result};
use crate::events::PacketHandler;

/// A local PAN role accepting incoming channels.
#[derive(Clone)]
pub struct Service {
    pub uuid: ServiceClass,
    /// Advertised maximum frame size.
    pub max_frame_size: u16,
    pub handler: PacketHandler,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("uuid", &self.uuid)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

/// At most one service per role.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Vec<Service>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service for a 16-bit role UUID.
    pub fn register(
        &mut self,
        uuid: u16,
        max_frame_size: u16,
        handler: PacketHandler,
    ) -> Result<()> {
        let role = ServiceClass::from_uuid16(uuid).ok_or(PeerError::InvalidServiceUuid(uuid))?;
        if self.lookup(role).is_some() {
            return Err(PeerError::ServiceAlreadyRegistered(uuid));
        }
        self.services.push(Service {
            uuid: role,
            max_frame_size,
            handler,
        });
        Ok(())
    }

    /// Remove the service for `uuid`. Returns false when none was registered.
    pub fn unregister(&mut self, uuid: u16) -> bool {
        let before = self.services.len();
        self.services.retain(|s| s.uuid.uuid16() != uuid);
        self.services.len() != before
    }

    pub fn lookup(&self, role: ServiceClass) -> Option<&Service> {
        self.services.iter().find(|service| service.uuid == role)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }
}

/// Bounded channel table with linear lookup by address or channel id.
#[derive(Debug)]
pub struct ChannelTable {
    channels: Vec<Channel>,
    max_channels: usize,
}

impl ChannelTable {
    pub fn new(max_channels: usize) -> Self {
        Self {
            channels: Vec::new(),
            max_channels,
        }
    }

    pub fn by_addr(&self, addr: &BdAddr) -> Option<&Channel> {
        self.channels.iter().find(|c| c.remote_addr == *addr)
    }

    pub fn by_addr_mut(&mut self, addr: &BdAddr) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.remote_addr == *addr)
    }

    pub fn by_cid(&self, cid: u16) -> Option<&Channel> {
        self.channels.iter().find(|c| c.cid == Some(cid))
    }

    pub fn by_cid_mut(&mut self, cid: u16) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.cid == Some(cid))
    }

    pub(crate) fn insert(&mut self, channel: Channel) -> Result<&mut Channel> {
        if self.by_addr(&channel.remote_addr).is_some() {
            return Err(PeerError::ChannelExists(channel.remote_addr));
        }
        if self.is_full() {
            return Err(PeerError::ChannelTableFull(self.max_channels));
        }
        self.channels.push(channel);
        let last = self.channels.len() - 1;
        Ok(&mut self.channels[last])
    }

    pub(crate) fn remove_by_addr(&mut self, addr: &BdAddr) -> Option<Channel> {
        let index = self.channels.iter().position(|c| c.remote_addr == *addr)?;
        Some(self.channels.swap_remove(index))
    }

    pub fn is_full(&self) -> bool {
        self.channels.len() >= self.max_channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }
}
