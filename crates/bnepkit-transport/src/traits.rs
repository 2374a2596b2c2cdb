use crate::addr::BdAddr;
use crate::error::Result;

/// PSM assigned to BNEP.
pub const PSM_BNEP: u16 = 0x000F;

/// The segmented, credit-gated channel service BNEP runs on.
///
/// Implementations deliver their lifecycle events back to the caller as raw
/// records (see [`crate::L2capEvent`]); nothing here blocks. Sending is a
/// two-step contract: check [`can_send_now`](L2capTransport::can_send_now)
/// (or wait for the requested can-send-now event), then hand a fully built
/// packet to [`send_prepared`](L2capTransport::send_prepared). Exactly one
/// packet may be written per credit.
pub trait L2capTransport {
    /// Register a local PSM so incoming connections for it are reported.
    fn register_service(&mut self, psm: u16, mtu: u16) -> Result<()>;

    /// Stop accepting connections on a PSM.
    fn unregister_service(&mut self, psm: u16);

    /// Open an outgoing channel. Completion arrives as a channel-opened event.
    fn create_channel(&mut self, addr: BdAddr, psm: u16, mtu: u16) -> Result<()>;

    /// Accept a pending incoming connection.
    fn accept_connection(&mut self, cid: u16);

    /// Decline a pending incoming connection.
    fn decline_connection(&mut self, cid: u16);

    /// Close a channel. A channel-closed event follows.
    fn disconnect(&mut self, cid: u16);

    /// True when one more packet can be written on `cid` right now.
    fn can_send_now(&self, cid: u16) -> bool;

    /// Ask for a single can-send-now event on `cid`.
    fn request_can_send_now(&mut self, cid: u16);

    /// Transmit a packet built by the caller. Consumes one credit.
    fn send_prepared(&mut self, cid: u16, packet: &[u8]) -> Result<()>;

    /// Largest MTU the transport will negotiate.
    fn max_mtu(&self) -> u16;

    /// Address of the local controller.
    fn local_addr(&self) -> BdAddr;
}

impl<T: L2capTransport + ?Sized> L2capTransport for Box<T> {
    fn register_service(&mut self, psm: u16, mtu: u16) -> Result<()> {
        (**self).register_service(psm, mtu)
    }

    fn unregister_service(&mut self, psm: u16) {
        (**self).unregister_service(psm)
    }

    fn create_channel(&mut self, addr: BdAddr, psm: u16, mtu: u16) -> Result<()> {
        (**self).create_channel(addr, psm, mtu)
    }

    fn accept_connection(&mut self, cid: u16) {
        (**self).accept_connection(cid)
    }

    fn decline_connection(&mut self, cid: u16) {
        (**self).decline_connection(cid)
    }

    fn disconnect(&mut self, cid: u16) {
        (**self).disconnect(cid)
    }

    fn can_send_now(&self, cid: u16) -> bool {
        (**self).can_send_now(cid)
    }

    fn request_can_send_now(&mut self, cid: u16) {
        (**self).request_can_send_now(cid)
    }

    fn send_prepared(&mut self, cid: u16, packet: &[u8]) -> Result<()> {
        (**self).send_prepared(cid, packet)
    }

    fn max_mtu(&self) -> u16 {
        (**self).max_mtu()
    }

    fn local_addr(&self) -> BdAddr {
        (**self).local_addr()
    }
}
