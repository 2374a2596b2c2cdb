//! Protocol-type and multicast-address filters.
//!
//! A peer installs filters with a filter-set control message; from then on
//! outbound frames are checked against them before transmission. An empty
//! list admits everything.

use std::fmt;

use bnepkit_transport::endian::read_u16_be;
use bnepkit_transport::{BdAddr, BD_ADDR_LEN};
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tracing::{debug, warn};

use crate::packet::FilterResponseCode;

/// Default number of protocol-type ranges accepted from a peer.
pub const DEFAULT_NET_FILTER_CAPACITY: usize = 8;
/// Default number of multicast ranges accepted from a peer.
pub const DEFAULT_MULTICAST_FILTER_CAPACITY: usize = 8;

/// An inclusive range carried in a filter-set message.
pub trait FilterRange: Copy + fmt::Debug {
    type Key: Ord + Copy + fmt::Debug;

    /// Encoded size of one range (start and end).
    const WIRE_LEN: usize;

    fn bounds(&self) -> (Self::Key, Self::Key);

    /// Decode one range from exactly [`WIRE_LEN`](Self::WIRE_LEN) bytes.
    fn decode(entry: &[u8]) -> Option<Self>;

    fn encode(&self, dst: &mut BytesMut);

    fn is_valid(&self) -> bool {
        let (start, end) = self.bounds();
        start <= end
    }

    fn contains(&self, key: &Self::Key) -> bool {
        let (start, end) = self.bounds();
        start <= *key && *key <= end
    }
}

/// Inclusive range of Ethernet protocol types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetTypeRange {
    pub start: u16,
    pub end: u16,
}

impl NetTypeRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub const fn single(protocol: u16) -> Self {
        Self::new(protocol, protocol)
    }
}

impl FilterRange for NetTypeRange {
    type Key = u16;
    const WIRE_LEN: usize = 4;

    fn bounds(&self) -> (u16, u16) {
        (self.start, self.end)
    }

    fn decode(entry: &[u8]) -> Option<Self> {
        Some(Self::new(read_u16_be(entry, 0)?, read_u16_be(entry, 2)?))
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(self.start);
        dst.put_u16(self.end);
    }
}

/// Inclusive range of multicast addresses, compared byte-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MulticastRange {
    pub start: BdAddr,
    pub end: BdAddr,
}

impl MulticastRange {
    pub const fn new(start: BdAddr, end: BdAddr) -> Self {
        Self { start, end }
    }
}

impl FilterRange for MulticastRange {
    type Key = BdAddr;
    const WIRE_LEN: usize = 2 * BD_ADDR_LEN;

    fn bounds(&self) -> (BdAddr, BdAddr) {
        (self.start, self.end)
    }

    fn decode(entry: &[u8]) -> Option<Self> {
        let start = BdAddr::from_slice(entry.get(..BD_ADDR_LEN)?).ok()?;
        let end = entry.get(BD_ADDR_LEN..Self::WIRE_LEN)?;
        let end = BdAddr::from_slice(end).ok()?;
        Some(Self::new(start, end))
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(self.start.as_bytes());
        dst.put_slice(self.end.as_bytes());
    }
}

/// How invalid ranges in a filter-set message are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterUpdatePolicy {
    /// Drop each invalid range, install the rest, answer "invalid range".
    #[default]
    Lenient,
    /// Reject the whole update if any range is invalid.
    Strict,
}

/// A bounded list of filter ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterList<R> {
    ranges: Vec<R>,
    capacity: usize,
}

pub type NetTypeFilter = FilterList<NetTypeRange>;
pub type MulticastFilter = FilterList<MulticastRange>;

impl<R: FilterRange> FilterList<R> {
    pub fn new(capacity: usize) -> Self {
        Self {
            ranges: Vec::new(),
            capacity,
        }
    }

    pub fn ranges(&self) -> &[R] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when the list is empty or some range contains `key`.
    pub fn admits(&self, key: &R::Key) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(key))
    }

    /// Replace the list with `ranges` from a filter-set message.
    ///
    /// The replacement is built completely before it is installed; when the
    /// response is "too many filters" (or any failure under
    /// [`FilterUpdatePolicy::Strict`]) the previous list stays in force.
    pub fn rebuild(&mut self, ranges: &[R], policy: FilterUpdatePolicy) -> FilterResponseCode {
        if ranges.len() > self.capacity {
            debug!(
                requested = ranges.len(),
                capacity = self.capacity,
                "filter update rejected: too many ranges"
            );
            return FilterResponseCode::TOO_MANY_FILTERS;
        }

        let mut code = FilterResponseCode::SUCCESS;
        let mut next = Vec::with_capacity(ranges.len());
        for range in ranges {
            if range.is_valid() {
                next.push(*range);
            } else {
                warn!(?range, "ignoring invalid filter range");
                code = FilterResponseCode::INVALID_RANGE;
            }
        }

        if policy == FilterUpdatePolicy::Strict && !code.is_success() {
            return code;
        }

        debug!(installed = next.len(), "filter list replaced");
        self.ranges = next;
        code
    }
}

impl MulticastFilter {
    /// Multicast filtering only applies to group destinations.
    pub fn admits_destination(&self, dst: &BdAddr) -> bool {
        !dst.is_multicast() || self.admits(dst)
    }
}
