use std::time::Duration;

use bnepkit_frame::{
    FilterUpdatePolicy, DEFAULT_MULTICAST_FILTER_CAPACITY, DEFAULT_NET_FILTER_CAPACITY,
};

/// Handshake timeout for setup request/response.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Setup requests resent after a timeout before giving up.
pub const DEFAULT_MAX_RETRIES: u8 = 1;
/// Largest protocol-type filter list the application may send.
pub const MAX_NET_FILTER_OUT: usize = 421;
/// Largest multicast filter list the application may send.
pub const MAX_MULTICAST_FILTER_OUT: usize = 140;
/// Concurrent channels per engine.
pub const DEFAULT_MAX_CHANNELS: usize = 8;

/// Configuration for a [`Bnep`](crate::Bnep) engine.
///
/// ```
/// use std::time::Duration;
/// use bnepkit_peer::EngineConfig;
///
/// let config = EngineConfig {
///     connection_timeout: Duration::from_secs(3),
///     ..Default::default()
/// };
/// assert_eq!(config.max_retries, 1);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time allowed for the setup handshake. Default: 10 s.
    pub connection_timeout: Duration,
    /// Setup request retries after a timeout. Default: 1.
    pub max_retries: u8,
    /// Protocol-type ranges accepted from a peer. Default: 8.
    pub net_filter_capacity: usize,
    /// Multicast ranges accepted from a peer. Default: 8.
    pub multicast_filter_capacity: usize,
    /// Protocol-type ranges the application may send. Default: 421.
    pub max_net_filter_out: usize,
    /// Multicast ranges the application may send. Default: 140.
    pub max_multicast_filter_out: usize,
    /// Channel table size; further incoming connections are declined.
    /// Default: 8.
    pub max_channels: usize,
    /// Treatment of invalid ranges in received filter-set messages.
    pub filter_policy: FilterUpdatePolicy,
    /// MTU registered with the transport for the BNEP PSM.
    pub service_mtu: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            net_filter_capacity: DEFAULT_NET_FILTER_CAPACITY,
            multicast_filter_capacity: DEFAULT_MULTICAST_FILTER_CAPACITY,
            max_net_filter_out: MAX_NET_FILTER_OUT,
            max_multicast_filter_out: MAX_MULTICAST_FILTER_OUT,
            max_channels: DEFAULT_MAX_CHANNELS,
            filter_policy: FilterUpdatePolicy::Lenient,
            service_mtu: u16::MAX,
        }
    }
}
