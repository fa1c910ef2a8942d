//! Hub configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Upstream network membership settings.
///
/// Identity and credential are external inputs the hub accepts and keeps
/// out of the wire protocol; the controller address is what the membership
/// link actually dials.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// Network identity the hub joins under
    pub identity: String,
    /// Join credential (never logged)
    pub credential: String,
    /// Network controller address
    pub controller_addr: SocketAddr,
}

/// Hub configuration options. All static at startup.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Relay (peer/leaf) listener address
    pub relay_addr: SocketAddr,

    /// Frame ingestion listener address
    pub ingest_addr: SocketAddr,

    /// Viewer HTTP listener address
    pub viewer_addr: SocketAddr,

    /// Maximum simultaneously occupied relay slots
    pub max_slots: usize,

    /// Main loop scheduling tick (prune + supervisor cadence)
    pub tick_interval: Duration,

    /// Constant retry interval for supervised links
    pub retry_interval: Duration,

    /// Per-viewer pacing interval between emitted parts
    pub viewer_interval: Duration,

    /// Bound on frame store guard acquisition for snapshots
    pub snapshot_timeout: Duration,

    /// Timeout for outbound connect attempts
    pub connect_timeout: Duration,

    /// Read buffer size for relay slot reader tasks
    pub read_chunk_size: usize,

    /// Enable TCP_NODELAY on accepted and dialed sockets
    pub tcp_nodelay: bool,

    /// Optional outbound aggregation target
    pub uplink_addr: Option<SocketAddr>,

    /// Optional upstream network membership
    pub membership: Option<MembershipConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            relay_addr: "0.0.0.0:8000".parse().unwrap(),
            ingest_addr: "0.0.0.0:8001".parse().unwrap(),
            viewer_addr: "0.0.0.0:8080".parse().unwrap(),
            max_slots: 6,
            tick_interval: Duration::from_millis(250),
            retry_interval: Duration::from_secs(5),
            viewer_interval: Duration::from_millis(100),
            snapshot_timeout: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(3),
            read_chunk_size: 4096,
            tcp_nodelay: true, // Important for low latency
            uplink_addr: None,
            membership: None,
        }
    }
}

impl HubConfig {
    /// Set the relay listener address.
    pub fn relay(mut self, addr: SocketAddr) -> Self {
        self.relay_addr = addr;
        self
    }

    /// Set the ingestion listener address.
    pub fn ingest(mut self, addr: SocketAddr) -> Self {
        self.ingest_addr = addr;
        self
    }

    /// Set the viewer listener address.
    pub fn viewer(mut self, addr: SocketAddr) -> Self {
        self.viewer_addr = addr;
        self
    }

    /// Set the slot table capacity.
    pub fn max_slots(mut self, max: usize) -> Self {
        self.max_slots = max;
        self
    }

    /// Set the supervised-link retry interval.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the per-viewer pacing interval.
    pub fn viewer_interval(mut self, interval: Duration) -> Self {
        self.viewer_interval = interval;
        self
    }

    /// Set the main loop tick interval.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the outbound aggregation target.
    pub fn uplink(mut self, addr: SocketAddr) -> Self {
        self.uplink_addr = Some(addr);
        self
    }

    /// Set the upstream network membership.
    pub fn membership(mut self, membership: MembershipConfig) -> Self {
        self.membership = Some(membership);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.relay_addr.port(), 8000);
        assert_eq!(config.ingest_addr.port(), 8001);
        assert_eq!(config.viewer_addr.port(), 8080);
        assert_eq!(config.max_slots, 6);
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert!(config.tcp_nodelay);
        assert!(config.uplink_addr.is_none());
        assert!(config.membership.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let relay: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let uplink: SocketAddr = "10.0.0.1:9000".parse().unwrap();

        let config = HubConfig::default()
            .relay(relay)
            .max_slots(12)
            .retry_interval(Duration::from_secs(2))
            .viewer_interval(Duration::from_millis(33))
            .uplink(uplink);

        assert_eq!(config.relay_addr, relay);
        assert_eq!(config.max_slots, 12);
        assert_eq!(config.retry_interval, Duration::from_secs(2));
        assert_eq!(config.viewer_interval, Duration::from_millis(33));
        assert_eq!(config.uplink_addr, Some(uplink));
    }

    #[test]
    fn test_membership_builder() {
        let config = HubConfig::default().membership(MembershipConfig {
            identity: "mesh-alpha".into(),
            credential: "secret".into(),
            controller_addr: "192.168.4.1:9000".parse().unwrap(),
        });

        let membership = config.membership.unwrap();
        assert_eq!(membership.identity, "mesh-alpha");
        assert_eq!(membership.controller_addr.port(), 9000);
    }
}
