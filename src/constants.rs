//! Protocol and timing constants.
//!
//! Everything the session and the pool treat as a fixed number lives here;
//! the user-tunable values have their defaults in `config.rs`.

/// Bitcoin network parameters
pub mod protocol {
    /// Mainnet magic value (`F9 BE B4 D9` on the wire).
    ///
    /// Other networks:
    /// - Testnet3: 0x0709110B
    /// - Regtest:  0xDAB5BFFA
    /// - Signet:   0x40CF030A
    pub const MAIN_NET_MAGIC: u32 = 0xD9B4BEF9;

    pub const DEFAULT_PORT: u16 = 8333;

    /// Advertised protocol version. Kept below 70001 so peers do not expect
    /// a relay flag in our `version`.
    pub const PROTOCOL_VERSION: u32 = 70000;

    /// `NODE_NETWORK`
    pub const DEFAULT_SERVICES: u64 = 1;

    pub const DNS_SEEDS: &[&str] = &[
        "seed.bitcoin.sipa.be",
        "dnsseed.bluematt.me",
        "seed.bitcoin.jonasschnelli.ch",
        "seed.btc.petertodd.net",
        "seed.bitcoin.sprovoost.nl",
        "dnsseed.emzy.de",
    ];
}

/// Handshake and peer discovery timing
pub mod handshake {
    use std::time::Duration;

    /// How long a new connection has to send its `version`.
    pub const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

    /// How long a peer has to answer our `version` with `verack`.
    pub const VERACK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Delay between the first active peer and the first `getaddr` round.
    pub const DISCOVERY_GRACE: Duration = Duration::from_secs(2);

    pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);

    /// Peers asked for addresses per discovery round.
    pub const DISCOVERY_SAMPLE: usize = 5;
}

/// `getdata` batching
pub mod fetch {
    use std::time::Duration;

    /// Quiet period before a partial batch is sent.
    pub const DEBOUNCE: Duration = Duration::from_secs(1);

    /// A batch this large is sent without waiting for the quiet period.
    pub const BATCH_LIMIT: usize = 50;

    /// How long a peer has to answer a `getdata` in full.
    pub const WATCHDOG: Duration = Duration::from_secs(30);
}

/// Connection pool limits
pub mod pool {
    use std::time::Duration;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// How often the pool tops up outbound connections.
    pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);

    /// Outbound dials started per maintenance tick.
    pub const DIAL_BATCH: usize = 8;

    /// Candidate addresses kept for dialing.
    pub const MAX_CANDIDATES: usize = 2_000;
}
