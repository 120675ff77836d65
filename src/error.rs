use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to write config file: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Seed resolution failed: no usable seed addresses")]
    NoSeeds,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Structural failure while decoding a message payload.
///
/// A parser that returns this never yields a partial record; the dispatcher
/// drops the frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of payload reading {field}: needed {needed} bytes, {remaining} left")]
    Underrun {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("{field}: declared count {count} cannot fit in {remaining} remaining bytes")]
    LengthOverflow {
        field: &'static str,
        count: u64,
        remaining: usize,
    },

    #[error("{0} trailing bytes after end of message")]
    TrailingBytes(usize),

    #[error("address record must be 18, 26 or 30 bytes, got {0}")]
    AddressWidth(usize),
}

/// Failure delivered to a `getdata` requester through its completion channel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    #[error("Not Found")]
    NotFound,

    #[error("Peer unresponsive")]
    PeerUnresponsive,

    #[error("Shutdown in progress")]
    Shutdown,

    #[error("Peer is not active")]
    PeerNotActive,

    #[error("Peer removed before the request resolved")]
    PeerRemoved,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("bad magic: expected {expected:#010x}, got {got:#010x}")]
    BadMagic { expected: u32, got: u32 },

    #[error("payload too large: {0} bytes")]
    TooLarge(u32),

    #[error("checksum mismatch for {command}")]
    Checksum { command: String },

    #[error("command name is not valid ASCII")]
    BadCommand,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
