use std::fmt;

/// Command names this node knows about. Anything else is carried verbatim in
/// [`Command::Other`] and passed through to subscribers undecoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Version,
    Verack,
    Addr,
    GetAddr,
    Alert,
    GetBlocks,
    GetHeaders,
    Headers,
    Inv,
    GetData,
    NotFound,
    Ping,
    Pong,
    Tx,
    Block,
    Other(String),
}

impl Command {
    /// Every named command, for building lookup tables.
    pub const KNOWN: [Command; 15] = [
        Command::Version,
        Command::Verack,
        Command::Addr,
        Command::GetAddr,
        Command::Alert,
        Command::GetBlocks,
        Command::GetHeaders,
        Command::Headers,
        Command::Inv,
        Command::GetData,
        Command::NotFound,
        Command::Ping,
        Command::Pong,
        Command::Tx,
        Command::Block,
    ];

    pub fn from_name(name: &str) -> Self {
        match name {
            "version" => Command::Version,
            "verack" => Command::Verack,
            "addr" => Command::Addr,
            "getaddr" => Command::GetAddr,
            "alert" => Command::Alert,
            "getblocks" => Command::GetBlocks,
            "getheaders" => Command::GetHeaders,
            "headers" => Command::Headers,
            "inv" => Command::Inv,
            "getdata" => Command::GetData,
            "notfound" => Command::NotFound,
            "ping" => Command::Ping,
            "pong" => Command::Pong,
            "tx" => Command::Tx,
            "block" => Command::Block,
            other => Command::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Addr => "addr",
            Command::GetAddr => "getaddr",
            Command::Alert => "alert",
            Command::GetBlocks => "getblocks",
            Command::GetHeaders => "getheaders",
            Command::Headers => "headers",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::NotFound => "notfound",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::Tx => "tx",
            Command::Block => "block",
            Command::Other(name) => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
