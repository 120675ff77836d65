use bytes::Bytes;

use crate::wire::types::{
    AddrMessage, AlertMessage, GetBlocksMessage, HeadersMessage, InvMessage, PingMessage,
    Transaction, VersionMessage,
};

/// What the dispatcher publishes for one inbound frame: a decoded record, or
/// the untouched payload for commands without a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Version(VersionMessage),
    Addr(AddrMessage),
    Alert(AlertMessage),
    GetBlocks(GetBlocksMessage),
    GetHeaders(GetBlocksMessage),
    Headers(HeadersMessage),
    Inv(InvMessage),
    NotFound(InvMessage),
    Ping(PingMessage),
    Pong(PingMessage),
    Tx(Transaction),
    Raw(Bytes),
}

impl Payload {
    pub fn is_raw(&self) -> bool {
        matches!(self, Payload::Raw(_))
    }
}
