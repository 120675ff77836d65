//! Decoded message records.
//!
//! Every record can be written back with the [`PayloadWriter`]; the outbound
//! `version`, `getdata` and `pong` payloads are built this way.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::wire::address::{AddressForm, EndpointRecord};
use crate::wire::writer::PayloadWriter;

pub type Hash256 = [u8; 32];

/// Seconds since the epoch as a UTC timestamp.
pub fn unix_time(secs: u32) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs as i64, 0).unwrap_or_default()
}

/// Display form of a hash: byte-reversed hex, as block explorers show it.
pub fn hash_hex(hash: &Hash256) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Advertised service bits (`NODE_NETWORK` = 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Services(pub u64);

impl Services {
    pub const NODE_NETWORK: Services = Services(1);

    pub fn contains(self, other: Services) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A 64-bit wire integer. Values with a zero high word are exposed as a
/// plain number; anything wider is kept as the original little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireU64 {
    Small(u32),
    Raw([u8; 8]),
}

impl WireU64 {
    pub fn from_le_bytes(raw: [u8; 8]) -> Self {
        if raw[4..] == [0, 0, 0, 0] {
            WireU64::Small(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        } else {
            WireU64::Raw(raw)
        }
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        match self {
            WireU64::Small(v) => (v as u64).to_le_bytes(),
            WireU64::Raw(raw) => raw,
        }
    }
}

/// A 64-bit wire timestamp; same split as [`WireU64`], with the small case
/// read as Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTime {
    At(DateTime<Utc>),
    Raw([u8; 8]),
}

impl WireTime {
    pub fn from_le_bytes(raw: [u8; 8]) -> Self {
        match WireU64::from_le_bytes(raw) {
            WireU64::Small(secs) => WireTime::At(unix_time(secs)),
            WireU64::Raw(raw) => WireTime::Raw(raw),
        }
    }

    pub fn now() -> Self {
        WireTime::At(Utc::now())
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        match self {
            WireTime::At(t) => (t.timestamp() as u64).to_le_bytes(),
            WireTime::Raw(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryKind {
    Error,
    Transaction,
    Block,
    Unknown(u32),
}

impl InventoryKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => InventoryKind::Error,
            1 => InventoryKind::Transaction,
            2 => InventoryKind::Block,
            other => InventoryKind::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            InventoryKind::Error => 0,
            InventoryKind::Transaction => 1,
            InventoryKind::Block => 2,
            InventoryKind::Unknown(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InventoryKind::Error => "error",
            InventoryKind::Transaction => "transaction",
            InventoryKind::Block => "block",
            InventoryKind::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InventoryItem {
    pub kind: InventoryKind,
    pub hash: Hash256,
}

impl InventoryItem {
    pub const WIRE_LEN: usize = 36;

    pub fn transaction(hash: Hash256) -> Self {
        Self {
            kind: InventoryKind::Transaction,
            hash,
        }
    }

    pub fn block(hash: Hash256) -> Self {
        Self {
            kind: InventoryKind::Block,
            hash,
        }
    }
}

/// `inv`, `notfound` and `getdata` share this layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvMessage {
    pub items: Vec<InventoryItem>,
}

impl InvMessage {
    pub fn write(&self, w: &mut PayloadWriter) {
        w.put_var_int(self.items.len() as u64);
        for item in &self.items {
            w.put_u32(item.kind.code()).put(&item.hash);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(9 + self.items.len() * InventoryItem::WIRE_LEN);
        self.write(&mut w);
        w.into_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: u32,
    pub services: Services,
    pub time: WireTime,
    pub addr_recv: EndpointRecord,
    pub addr_from: EndpointRecord,
    pub nonce: [u8; 8],
    pub client: String,
    pub height: u32,
    pub relay: Option<bool>,
}

impl VersionMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(86 + self.client.len());
        w.put_u32(self.version)
            .put_u64(self.services.0)
            .put(&self.time.to_le_bytes());
        self.addr_recv.write(&mut w, AddressForm::WithServices);
        self.addr_from.write(&mut w, AddressForm::WithServices);
        w.put(&self.nonce)
            .put_var_string(&self.client)
            .put_u32(self.height);
        if let Some(relay) = self.relay {
            w.put_u8(relay as u8);
        }
        w.into_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrMessage {
    pub addrs: Vec<EndpointRecord>,
}

impl AddrMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(9 + self.addrs.len() * 30);
        w.put_var_int(self.addrs.len() as u64);
        for addr in &self.addrs {
            addr.write(&mut w, AddressForm::Timestamped);
        }
        w.into_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub signature: Vec<u8>,
    pub version: u32,
    pub relay_until: WireTime,
    pub expiration: WireTime,
    pub id: u32,
    pub cancel: u32,
    pub cancel_set: Vec<u32>,
    pub min_version: u32,
    pub max_version: u32,
    pub subversion_set: Vec<String>,
    pub priority: u32,
    pub comment: String,
    pub status_bar: String,
    pub reserved: Vec<u8>,
}

impl AlertMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = PayloadWriter::new();
        body.put_u32(self.version)
            .put(&self.relay_until.to_le_bytes())
            .put(&self.expiration.to_le_bytes())
            .put_u32(self.id)
            .put_u32(self.cancel)
            .put_var_int(self.cancel_set.len() as u64);
        for cancel in &self.cancel_set {
            body.put_u32(*cancel);
        }
        body.put_u32(self.min_version)
            .put_u32(self.max_version)
            .put_var_int(self.subversion_set.len() as u64);
        for sub in &self.subversion_set {
            body.put_var_string(sub);
        }
        body.put_u32(self.priority)
            .put_var_string(&self.comment)
            .put_var_string(&self.status_bar)
            .put_var_bytes(&self.reserved);

        let mut w = PayloadWriter::new();
        w.put_var_bytes(&body.into_vec())
            .put_var_bytes(&self.signature);
        w.into_vec()
    }
}

/// `getblocks` and `getheaders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: u32,
    pub locator: Vec<Hash256>,
    pub hash_stop: Hash256,
}

impl GetBlocksMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(4 + 9 + 32 * (self.locator.len() + 1));
        w.put_u32(self.version)
            .put_var_int(self.locator.len() as u64);
        for hash in &self.locator {
            w.put(hash);
        }
        w.put(&self.hash_stop);
        w.into_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: DateTime<Utc>,
    pub bits: u32,
    pub nonce: [u8; 4],
    pub txn_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersMessage {
    pub headers: Vec<BlockHeader>,
}

impl HeadersMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(9 + self.headers.len() * 81);
        w.put_var_int(self.headers.len() as u64);
        for h in &self.headers {
            w.put_u32(h.version)
                .put(&h.prev_block)
                .put(&h.merkle_root)
                .put_u32(h.timestamp.timestamp() as u32)
                .put_u32(h.bits)
                .put(&h.nonce)
                .put_var_int(h.txn_count);
        }
        w.into_vec()
    }
}

/// `ping` and `pong`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMessage {
    pub nonce: [u8; 8],
}

impl PingMessage {
    pub fn encode(&self) -> Vec<u8> {
        self.nonce.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prev_out: OutPoint,
    pub script: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: WireU64,
    pub script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    /// Double SHA-256 of `raw`.
    pub hash: Hash256,
    /// The payload exactly as received, for identity and re-relay.
    pub raw: Bytes,
}

impl Transaction {
    pub fn txid(&self) -> String {
        hash_hex(&self.hash)
    }

    /// Re-serialize from the structured fields (not from `raw`).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(self.raw.len());
        w.put_u32(self.version)
            .put_var_int(self.inputs.len() as u64);
        for input in &self.inputs {
            w.put(&input.prev_out.hash)
                .put_u32(input.prev_out.index)
                .put_var_bytes(&input.script)
                .put_u32(input.sequence);
        }
        w.put_var_int(self.outputs.len() as u64);
        for output in &self.outputs {
            w.put(&output.value.to_le_bytes())
                .put_var_bytes(&output.script);
        }
        w.put_u32(self.lock_time);
        w.into_vec()
    }
}
