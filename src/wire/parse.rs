//! One decoder per command.
//!
//! Parsers read strictly front to back through a [`Cursor`] and either return
//! a complete record or a [`DecodeError`]. Bytes after the last field are
//! ignored, since newer protocol versions append fields. A `tx` keeps the
//! whole payload as its raw copy and hashes all of it.

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::DecodeError;
use crate::wire::address::{AddressForm, EndpointRecord};
use crate::wire::cursor::Cursor;
use crate::wire::types::{
    unix_time, AddrMessage, AlertMessage, BlockHeader, GetBlocksMessage, HeadersMessage,
    InvMessage, InventoryItem, InventoryKind, OutPoint, PingMessage, Services, Transaction, TxIn,
    TxOut, WireTime, WireU64, VersionMessage,
};

/// Smallest possible header entry: 80 header bytes plus a one-byte count.
const MIN_HEADER_LEN: usize = 81;
/// Outpoint, empty script length byte, sequence.
const MIN_TXIN_LEN: usize = 41;
/// Value plus empty script length byte.
const MIN_TXOUT_LEN: usize = 9;

pub fn parse_version(data: &[u8]) -> Result<VersionMessage, DecodeError> {
    let mut c = Cursor::new(data);

    let version = c.read_u32("version")?;
    let services = Services(c.read_u64("services")?);
    let time = WireTime::from_le_bytes(c.array("timestamp")?);
    let addr_recv = EndpointRecord::read(&mut c, AddressForm::WithServices)?;
    let addr_from = EndpointRecord::read(&mut c, AddressForm::WithServices)?;
    let nonce = c.array("nonce")?;
    let client = c.read_var_string("user agent")?;
    let height = c.read_u32("start height")?;
    let relay = if c.is_empty() {
        None
    } else {
        Some(c.read_u8("relay")? != 0)
    };

    Ok(VersionMessage {
        version,
        services,
        time,
        addr_recv,
        addr_from,
        nonce,
        client,
        height,
        relay,
    })
}

pub fn parse_addr(data: &[u8]) -> Result<AddrMessage, DecodeError> {
    let mut c = Cursor::new(data);
    let count = c.read_count(AddressForm::Timestamped.width(), "addr count")?;
    let mut addrs = Vec::with_capacity(count);
    for _ in 0..count {
        addrs.push(EndpointRecord::read(&mut c, AddressForm::Timestamped)?);
    }
    Ok(AddrMessage { addrs })
}

pub fn parse_alert(data: &[u8]) -> Result<AlertMessage, DecodeError> {
    let mut outer = Cursor::new(data);
    let body = outer.read_var_bytes("alert payload")?;
    let signature = outer.read_var_bytes("alert signature")?.to_vec();

    let mut c = Cursor::new(body);
    let version = c.read_u32("alert version")?;
    let relay_until = WireTime::from_le_bytes(c.array("relay until")?);
    let expiration = WireTime::from_le_bytes(c.array("expiration")?);
    let id = c.read_u32("alert id")?;
    let cancel = c.read_u32("cancel")?;

    let n = c.read_count(4, "cancel set")?;
    let mut cancel_set = Vec::with_capacity(n);
    for _ in 0..n {
        cancel_set.push(c.read_u32("cancel set entry")?);
    }

    let min_version = c.read_u32("min version")?;
    let max_version = c.read_u32("max version")?;

    let n = c.read_count(1, "subversion set")?;
    let mut subversion_set = Vec::with_capacity(n);
    for _ in 0..n {
        subversion_set.push(c.read_var_string("subversion")?);
    }

    let priority = c.read_u32("priority")?;
    let comment = c.read_var_string("comment")?;
    let status_bar = c.read_var_string("status bar")?;
    let reserved = c.read_var_bytes("reserved")?.to_vec();

    Ok(AlertMessage {
        signature,
        version,
        relay_until,
        expiration,
        id,
        cancel,
        cancel_set,
        min_version,
        max_version,
        subversion_set,
        priority,
        comment,
        status_bar,
        reserved,
    })
}

/// Also used for `getheaders`, which has the same layout.
pub fn parse_getblocks(data: &[u8]) -> Result<GetBlocksMessage, DecodeError> {
    let mut c = Cursor::new(data);
    let version = c.read_u32("version")?;
    let count = c.read_count(32, "locator count")?;
    let mut locator = Vec::with_capacity(count);
    for _ in 0..count {
        locator.push(c.array("locator hash")?);
    }
    let hash_stop = c.array("hash stop")?;
    Ok(GetBlocksMessage {
        version,
        locator,
        hash_stop,
    })
}

pub fn parse_headers(data: &[u8]) -> Result<HeadersMessage, DecodeError> {
    let mut c = Cursor::new(data);
    let count = c.read_count(MIN_HEADER_LEN, "headers count")?;
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        headers.push(BlockHeader {
            version: c.read_u32("header version")?,
            prev_block: c.array("prev block")?,
            merkle_root: c.array("merkle root")?,
            timestamp: unix_time(c.read_u32("header time")?),
            bits: c.read_u32("bits")?,
            nonce: c.array("header nonce")?,
            txn_count: c.read_var_int("txn count")?,
        });
    }
    Ok(HeadersMessage { headers })
}

/// Also used for `notfound` (and, on the way out, `getdata`).
pub fn parse_inv(data: &[u8]) -> Result<InvMessage, DecodeError> {
    let mut c = Cursor::new(data);
    let count = c.read_count(InventoryItem::WIRE_LEN, "inventory count")?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let kind = InventoryKind::from_code(c.read_u32("inventory type")?);
        let hash = c.array("inventory hash")?;
        items.push(InventoryItem { kind, hash });
    }
    Ok(InvMessage { items })
}

/// Also used for `pong`.
pub fn parse_ping(data: &[u8]) -> Result<PingMessage, DecodeError> {
    let mut c = Cursor::new(data);
    let nonce = c.array("ping nonce")?;
    Ok(PingMessage { nonce })
}

pub fn parse_tx(data: &[u8]) -> Result<Transaction, DecodeError> {
    let mut c = Cursor::new(data);

    let version = c.read_u32("tx version")?;

    let n = c.read_count(MIN_TXIN_LEN, "tx in count")?;
    let mut inputs = Vec::with_capacity(n);
    for _ in 0..n {
        let prev_out = OutPoint {
            hash: c.array("outpoint hash")?,
            index: c.read_u32("outpoint index")?,
        };
        let script = c.read_var_bytes("signature script")?.to_vec();
        let sequence = c.read_u32("sequence")?;
        inputs.push(TxIn {
            prev_out,
            script,
            sequence,
        });
    }

    let n = c.read_count(MIN_TXOUT_LEN, "tx out count")?;
    let mut outputs = Vec::with_capacity(n);
    for _ in 0..n {
        let value = WireU64::from_le_bytes(c.array("tx out value")?);
        let script = c.read_var_bytes("pk script")?.to_vec();
        outputs.push(TxOut { value, script });
    }

    let lock_time = c.read_u32("lock time")?;

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
        hash: double_sha256(data),
        raw: Bytes::copy_from_slice(data),
    })
}

pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}
