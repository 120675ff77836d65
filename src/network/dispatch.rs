//! Inbound message routing.
//!
//! Each known command resolves once, when the session is built, to a
//! [`Route`]: an optional decoder and an optional handler. Commands without
//! a decoder are published raw, so subscribers can consume message types
//! this node does not understand.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::network::events::{CommandEvent, NetworkEvent};
use crate::network::fetch::{FetchResponse, FetchedObject};
use crate::network::pool::PeerId;
use crate::network::session::NetworkSession;
use crate::wire::parse;
use crate::wire::types::PingMessage;
use crate::wire::{Command, Payload};

/// Whether a decoded message is published after its handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

pub type ParseFn = fn(&[u8]) -> Result<Payload, DecodeError>;
pub type HandlerFn = fn(&mut NetworkSession, PeerId, &Payload) -> Propagation;

#[derive(Clone, Copy, Default)]
pub struct Route {
    pub parse: Option<ParseFn>,
    pub handle: Option<HandlerFn>,
}

pub struct Router {
    routes: HashMap<Command, Route>,
}

impl Router {
    pub fn new() -> Self {
        let routes = Command::KNOWN
            .iter()
            .map(|command| (command.clone(), Self::route_for(command)))
            .collect();
        Self { routes }
    }

    fn route_for(command: &Command) -> Route {
        let (parse, handle): (Option<ParseFn>, Option<HandlerFn>) = match command {
            Command::Version => (
                Some(decode_version as ParseFn),
                Some(NetworkSession::handle_version as HandlerFn),
            ),
            Command::Verack => (None, Some(NetworkSession::handle_verack as HandlerFn)),
            Command::Addr => (
                Some(decode_addr as ParseFn),
                Some(NetworkSession::handle_addr as HandlerFn),
            ),
            Command::Alert => (Some(decode_alert as ParseFn), None),
            Command::GetBlocks => (Some(decode_getblocks as ParseFn), None),
            Command::GetHeaders => (Some(decode_getheaders as ParseFn), None),
            Command::Headers => (Some(decode_headers as ParseFn), None),
            Command::Inv => (
                Some(decode_inv as ParseFn),
                Some(NetworkSession::handle_inv as HandlerFn),
            ),
            Command::NotFound => (
                Some(decode_notfound as ParseFn),
                Some(NetworkSession::handle_notfound as HandlerFn),
            ),
            Command::Ping => (
                Some(decode_ping as ParseFn),
                Some(NetworkSession::handle_ping as HandlerFn),
            ),
            Command::Pong => (Some(decode_pong as ParseFn), None),
            Command::Tx => (
                Some(decode_tx as ParseFn),
                Some(NetworkSession::handle_tx as HandlerFn),
            ),
            Command::Block => (None, Some(NetworkSession::handle_block as HandlerFn)),
            Command::GetAddr | Command::GetData | Command::Other(_) => (None, None),
        };
        Route { parse, handle }
    }

    /// Unknown commands get the pass-through route.
    pub fn route(&self, command: &Command) -> Route {
        self.routes.get(command).copied().unwrap_or_default()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_version(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_version(data).map(Payload::Version)
}

fn decode_addr(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_addr(data).map(Payload::Addr)
}

fn decode_alert(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_alert(data).map(Payload::Alert)
}

fn decode_getblocks(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_getblocks(data).map(Payload::GetBlocks)
}

fn decode_getheaders(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_getblocks(data).map(Payload::GetHeaders)
}

fn decode_headers(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_headers(data).map(Payload::Headers)
}

fn decode_inv(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_inv(data).map(Payload::Inv)
}

fn decode_notfound(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_inv(data).map(Payload::NotFound)
}

fn decode_ping(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_ping(data).map(Payload::Ping)
}

fn decode_pong(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_ping(data).map(Payload::Pong)
}

fn decode_tx(data: &[u8]) -> Result<Payload, DecodeError> {
    parse::parse_tx(data).map(Payload::Tx)
}

impl NetworkSession {
    /// Decode, handle and publish one inbound message.
    pub(crate) fn dispatch(&mut self, peer: PeerId, command: Command, payload: Bytes) {
        let Some(peer_ref) = self.peers.peer_ref(peer) else {
            trace!("{} from unknown {} dropped", command, peer);
            return;
        };

        let route = self.router.route(&command);
        let decoded = match route.parse {
            Some(parse) => match parse(&payload) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!("malformed {} from {}: {}", command, peer_ref.addr, e);
                    return;
                }
            },
            None => Payload::Raw(payload),
        };

        if let Some(handle) = route.handle {
            if handle(self, peer, &decoded) == Propagation::Stop {
                return;
            }
        }

        self.events.publish(NetworkEvent::Message {
            peer: peer_ref,
            command: command.clone(),
            payload: decoded.clone(),
        });
        self.events.publish_command(
            &command,
            CommandEvent {
                peer: peer_ref,
                payload: decoded,
            },
        );
    }

    fn handle_addr(&mut self, _peer: PeerId, payload: &Payload) -> Propagation {
        if let Payload::Addr(addr) = payload {
            if !addr.addrs.is_empty() {
                self.pool.add_candidates(addr.addrs.clone());
            }
        }
        Propagation::Continue
    }

    fn handle_inv(&mut self, peer: PeerId, payload: &Payload) -> Propagation {
        let (Payload::Inv(inv), Some(peer_ref)) = (payload, self.peers.peer_ref(peer)) else {
            return Propagation::Continue;
        };
        for item in &inv.items {
            self.events.publish(NetworkEvent::Inventory {
                peer: peer_ref,
                item: *item,
            });
        }
        Propagation::Continue
    }

    fn handle_ping(&mut self, peer: PeerId, payload: &Payload) -> Propagation {
        if let Payload::Ping(PingMessage { nonce }) = payload {
            self.pool
                .send(peer, Command::Pong, PingMessage { nonce: *nonce }.encode());
        }
        Propagation::Continue
    }

    fn handle_notfound(&mut self, peer: PeerId, payload: &Payload) -> Propagation {
        if let Payload::NotFound(inv) = payload {
            self.on_fetch_response(peer, FetchResponse::NotFound(inv.items.len()));
        }
        Propagation::Continue
    }

    fn handle_tx(&mut self, peer: PeerId, payload: &Payload) -> Propagation {
        if let Payload::Tx(tx) = payload {
            self.on_fetch_response(peer, FetchResponse::Object(FetchedObject::Tx(tx.clone())));
        }
        Propagation::Continue
    }

    fn handle_block(&mut self, peer: PeerId, payload: &Payload) -> Propagation {
        if let Payload::Raw(block) = payload {
            self.on_fetch_response(
                peer,
                FetchResponse::Object(FetchedObject::Block(block.clone())),
            );
        }
        Propagation::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_command_has_a_route() {
        let router = Router::new();
        for command in Command::KNOWN.iter() {
            assert!(router.routes.contains_key(command), "{} missing", command);
        }
    }

    #[test]
    fn test_raw_commands() {
        let router = Router::new();
        assert!(router.route(&Command::Verack).parse.is_none());
        assert!(router.route(&Command::Verack).handle.is_some());
        assert!(router.route(&Command::Block).parse.is_none());
        assert!(router.route(&Command::GetAddr).handle.is_none());

        let unknown = router.route(&Command::Other("sendheaders".into()));
        assert!(unknown.parse.is_none());
        assert!(unknown.handle.is_none());
    }

    #[test]
    fn test_getheaders_decodes_like_getblocks() {
        let mut payload = vec![0x71, 0x11, 0x01, 0x00, 0x01];
        payload.extend_from_slice(&[0xaa; 32]);
        payload.extend_from_slice(&[0u8; 32]);

        let parse = Router::new().route(&Command::GetHeaders).parse.unwrap();
        match parse(&payload).unwrap() {
            Payload::GetHeaders(msg) => {
                assert_eq!(msg.version, 70001);
                assert_eq!(msg.locator, vec![[0xaa; 32]]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_malformed_ping_is_an_error() {
        let parse = Router::new().route(&Command::Ping).parse.unwrap();
        assert!(parse(&[1, 2, 3]).is_err());
    }
}
