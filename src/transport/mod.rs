//! Sockets: the TCP connection pool and seed lookup.

pub mod pool;
pub mod seeds;

pub use pool::{PoolConfig, TcpPool};
pub use seeds::resolve_seeds;
