//! Protocol engine: handshake, dispatch, batched fetching and discovery,
//! all driven by one [`NetworkSession`].

pub mod discovery;
pub mod dispatch;
pub mod events;
pub mod fetch;
pub mod handshake;
pub mod peer_state;
pub mod pool;
pub mod session;
pub mod timer;

pub use events::{CommandEvent, EventBus, NetworkEvent, PeerRef};
pub use fetch::{FetchResult, FetchedObject};
pub use pool::{ConnectionPool, PeerId, PoolEvent, Severity};
pub use session::{NetworkHandle, NetworkSession, SessionCommand, SessionState};
pub use timer::TimerEvent;
