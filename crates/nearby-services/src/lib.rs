//! nearby-services — discovery session coordination, peer registry, and
//! connection negotiation on top of an external wireless-discovery service.

pub mod connection;
pub mod loopback;
pub mod node;
pub mod notice;
pub mod peer;
pub mod pump;
pub mod service;
pub mod session;

pub use connection::{
    AttemptId, ConnectionAttempt, ConnectionError, ConnectionManager, ConnectionStatus,
};
pub use loopback::{LoopbackDevice, LoopbackMedium};
pub use node::{DiscoveryNode, NodeCollaborators, NodeError};
pub use notice::{notice_channel, Notice, Notices};
pub use peer::{NullRenderer, PeerRecord, PeerRegistry, Renderer};
pub use pump::{EventPump, EventSink};
pub use service::{
    AttachError, AttachHandle, DiscoveryEvent, DiscoveryEvents, DiscoveryService,
    DiscoverySessionRef, NetworkEvent, NetworkEvents, NetworkInfo, NetworkNegotiator,
    NetworkRequest, NetworkSpecifier, PeerHandle, PublishConfig, PublishError, SubscribeConfig,
    SubscribeError,
};
pub use session::{DiscoveryState, SessionCoordinator, SessionFailure, SessionRole};
