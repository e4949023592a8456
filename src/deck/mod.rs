//! Controller host side: wire protocol, transport, instance registry and dispatch.

pub mod protocol;
pub mod registry;
pub mod router;
pub mod settings;
pub mod transport;

pub use protocol::{ActionKind, InboundEvent, OutboundCommand};
pub use registry::{ButtonInstance, InstanceRegistry, RegistryHandle};
pub use router::MessageRouter;
pub use settings::ButtonSettings;
pub use transport::{
    ConnectParams, ConnectionStatus, Delivery, Dialer, Outbox, ReconnectPolicy, TransportClient,
    WebSocketDialer,
};
