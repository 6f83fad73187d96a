//! Connection transport for Hearth.
//!
//! Each accepted websocket gets a [`MessagePump`]: a read loop and a write
//! loop running as two tasks, multiplexing application frames with the
//! keepalive protocol and the close handshake. The application sees the
//! connection through the [`User`] capability set, built per connection by
//! a constructor and reachable afterwards via [`UserBase`] handles.

mod error;
mod pump;
mod user;

pub use error::TransportError;
pub use pump::{MessagePump, PumpConfig};
pub use user::{User, UserBase};
