//! Switchboard Fabric - Low-level transport and codec layer
//!
//! Provides transport abstractions (TCP, Unix sockets), the bincode codec,
//! the frame vocabulary spoken on call channels, and a connectivity probe.
//!
//! # Example
//!
//! ```no_run
//! use switchboard_fabric::{Channel, codec::BincodeCodec};
//! use switchboard_fabric::frame::{ClientFrame, ServerFrame};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let addr = "127.0.0.1:8731".parse()?;
//! let mut channel = Channel::tcp(addr, BincodeCodec::default()).await?;
//! let request = ClientFrame::Call { id: 1, operation: "IsAlive".into(), args: vec![] };
//! let _reply: ServerFrame = channel.exchange(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod frame;
pub mod probe;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use error::{Error, Result};
pub use probe::has_tcp_connection;
