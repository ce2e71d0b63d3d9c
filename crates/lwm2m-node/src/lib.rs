//! Node layer for the LwM2M exchange engine.
//!
//! Configuration, logging setup, the transport seam and the poll-loop
//! [`Driver`] that connects an exchange to it, plus a deterministic
//! simulator used by the `lwm2m-exchange-sim` binary.

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod sim;
pub mod transport;

pub use config::NodeConfig;
pub use driver::{Driver, DriverStats, PollStatus};
pub use error::NodeError;
pub use sim::{PeerSimulator, SimulationReport, run_simulation};
pub use transport::{MemoryTransport, SendStatus, Transport, TransportError};
