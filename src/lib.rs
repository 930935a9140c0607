//! High-level BLE client for BM77 blood pressure cuffs.
//!
//! The crate finds a cuff by its advertised name, establishes a
//! discovery-complete session, and decodes every Blood Pressure Measurement
//! notification into a structured [`Measurement`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bm77::{ConnectionSession, Error, ScanConfig, Scanner, SessionConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     pretty_env_logger::init();
//!
//!     // Find the first device advertising the name "BM77"
//!     let mut scanner = Scanner::new();
//!     let device = scanner.find_device(ScanConfig::default()).await?;
//!
//!     // Connect, wait out the settling delay, discover services
//!     let session = ConnectionSession::establish(&device, SessionConfig::default(), |status| {
//!         println!("Link is now {:?}", status);
//!     })
//!     .await?;
//!
//!     // Decode measurements until the caller decides to stop
//!     let mut measurements = session.measurements().await?;
//!     while let Some(measurement) = measurements.next().await {
//!         println!("{:?}", measurement?);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, future_incompatible, nonstandard_style, rust_2018_idioms)]

pub use btleplug::api::BDAddr;

pub use device::Device;
pub use error::{Error, Result};
pub use measurement::{
    BodyMovement, CuffFit, DecodeError, HsdStatus, IrregularPulse, Measurement,
    MeasurementPosition, PulseRateRange, StatusFlags, FRAME_LEN,
};
pub use scanner::{ScanConfig, Scanner};
pub use session::{
    ConnectionSession, ConnectionStatus, SessionConfig, DEFAULT_SETTLE_DELAY,
};
pub use state::LinkState;
pub use stream::MeasurementStream;

mod device;
mod error;
mod measurement;
mod scanner;
mod session;
mod state;
mod stream;

pub mod common;
