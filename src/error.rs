use thiserror::Error;

use crate::measurement::DecodeError;
use crate::state::LinkState;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Advertisement scanning could not be started or stopped.
    #[error("scan failed: {0}")]
    Scan(#[source] btleplug::Error),

    /// The requested Bluetooth adapter does not exist.
    #[error("no bluetooth adapter available at the requested index")]
    AdapterNotFound,

    /// The scan ended without a matching device.
    #[error("scan ended before a matching device was found")]
    DeviceNotFound,

    /// Connecting to the device or discovering its services failed.
    #[error("connection failed: {0}")]
    Connection(#[source] btleplug::Error),

    /// Discovery completed without the Blood Pressure Measurement characteristic.
    #[error("blood pressure measurement characteristic not found on device")]
    CharacteristicNotFound,

    /// The stack reported a fault on an active subscription.
    #[error("transport fault: {0}")]
    Transport(#[source] btleplug::Error),

    /// A notification payload failed validation or decoding.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An operation was attempted in a link state that does not allow it,
    /// e.g. subscribing before discovery has completed.
    #[error("illegal link state transition from {from} to {to}")]
    IllegalTransition { from: LinkState, to: LinkState },
}
