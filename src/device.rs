use std::fmt;
use std::sync::Arc;

use btleplug::{
    api::{BDAddr, Peripheral as _},
    platform::{Adapter, Peripheral},
};

use crate::scanner::RadioSession;

/// Handle to a discovered cuff.
///
/// Cloning the handle does not duplicate the underlying connection; only one
/// session should be established per handle at a time.
#[derive(Clone)]
pub struct Device {
    pub(crate) session: Arc<RadioSession>,
    pub(crate) peripheral: Peripheral,
}

impl Device {
    pub(crate) fn new(session: Arc<RadioSession>, peripheral: Peripheral) -> Self {
        Self {
            session,
            peripheral,
        }
    }

    #[inline]
    pub fn address(&self) -> BDAddr {
        self.peripheral.address()
    }

    /// Signal strength
    pub async fn rssi(&self) -> Option<i16> {
        self.peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|props| props.rssi)
    }

    /// Local name of the device
    pub async fn local_name(&self) -> Option<String> {
        self.peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|props| props.local_name)
    }

    pub(crate) fn adapter(&self) -> &Adapter {
        &self.session.adapter
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address())
            .finish()
    }
}
