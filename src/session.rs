//! Connection establishment and session lifetime.
//!
//! A session is one physical connection to one device handle. Establishing
//! it runs a strict sequence: connect, wait out the settling delay, discover
//! services and characteristics, then register the disconnect watcher.
//!
//! The settling delay works around a radio-stack race: service discovery
//! requested immediately after the link comes up is unreliable on this
//! hardware. It is injected through [`SessionConfig`] rather than hardcoded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Peripheral as _};
use btleplug::platform::Peripheral;
use futures::{Stream, StreamExt};
use stream_cancel::{Trigger, Valved};

use crate::state::{LinkState, LinkStateMachine};
use crate::{Device, Error, MeasurementStream};

/// Delay between connection establishment and service discovery that the
/// cuff's radio stack empirically needs.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1600);

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl SessionConfig {
    /// Override the settling delay between connect and service discovery.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Link status as reported to the disconnect callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// One live, discovery-complete connection to a cuff.
///
/// Sessions are not reusable: after a disconnect, a new session must be
/// established. Only one session should be active per device handle.
pub struct ConnectionSession {
    device: Device,
    state: Arc<LinkStateMachine>,
    // Dropping the trigger cancels the disconnect watcher task.
    _disconnect_watch: Trigger,
}

impl ConnectionSession {
    /// Connects to the device, waits out the settling delay, discovers all
    /// services and characteristics, and registers `on_disconnect`.
    ///
    /// The callback is invoked at most once, when the stack reports that the
    /// link dropped. It never fires before discovery has completed.
    pub async fn establish<F>(
        device: &Device,
        config: SessionConfig,
        on_disconnect: F,
    ) -> Result<Self, Error>
    where
        F: FnOnce(ConnectionStatus) + Send + 'static,
    {
        let state = Arc::new(LinkStateMachine::new(LinkState::Found));
        state.advance(LinkState::Connecting)?;

        let peripheral = &device.peripheral;

        log::debug!("Connecting to {}", peripheral.address());

        run_link_sequence(
            config.settle_delay,
            || peripheral.connect(),
            || peripheral.discover_services(),
        )
        .await?;

        state.advance(LinkState::Connected)?;

        log::debug!("Discovery complete for {}", peripheral.address());

        let events = device.adapter().events().await.map_err(Error::Connection)?;
        let (watch, events) = Valved::new(events);

        let disconnects = Box::pin(events.filter_map(|event| async move {
            match event {
                CentralEvent::DeviceDisconnected(id) => Some(id),
                _ => None,
            }
        }));

        tokio::spawn(watch_disconnect(
            disconnects,
            peripheral.id(),
            state.clone(),
            on_disconnect,
        ));

        Ok(Self {
            device: device.clone(),
            state,
            _disconnect_watch: watch,
        })
    }

    /// Current state of the link.
    pub fn state(&self) -> LinkState {
        self.state.current()
    }

    /// Subscribe to decoded measurements from this session.
    pub async fn measurements(&self) -> Result<MeasurementStream, Error> {
        MeasurementStream::subscribe(self).await
    }

    /// Explicit teardown of the physical connection. The disconnect callback
    /// fires when the stack reports the link as dropped.
    pub async fn disconnect(&self) -> Result<(), Error> {
        self.device
            .peripheral
            .disconnect()
            .await
            .map_err(Error::Connection)
    }

    pub(crate) fn peripheral(&self) -> &Peripheral {
        &self.device.peripheral
    }

    pub(crate) fn link(&self) -> &LinkStateMachine {
        &self.state
    }
}

/// Connect, settle, discover. All three steps are mandatory and ordered;
/// discovery must not start before the settling delay has elapsed.
async fn run_link_sequence<C, CF, D, DF>(
    settle_delay: Duration,
    connect: C,
    discover: D,
) -> Result<(), Error>
where
    C: FnOnce() -> CF,
    CF: Future<Output = btleplug::Result<()>>,
    D: FnOnce() -> DF,
    DF: Future<Output = btleplug::Result<()>>,
{
    connect().await.map_err(Error::Connection)?;

    log::trace!("Link up, settling for {:?}", settle_delay);
    tokio::time::sleep(settle_delay).await;

    discover().await.map_err(Error::Connection)
}

/// Waits for the first disconnect event for `target` and delivers the
/// status callback. The callback is `FnOnce` and owned solely by this task,
/// so it cannot fire twice.
async fn watch_disconnect<S, T, F>(
    mut disconnects: S,
    target: T,
    state: Arc<LinkStateMachine>,
    on_disconnect: F,
) where
    S: Stream<Item = T> + Unpin,
    T: PartialEq,
    F: FnOnce(ConnectionStatus),
{
    while let Some(id) = disconnects.next().await {
        if id == target {
            if state.mark_disconnected() {
                log::debug!("Link dropped, notifying the caller");
                on_disconnect(ConnectionStatus::Disconnected);
            }
            return;
        }
    }
}
