use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use stream_cancel::{Trigger, Valved};
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;

use crate::state::{LinkState, LinkStateMachine};
use crate::{common, Device, Error};

pub struct ScanConfig {
    /// Index of the Bluetooth adapter to use. The first found adapter is used by default.
    adapter_index: usize,
    /// Filters the found devices based on local name.
    name_filter: Box<dyn Fn(&str) -> bool + Send + Sync>,
    /// Maximum results before the scan is stopped.
    max_results: Option<usize>,
    /// The scan is stopped when timeout duration is reached.
    timeout: Option<Duration>,
}

impl Default for ScanConfig {
    /// Matches the first device advertising the exact cuff name.
    fn default() -> Self {
        Self {
            adapter_index: 0,
            name_filter: Box::new(|name| name == common::DEVICE_NAME),
            max_results: Some(1),
            timeout: None,
        }
    }
}

impl ScanConfig {
    /// Index of bluetooth adapter to use
    pub fn adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Replace the default exact-name filter. Advertisements without a local
    /// name never pass any name filter.
    pub fn filter_by_name(mut self, func: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.name_filter = Box::new(func);
        self
    }

    /// Stop the scan after given number of matches
    pub fn stop_after_matches(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Stop the scan after given duration
    pub fn stop_after_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn matches_name(&self, name: Option<&str>) -> bool {
        name.map(|name| (self.name_filter)(name)).unwrap_or(false)
    }
}

pub(crate) struct RadioSession {
    pub(crate) _manager: Manager,
    pub(crate) adapter: Adapter,
}

pub struct Scanner {
    session: Option<Arc<RadioSession>>,
    state: Arc<LinkStateMachine>,
    event_sender: Sender<Device>,
    scan_stopper: Option<Trigger>,
    device_stream_stoppers: Arc<RwLock<Vec<Trigger>>>,
}

impl Default for Scanner {
    fn default() -> Self {
        Scanner::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(16);

        Self {
            session: None,
            state: Arc::new(LinkStateMachine::new(LinkState::Idle)),
            event_sender,
            scan_stopper: None,
            device_stream_stoppers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start scanning for the cuff.
    pub async fn start(&mut self, config: ScanConfig) -> Result<(), Error> {
        if self.session.is_some() {
            log::info!("Scanner is already started.");
            return Ok(());
        }

        let manager = Manager::new().await.map_err(Error::Scan)?;
        let mut adapters = manager.adapters().await.map_err(Error::Scan)?;

        if config.adapter_index >= adapters.len() {
            return Err(Error::AdapterNotFound);
        }

        let adapter = adapters.swap_remove(config.adapter_index);

        log::trace!("Using adapter: {:?}", adapter);

        self.state.advance(LinkState::Scanning)?;

        let session = Arc::new(RadioSession {
            _manager: manager,
            adapter,
        });
        let stopper = match ScanContext::start(
            config,
            session.clone(),
            self.state.clone(),
            self.event_sender.clone(),
            self.device_stream_stoppers.clone(),
        )
        .await
        {
            Ok(stopper) => stopper,
            Err(e) => {
                // The scan never got going; hand the state back so the
                // caller can retry with a new scan.
                self.state.revert(LinkState::Idle);
                return Err(e);
            }
        };

        self.scan_stopper = Some(stopper);
        self.session = Some(session);

        Ok(())
    }

    /// Stop scanning. Idempotent: stopping an inactive or already-resolved
    /// scan is a no-op.
    pub async fn stop(&mut self) -> Result<(), Error> {
        // Cancel the scan loop and end the device streams first, so no
        // later advertisement can resolve even if the radio call fails.
        self.scan_stopper.take();
        self.device_stream_stoppers.write().unwrap().clear();

        if let Some(session) = self.session.take() {
            self.state.advance(LinkState::Idle).ok();
            session.adapter.stop_scan().await.map_err(Error::Scan)?;
        } else {
            log::info!("Scanner is already stopped");
        }

        Ok(())
    }

    /// Create a new stream that receives matched devices.
    pub fn device_stream(&mut self) -> Valved<Pin<Box<dyn Stream<Item = Device> + Send>>> {
        let receiver = self.event_sender.subscribe();

        let stream: Pin<Box<dyn Stream<Item = Device> + Send>> =
            Box::pin(BroadcastStream::new(receiver).filter_map(|x| async move { x.ok() }));

        let (trigger, stream) = Valved::new(stream);
        self.device_stream_stoppers.write().unwrap().push(trigger);

        stream
    }

    /// Scan until one matching device is found, then stop.
    ///
    /// Fails with [`Error::DeviceNotFound`] when the scan ends, for example
    /// by timeout, without a match.
    pub async fn find_device(&mut self, config: ScanConfig) -> Result<Device, Error> {
        // Listen before the scan starts, so a device matched right away
        // cannot slip past the receiver.
        let mut devices = self.device_stream();

        self.start(config).await?;
        let device = devices.next().await;
        self.stop().await?;

        device.ok_or(Error::DeviceNotFound)
    }
}

struct ScanContext {
    /// Number of matching devices found so far
    result_count: usize,
    /// Reference to the bluetooth session instance
    session: Arc<RadioSession>,
    /// Configurations for the scan, such as filters and stop conditions
    config: ScanConfig,
    /// Shared link state, advanced to Found on the first match
    state: Arc<LinkStateMachine>,
    /// Set of devices that have been filtered and will be ignored
    filtered: HashSet<PeripheralId>,
    /// Set of devices that matched the filters
    matched: HashSet<PeripheralId>,
    /// Channel for sending matched devices to the client
    event_sender: Sender<Device>,
}

impl ScanContext {
    async fn start(
        config: ScanConfig,
        session: Arc<RadioSession>,
        state: Arc<LinkStateMachine>,
        sender: Sender<Device>,
        device_stream_stoppers: Arc<RwLock<Vec<Trigger>>>,
    ) -> Result<Trigger, Error> {
        log::info!("Starting the scan");

        let events = session.adapter.events().await.map_err(Error::Scan)?;
        let (stopper, events) = Valved::new(events);

        session
            .adapter
            .start_scan(Default::default())
            .await
            .map_err(Error::Scan)?;

        let ctx = ScanContext {
            result_count: 0,
            session,
            config,
            state,
            filtered: HashSet::new(),
            matched: HashSet::new(),
            event_sender: sender,
        };

        tokio::spawn(async move {
            ctx.listen(events, device_stream_stoppers).await;
        });

        Ok(stopper)
    }

    async fn listen(
        mut self,
        mut event_stream: Valved<Pin<Box<dyn Stream<Item = CentralEvent> + Send>>>,
        device_stream_stoppers: Arc<RwLock<Vec<Trigger>>>,
    ) {
        let start_time = Instant::now();

        while let Some(event) = event_stream.next().await {
            match event {
                CentralEvent::DeviceDiscovered(peripheral_id)
                | CentralEvent::DeviceUpdated(peripheral_id) => {
                    self.on_advertisement(peripheral_id).await;
                }
                _ => {}
            }

            let timeout_reached = self
                .config
                .timeout
                .filter(|timeout| Instant::now().duration_since(start_time).ge(timeout))
                .is_some();
            let max_result_reached = self
                .config
                .max_results
                .filter(|max_results| self.result_count >= *max_results)
                .is_some();

            if timeout_reached || max_result_reached {
                log::info!("Scanner stop condition reached.");
                break;
            }
        }

        device_stream_stoppers.write().unwrap().clear();

        log::info!("Scanner was stopped.");
    }

    async fn on_advertisement(&mut self, peripheral_id: PeripheralId) {
        if self.filtered.contains(&peripheral_id) || self.matched.contains(&peripheral_id) {
            return;
        }

        if let Ok(peripheral) = self.session.adapter.peripheral(&peripheral_id).await {
            log::trace!("Advertisement from: {:?}", peripheral);

            match self.passes_name_filter(&peripheral).await {
                Some(true) => self.add_peripheral(peripheral),
                Some(false) => {
                    self.filtered.insert(peripheral_id);
                }
                // No local name yet. A later advertisement may carry one.
                None => {}
            }
        }
    }

    fn add_peripheral(&mut self, peripheral: Peripheral) {
        let peripheral_id = peripheral.id();
        let device = Device::new(self.session.clone(), peripheral);

        if publish_match(
            &self.event_sender,
            &mut self.matched,
            peripheral_id.clone(),
            device,
        ) {
            log::info!("Found device: {:?}", peripheral_id);
            self.state.advance(LinkState::Found).ok();
            self.result_count += 1;
        } else {
            log::warn!("Matched device had no listener yet; waiting for the next advertisement");
        }
    }

    async fn passes_name_filter(&self, peripheral: &Peripheral) -> Option<bool> {
        match peripheral.properties().await {
            Ok(Some(props)) => props
                .local_name
                .map(|name| self.config.matches_name(Some(&name))),
            _ => None,
        }
    }
}

/// Publishes a matched device to the client streams. The device is recorded
/// as matched only when a receiver actually took it; a match sent while
/// nobody listens stays eligible for a later advertisement.
fn publish_match<I, T>(sender: &Sender<T>, matched: &mut HashSet<I>, id: I, device: T) -> bool
where
    I: Eq + std::hash::Hash,
    T: Clone,
{
    if sender.send(device).is_ok() {
        matched.insert(id);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_exact_cuff_name_only() {
        let config = ScanConfig::default();

        assert!(config.matches_name(Some("BM77")));
        assert!(!config.matches_name(Some("BM770")));
        assert!(!config.matches_name(Some("bm77")));
        assert!(!config.matches_name(Some("BM7")));
        assert!(!config.matches_name(Some("")));
        assert!(!config.matches_name(None));
    }

    #[test]
    fn name_filter_can_be_replaced() {
        let config = ScanConfig::default().filter_by_name(|name| name.starts_with("BM"));

        assert!(config.matches_name(Some("BM770")));
        assert!(!config.matches_name(Some("bm77")));
        assert!(!config.matches_name(None));
    }

    #[tokio::test]
    async fn stopping_an_inactive_scanner_is_a_no_op() {
        let mut scanner = Scanner::new();

        scanner.stop().await.unwrap();
        scanner.stop().await.unwrap();
        assert_eq!(scanner.state.current(), LinkState::Idle);
    }

    #[tokio::test]
    async fn streams_opened_before_stop_end_without_yielding() {
        let mut scanner = Scanner::new();
        let mut devices = scanner.device_stream();

        scanner.stop().await.unwrap();

        assert!(devices.next().await.is_none());
    }

    #[tokio::test]
    async fn unheard_match_stays_eligible_for_later_advertisements() {
        let (sender, _) = broadcast::channel::<i32>(4);
        let mut matched: HashSet<u8> = HashSet::new();

        // Nobody listening: the match must not be recorded, so a later
        // advertisement from the same device gets another chance.
        assert!(!publish_match(&sender, &mut matched, 1u8, 42));
        assert!(matched.is_empty());

        let mut receiver = sender.subscribe();
        assert!(publish_match(&sender, &mut matched, 1u8, 42));
        assert!(matched.contains(&1));
        assert_eq!(receiver.try_recv().unwrap(), 42);
    }
}
