//! Notification subscription and the decoded measurement stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use futures::{Stream, StreamExt};
use stream_cancel::{Trigger, Valved};

use crate::state::LinkState;
use crate::{common, ConnectionSession, Error, Measurement};

type DecodedStream = Valved<Pin<Box<dyn Stream<Item = Result<Measurement, Error>> + Send>>>;

/// Unbounded stream of decoded measurements from one session.
///
/// The cuff never signals end-of-transmission; the stream runs until the
/// connection drops or the caller cancels it. Decode faults are yielded as
/// `Err` items and do not end the stream.
pub struct MeasurementStream {
    peripheral: Peripheral,
    characteristic: Characteristic,
    inner: DecodedStream,
    stopper: Option<Trigger>,
}

impl MeasurementStream {
    pub(crate) async fn subscribe(session: &ConnectionSession) -> Result<Self, Error> {
        // Subscribing is only legal once discovery has completed, and only
        // once per session.
        session.link().advance(LinkState::Receiving)?;

        match Self::open(session.peripheral().clone()).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                // The session is still healthy; a failed subscribe must
                // not block a retry.
                session.link().revert(LinkState::Connected);
                Err(e)
            }
        }
    }

    async fn open(peripheral: Peripheral) -> Result<Self, Error> {
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == common::characteristics::BLOOD_PRESSURE_MEASUREMENT)
            .ok_or(Error::CharacteristicNotFound)?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(Error::Transport)?;

        log::debug!("Subscribed to blood pressure measurements");

        let notifications = peripheral
            .notifications()
            .await
            .map_err(Error::Transport)?;

        let uuid = characteristic.uuid;
        let decoded: Pin<Box<dyn Stream<Item = Result<Measurement, Error>> + Send>> =
            Box::pin(notifications.filter_map(move |notification| async move {
                (notification.uuid == uuid)
                    .then(|| Measurement::decode(&notification.value).map_err(Error::from))
            }));

        let (stopper, inner) = Valved::new(decoded);

        Ok(Self {
            peripheral,
            characteristic,
            inner,
            stopper: Some(stopper),
        })
    }

    /// Stops the stream and unsubscribes at the GATT level.
    ///
    /// The session cannot be re-subscribed afterwards; receiving again
    /// requires establishing a new session.
    pub async fn cancel(mut self) -> Result<(), Error> {
        self.stopper.take();

        log::debug!("Unsubscribing from blood pressure measurements");

        self.peripheral
            .unsubscribe(&self.characteristic)
            .await
            .map_err(Error::Transport)
    }
}

impl Stream for MeasurementStream {
    type Item = Result<Measurement, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
