use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{FutureExt, Stream};
use tokio::time::{sleep, Sleep};

use crate::interface::{Shaper, ShaperError};
use crate::tree::ShapedPacket;

/// Fallback poll interval when the shaper has no backlog to derive a
/// wake time from.
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Floor on timer waits, so a near-zero wake hint cannot busy-spin.
const MIN_WAKE: Duration = Duration::from_micros(100);

/// Async egress driver over a [`Shaper`].
///
/// `dequeue_next` is non-blocking by design; this driver adds the wait.
/// [`next_packet`](Self::next_packet) parks on the shaper's admission
/// notification or on a wake timer sized by the shaper's own hint,
/// whichever fires first. The [`Stream`] impl is purely timer-driven
/// with the same hint, which bounds its idle wake-up latency at
/// the fallback poll interval.
#[derive(Debug)]
pub struct Egress {
    shaper: Arc<Shaper>,
    /// Armed while the stream waits for tokens. `Sleep` is not `Unpin`,
    /// so it lives pinned on the heap.
    timer: Option<Pin<Box<Sleep>>>,
}

impl Egress {
    pub fn new(shaper: Arc<Shaper>) -> Self {
        Self { shaper, timer: None }
    }

    pub fn shaper(&self) -> &Arc<Shaper> {
        &self.shaper
    }

    /// Waits until the schedule releases the next packet.
    ///
    /// Returns [`ShaperError::NotAttached`] once the interface is
    /// detached.
    pub async fn next_packet(&self) -> Result<ShapedPacket, ShaperError> {
        loop {
            if let Some(packet) = self.shaper.dequeue_next()? {
                return Ok(packet);
            }
            let wait = self.shaper.next_wake().unwrap_or(IDLE_POLL).max(MIN_WAKE);
            tokio::select! {
                _ = self.shaper.notify().notified() => {}
                _ = sleep(wait) => {}
            }
        }
    }
}

impl Stream for Egress {
    type Item = ShapedPacket;

    /// Yields packets as the schedule releases them; the stream ends when
    /// the interface is detached.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.shaper.dequeue_next() {
                Err(_) => return Poll::Ready(None),
                Ok(Some(packet)) => {
                    this.timer = None;
                    return Poll::Ready(Some(packet));
                }
                Ok(None) => {
                    let mut timer = this.timer.take().unwrap_or_else(|| {
                        let wait =
                            this.shaper.next_wake().unwrap_or(IDLE_POLL).max(MIN_WAKE);
                        Box::pin(sleep(wait))
                    });
                    match timer.poll_unpin(cx) {
                        // Timer elapsed: re-check the schedule with a
                        // fresh wake hint next round.
                        Poll::Ready(()) => {}
                        Poll::Pending => {
                            this.timer = Some(timer);
                            return Poll::Pending;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use classful_common::Rate;
    use classful_filter::{ClassId, PacketDescriptor, Protocol, RuleSet};
    use futures::StreamExt;

    use crate::config::{ClassConfig, ShaperConfig};
    use crate::interface::Decision;

    use super::*;

    const DATA: ClassId = ClassId::new(30);

    fn shaper() -> Arc<Shaper> {
        let config = ShaperConfig::new(
            Rate::from_mbit_per_sec(10),
            RuleSet::new(DATA, vec![]),
        )
        .with_class(ClassConfig::new(
            DATA,
            Rate::from_kbit_per_sec(256),
            Rate::from_mbit_per_sec(10),
        ));
        let shaper = Shaper::new("veth0");
        shaper.attach(config).unwrap();
        Arc::new(shaper)
    }

    fn offer(shaper: &Shaper, bytes: u32) {
        let descriptor =
            PacketDescriptor::new(Protocol::Tcp, "10.0.2.3".parse().unwrap(), bytes)
                .with_ports(40000, 80);
        assert_eq!(
            shaper.ingress(descriptor, Bytes::from_static(b"payload")).unwrap(),
            Decision::Admitted(DATA)
        );
    }

    #[tokio::test]
    async fn next_packet_wakes_on_admission() {
        let _ = tracing_subscriber::fmt::try_init();

        let shaper = shaper();
        let egress = Egress::new(Arc::clone(&shaper));

        let feeder = {
            let shaper = Arc::clone(&shaper);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                offer(&shaper, 600);
            })
        };

        let packet = egress.next_packet().await.unwrap();
        assert_eq!(packet.class(), DATA);
        assert_eq!(packet.payload().as_ref(), b"payload");
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn stream_yields_packets_and_ends_on_detach() {
        let _ = tracing_subscriber::fmt::try_init();

        let shaper = shaper();
        offer(&shaper, 600);
        offer(&shaper, 700);

        let mut egress = Egress::new(Arc::clone(&shaper));
        assert_eq!(egress.next().await.unwrap().descriptor().length_bytes(), 600);
        assert_eq!(egress.next().await.unwrap().descriptor().length_bytes(), 700);

        shaper.detach();
        assert!(egress.next().await.is_none());
    }
}
