//! Rate limiting for snapshot streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Rate limiting for any stream of snapshots.
pub trait ThrottleExt: Stream {
    /// Emit at most once per `period`.
    ///
    /// Latest wins: of the items that arrive within one period only the last
    /// is emitted. Suits counter snapshots, where intermediate values carry no
    /// information once a newer one exists.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`].
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        ticker: Interval,
        latest: Option<S::Item>,
        finished: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { stream, ticker, latest: None, finished: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.finished {
            return Poll::Ready(this.latest.take());
        }

        ready!(this.ticker.poll_tick(cx));

        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => {
                    *this.finished = true;
                    return Poll::Ready(this.latest.take());
                }
                Poll::Pending => {
                    return match this.latest.take() {
                        Some(item) => Poll::Ready(Some(item)),
                        // Nothing new this period; the inner stream will wake us
                        None => Poll::Pending,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::watch;
    use tokio_stream::wrappers::WatchStream;

    #[tokio::test(start_paused = true)]
    async fn only_latest_value_per_period_is_emitted() {
        let (tx, rx) = watch::channel(0u64);
        let mut throttled = WatchStream::new(rx).throttle(Duration::from_millis(100));

        assert_eq!(throttled.next().await, Some(0));

        for value in 1..=5 {
            tx.send_replace(value);
        }
        assert_eq!(throttled.next().await, Some(5));

        drop(tx);
        assert_eq!(throttled.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn finite_stream_ends_with_its_last_item() {
        let mut throttled = futures::stream::iter(vec![1, 2, 3]).throttle(Duration::from_millis(10));
        assert_eq!(throttled.next().await, Some(3));
        assert_eq!(throttled.next().await, None);
    }
}
