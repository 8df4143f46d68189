use std::io::Result;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};

use leaky_bucket::RateLimiter;
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::runtime::Handle;
use tokio::task;

/// Burst of the bandwidth token bucket. Large enough that short reads are
/// never throttled, so the limit acts as a smoothed average.
const BURST_LIMIT: usize = 1024 * 1024 * 1024;

// default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

/// Builds a token bucket enforcing `bytes_per_sec`. The bucket starts empty,
/// so the burst only becomes available after a long idle period.
pub fn bandwidth_limiter(bytes_per_sec: f64) -> Arc<RateLimiter> {
    let rate = bytes_per_sec.max(1.0) as usize;
    let refill = if rate <= REFILL_PER_INTERVAL_DIVIDER {
        1
    } else {
        rate / REFILL_PER_INTERVAL_DIVIDER
    };

    Arc::new(
        RateLimiter::builder()
            .max(BURST_LIMIT.max(rate))
            .initial(0)
            .refill(refill)
            .fair(true)
            .build(),
    )
}

/// An [`AsyncRead`] wrapper that adds every read byte count to a shared
/// counter and optionally blocks until the bandwidth limiter grants tokens.
#[pin_project]
pub struct MeteredReader<R: AsyncRead + Send> {
    #[pin]
    inner: R,
    transferred: Arc<AtomicI64>,
    bandwidth_limiter: Option<Arc<RateLimiter>>,
}

impl<R: AsyncRead + Send> MeteredReader<R> {
    pub fn new(
        inner: R,
        transferred: Arc<AtomicI64>,
        bandwidth_limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self {
            inner,
            transferred,
            bandwidth_limiter,
        }
    }

    pub fn transferred(&self) -> i64 {
        self.transferred.load(Ordering::SeqCst)
    }
}

impl<R: AsyncRead + Send> AsyncRead for MeteredReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        let this = self.project();

        let before = buf.filled().len();

        let result = this.inner.poll_read(cx, buf);
        if !result.is_ready() {
            return result;
        }

        let after = buf.filled().len();
        let read_bytes = after - before;

        if let Some(bandwidth_limiter) = this.bandwidth_limiter.clone() {
            if 0 < read_bytes {
                task::block_in_place(move || {
                    Handle::current().block_on(async move {
                        bandwidth_limiter.acquire(read_bytes).await;
                    });
                });
            }
        }

        if 0 < read_bytes {
            this.transferred.fetch_add(read_bytes as i64, Ordering::SeqCst);
        }

        result
    }
}
