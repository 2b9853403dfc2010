//! Progress-tracking reader for large uploads.
//!
//! Wraps any byte source and reports transferred bytes, instantaneous
//! throughput and estimated time remaining through a callback. The bytes
//! passed through are never modified.

use std::io::{self, Read, Seek, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, ReadBuf};

/// Maximum time between two progress reports
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Fraction of the total that triggers a report (10%)
const REPORT_FRACTION_DIVISOR: u64 = 10;

/// One progress observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub transferred: u64,
    pub total: u64,
    /// Throughput since the previous report, in bytes per second
    pub bytes_per_sec: f64,
    /// Remaining time at the average rate so far
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.transferred as f64 * 100.0 / self.total as f64
        }
    }
}

pub type ProgressCallback = Box<dyn FnMut(ProgressSnapshot) + Send + Sync>;

/// Counts bytes and decides when a snapshot is due
pub struct ProgressTracker {
    total: u64,
    transferred: u64,
    started_at: Instant,
    last_report_at: Instant,
    last_report_bytes: u64,
    finished: bool,
    callback: ProgressCallback,
}

impl ProgressTracker {
    pub fn new(total: u64, callback: ProgressCallback) -> Self {
        let now = Instant::now();
        Self {
            total,
            transferred: 0,
            started_at: now,
            last_report_at: now,
            last_report_bytes: 0,
            finished: false,
            callback,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Record `bytes` more transferred now
    pub fn advance(&mut self, bytes: u64) {
        self.record(bytes, Instant::now());
    }

    pub(crate) fn record(&mut self, bytes: u64, now: Instant) {
        self.transferred = self.transferred.saturating_add(bytes);

        let step = (self.total / REPORT_FRACTION_DIVISOR).max(1);
        let complete = self.transferred >= self.total;
        let due = now.duration_since(self.last_report_at) >= REPORT_INTERVAL
            || self.transferred.saturating_sub(self.last_report_bytes) >= step;

        if complete {
            if !self.finished {
                self.finished = true;
                self.report(now);
            }
        } else if bytes > 0 && due {
            self.report(now);
        }
    }

    /// Reposition the byte counter after a seek
    fn reset_to(&mut self, position: u64) {
        self.transferred = position;
        self.last_report_bytes = position;
        self.finished = false;
    }

    fn report(&mut self, now: Instant) {
        let interval = now.duration_since(self.last_report_at).as_secs_f64();
        let delta = self.transferred.saturating_sub(self.last_report_bytes);
        let bytes_per_sec = if interval > 0.0 {
            delta as f64 / interval
        } else {
            0.0
        };

        let elapsed = now.duration_since(self.started_at).as_secs_f64();
        let eta = if elapsed > 0.0 && self.transferred > 0 {
            let average = self.transferred as f64 / elapsed;
            let remaining = self.total.saturating_sub(self.transferred) as f64;
            Some(Duration::from_secs_f64(remaining / average))
        } else {
            None
        };

        (self.callback)(ProgressSnapshot {
            transferred: self.transferred,
            total: self.total,
            bytes_per_sec,
            eta,
        });

        self.last_report_at = now;
        self.last_report_bytes = self.transferred;
    }
}

/// Reader decorator that feeds a `ProgressTracker`
pub struct ProgressReader<R> {
    inner: R,
    tracker: ProgressTracker,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, total: u64, callback: ProgressCallback) -> Self {
        Self {
            inner,
            tracker: ProgressTracker::new(total, callback),
        }
    }

    pub fn transferred(&self) -> u64 {
        self.tracker.transferred()
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.tracker.advance(n as u64);
        Ok(n)
    }
}

impl<R: Seek> Seek for ProgressReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.inner.seek(pos)?;
        self.tracker.reset_to(position);
        Ok(position)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            this.tracker.advance(read as u64);
        }
        poll
    }
}
