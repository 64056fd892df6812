//! Download meter.
//!
//! Receives binary frames from the server for one measurement window and
//! computes the observed rate. Binary payload counts toward throughput;
//! server counterflow (text frames) is logged but excluded from the byte
//! count.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};

use crate::error::Result;
use crate::measurement::{Direction, Progress, ThroughputSample};
use crate::params::{self, Timing};
use crate::session::{Frame, TransportSession};

/// Run the download test on an established session.
///
/// Resolves with the measured rate in Mbit/s once the window has elapsed.
/// The meter never resolves before the window has passed since the
/// session opened, and never runs past `timing.deadline()`: if the server
/// goes silent the rate is computed from whatever was received when the
/// deadline fires. Transport faults surface as errors; the caller decides
/// what a failed direction is worth.
pub async fn run<T>(
    mut session: TransportSession<T>,
    timing: Timing,
    progress: mpsc::Sender<Progress>,
) -> Result<f64>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut sample = ThroughputSample::new();

    let result = timeout(
        timing.deadline(),
        receive_loop(&mut session, &mut sample, timing, &progress),
    )
    .await;

    let rate = match result {
        Ok(inner) => inner,
        // Deadline: resolve with the accumulated sample instead of hanging
        // on an idle connection.
        Err(_elapsed) => Ok(sample.mbps()),
    };

    session.close().await;
    rate
}

async fn receive_loop<T>(
    session: &mut TransportSession<T>,
    sample: &mut ThroughputSample,
    timing: Timing,
    progress: &mpsc::Sender<Progress>,
) -> Result<f64>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut prev_update = sample.started_at();

    while let Some(frame) = session.recv().await? {
        match frame {
            Frame::Binary(data) => sample.record(data.len() as u64),
            Frame::Text(text) => {
                tracing::debug!(direction = %Direction::Download, counterflow = %text, "server measurement");
            }
        }
        if sample.elapsed() >= timing.window {
            return Ok(sample.mbps());
        }
        if prev_update.elapsed() >= params::PROGRESS_INTERVAL {
            prev_update = Instant::now();
            let _ = progress.try_send(sample.snapshot(Direction::Download));
        }
    }

    // The server closed early. The window still runs to completion so a
    // short burst cannot masquerade as a sustained rate.
    sleep_until(sample.started_at() + timing.window).await;
    Ok(sample.mbps())
}
