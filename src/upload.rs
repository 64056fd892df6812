//! Upload meter.
//!
//! Sends fixed-size filler frames as fast as the transport accepts them
//! and computes a sender-side rate. "Accepted" means buffered by the
//! local transport, not confirmed received, so the value is an estimate
//! from the sending side. The send await applies backpressure; the loop
//! additionally yields to the scheduler every round, since a transport
//! that accepts instantly would otherwise never suspend.

use bytes::Bytes;
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

use crate::error::Result;
use crate::measurement::{Direction, Progress, ThroughputSample};
use crate::params::{self, Timing};
use crate::session::{Frame, TransportSession};

/// Run the upload test on an established session.
///
/// Resolves with the measured rate in Mbit/s once the window has
/// elapsed, counting each accepted filler frame. Counterflow from the
/// server is drained between sends so the connection keeps flowing, but
/// never counted. Like the download meter this never runs past
/// `timing.deadline()`: a transport that jams without erroring is
/// resolved with whatever was accepted by then. Send failures surface as
/// errors for the caller to judge.
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
        send_loop(&mut session, &mut sample, timing, &progress),
    )
    .await;

    let rate = match result {
        Ok(inner) => inner,
        Err(_elapsed) => Ok(sample.mbps()),
    };

    session.close().await;
    rate
}

async fn send_loop<T>(
    session: &mut TransportSession<T>,
    sample: &mut ThroughputSample,
    timing: Timing,
    progress: &mpsc::Sender<Progress>,
) -> Result<f64>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut prev_update = sample.started_at();

    let mut rng = StdRng::from_os_rng();
    let mut filler = vec![0u8; params::FILLER_FRAME_SIZE];
    rng.fill_bytes(&mut filler);
    let frame = Bytes::from(filler);

    loop {
        session.send(frame.clone()).await?;
        sample.record(params::FILLER_FRAME_SIZE as u64);
        // An accepted send need not suspend; yield each round regardless.
        tokio::task::yield_now().await;

        for incoming in session.drain_incoming().await? {
            if let Frame::Text(text) = incoming {
                tracing::debug!(direction = %Direction::Upload, counterflow = %text, "server measurement");
            }
        }

        if sample.elapsed() >= timing.window {
            return Ok(sample.mbps());
        }
        if prev_update.elapsed() >= params::PROGRESS_INTERVAL {
            prev_update = Instant::now();
            let _ = progress.try_send(sample.snapshot(Direction::Upload));
        }
    }
}
