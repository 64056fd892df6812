//! Protocol constants and timing parameters.

use std::time::Duration;

/// Value of the Sec-WebSocket-Protocol header.
pub const SEC_WEBSOCKET_PROTOCOL: &str = "net.measurementlab.ndt.v7";

/// Base URL for the M-Lab Locate v2 API.
pub const LOCATE_URL: &str = "https://locate.measurementlab.net/v2/nearest/ndt/ndt7";

/// URL path identifying the download role in discovery responses.
pub const DOWNLOAD_URL_PATH: &str = "/ndt/v7/download";

/// URL path identifying the upload role in discovery responses.
pub const UPLOAD_URL_PATH: &str = "/ndt/v7/upload";

/// Size of each upload filler frame (32 KiB).
pub const FILLER_FRAME_SIZE: usize = 1 << 15;

/// Duration of one measurement window per direction.
pub const MEASUREMENT_WINDOW: Duration = Duration::from_secs(10);

/// Extra time past the window before a direction is forcibly resolved.
/// Covers idle servers and stalled sends; see [`Timing`].
pub const WINDOW_GRACE: Duration = Duration::from_secs(5);

/// Timeout for the discovery HTTP call.
pub const LOCATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for the closing handshake before the session is dropped
/// as-is. Keeps teardown from blocking on a jammed transport.
pub const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Timeout for establishing a proxy tunnel.
pub const PROXY_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Minimum interval between progress snapshots published by a meter.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Timing knobs for a single meter run.
///
/// The defaults follow the ndt7 convention: a 10 second window, forcibly
/// resolved at window + 5 s if the peer goes silent or the transport
/// stalls. Tests shorten both to keep runs fast; production callers should
/// not need to touch this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Length of the measurement window.
    pub window: Duration,
    /// Grace period past the window before the meter gives up waiting.
    pub grace: Duration,
}

impl Timing {
    /// Hard ceiling for one meter run: window plus grace.
    pub fn deadline(&self) -> Duration {
        self.window + self.grace
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            window: MEASUREMENT_WINDOW,
            grace: WINDOW_GRACE,
        }
    }
}
