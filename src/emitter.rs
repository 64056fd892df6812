//! Output formatting for measurement events.
//!
//! The [`Emitter`] trait defines callbacks for each stage of a
//! measurement cycle. Two implementations are provided:
//! - [`HumanReadableEmitter`] — live progress and results on a terminal.
//! - [`JsonEmitter`] — one JSON object per line, suitable for machine consumption.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::locate::MeasurementServer;
use crate::measurement::{Direction, MeasurementResult, Progress};

#[derive(Serialize)]
#[serde(tag = "type")]
enum Event<'a> {
    ServerSelected {
        machine: &'a str,
    },
    Starting {
        direction: Direction,
    },
    Progress {
        direction: Direction,
        bytes: u64,
        elapsed_us: u64,
        mbps: f64,
    },
    Error {
        direction: Direction,
        error: &'a str,
    },
    Complete {
        direction: Direction,
        mbps: f64,
    },
    CycleFailed {
        error: &'a str,
    },
    Result {
        result: &'a MeasurementResult,
    },
}

/// Callbacks for measurement cycle lifecycle events.
pub trait Emitter {
    /// Called once discovery has chosen a server for the cycle.
    fn on_server_selected(&mut self, server: &MeasurementServer) -> Result<()>;
    /// Called when a direction is about to begin.
    fn on_starting(&mut self, direction: Direction) -> Result<()>;
    /// Called with periodic snapshots while a meter is running.
    fn on_progress(&mut self, progress: &Progress) -> Result<()>;
    /// Called when a direction fails; its rate will be reported as zero.
    fn on_error(&mut self, direction: Direction, err: &str) -> Result<()>;
    /// Called when a direction finishes with a measured rate.
    fn on_complete(&mut self, direction: Direction, mbps: f64) -> Result<()>;
    /// Called when the whole cycle fails before any direction could run.
    fn on_cycle_failed(&mut self, err: &str) -> Result<()>;
    /// Called last, with the result pair for the cycle.
    fn on_result(&mut self, result: &MeasurementResult) -> Result<()>;
}

/// Emits human-readable progress and results to a writer.
pub struct HumanReadableEmitter<W: Write> {
    out: W,
}

impl<W: Write> HumanReadableEmitter<W> {
    /// Create a new emitter writing to `out`.
    pub fn new(out: W) -> Self {
        HumanReadableEmitter { out }
    }
}

impl<W: Write> Emitter for HumanReadableEmitter<W> {
    fn on_server_selected(&mut self, server: &MeasurementServer) -> Result<()> {
        writeln!(self.out, "measuring with {}", server.machine)?;
        Ok(())
    }

    fn on_starting(&mut self, direction: Direction) -> Result<()> {
        write!(self.out, "\rstarting {direction}")?;
        self.out.flush()?;
        Ok(())
    }

    fn on_progress(&mut self, progress: &Progress) -> Result<()> {
        write!(
            self.out,
            "\r{}: {:>7.1} Mbit/s",
            progress.direction,
            progress.mbps()
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn on_error(&mut self, direction: Direction, err: &str) -> Result<()> {
        write!(self.out, "\n{direction} failed: {err}\n")?;
        Ok(())
    }

    fn on_complete(&mut self, direction: Direction, mbps: f64) -> Result<()> {
        write!(self.out, "\r{direction}: {mbps:>7.1} Mbit/s\n")?;
        Ok(())
    }

    fn on_cycle_failed(&mut self, err: &str) -> Result<()> {
        writeln!(self.out, "measurement cycle failed: {err}")?;
        Ok(())
    }

    fn on_result(&mut self, result: &MeasurementResult) -> Result<()> {
        writeln!(self.out, "\nResults\n")?;
        writeln!(
            self.out,
            "{:>10}: {:>7.1} Mbit/s",
            "Download", result.download_mbps
        )?;
        writeln!(
            self.out,
            "{:>10}: {:>7.1} Mbit/s",
            "Upload", result.upload_mbps
        )?;
        Ok(())
    }
}

/// Emits one JSON object per line for each event.
pub struct JsonEmitter<W: Write> {
    out: W,
}

impl<W: Write> JsonEmitter<W> {
    /// Create a new JSON emitter writing to `out`.
    pub fn new(out: W) -> Self {
        JsonEmitter { out }
    }

    fn emit(&mut self, event: &Event) -> Result<()> {
        let json = serde_json::to_string(event)?;
        writeln!(self.out, "{}", json)?;
        Ok(())
    }
}

impl<W: Write> Emitter for JsonEmitter<W> {
    fn on_server_selected(&mut self, server: &MeasurementServer) -> Result<()> {
        self.emit(&Event::ServerSelected {
            machine: &server.machine,
        })
    }

    fn on_starting(&mut self, direction: Direction) -> Result<()> {
        self.emit(&Event::Starting { direction })
    }

    fn on_progress(&mut self, progress: &Progress) -> Result<()> {
        self.emit(&Event::Progress {
            direction: progress.direction,
            bytes: progress.bytes,
            elapsed_us: progress.elapsed.as_micros() as u64,
            mbps: progress.mbps(),
        })
    }

    fn on_error(&mut self, direction: Direction, err: &str) -> Result<()> {
        self.emit(&Event::Error {
            direction,
            error: err,
        })
    }

    fn on_complete(&mut self, direction: Direction, mbps: f64) -> Result<()> {
        self.emit(&Event::Complete { direction, mbps })
    }

    fn on_cycle_failed(&mut self, err: &str) -> Result<()> {
        self.emit(&Event::CycleFailed { error: err })
    }

    fn on_result(&mut self, result: &MeasurementResult) -> Result<()> {
        self.emit(&Event::Result { result })
    }
}
