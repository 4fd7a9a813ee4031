//! Daemon assembly.
//!
//! Builds the handles, limiters and pipeline, runs the event loop, and
//! reports the capture statistics on the way out.

use std::os::unix::io::AsRawFd;

use pcap::{Active, Capture};
use tracing::{info, warn};

use crate::capture;
use crate::cli::Cli;
use crate::error::Error;
use crate::event_loop::EventLoop;
use crate::inject::{Inject, RawInjector};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::signals::SignalPipe;
use crate::sys;

/// Run until SIGINT or SIGTERM. Setup and fatal runtime failures bubble up;
/// a clean shutdown returns `Ok`.
pub fn run(cli: &Cli) -> Result<(), Error> {
    if let Err(err) = sys::enable_core_dumps() {
        warn!(%err, "failed to enable core dumps");
    }
    if let Some(cpu) = cli.cpu {
        match sys::pin_to_cpu(cpu) {
            Ok(()) => info!(cpu, "pinned to CPU"),
            Err(err) => warn!(cpu, %err, "sched_setaffinity failed"),
        }
    }

    let mut capture = capture::open(&cli.iface)?;
    let capture_fd = capture.as_raw_fd();
    if capture_fd < 0 {
        return Err(Error::Setup(format!(
            "capture handle on {:?} has no selectable descriptor",
            cli.iface
        )));
    }

    let injector = RawInjector::open(&cli.iface)?;
    let sigint = SignalPipe::register(libc::SIGINT)?;
    let sigterm = SignalPipe::register(libc::SIGTERM)?;

    let mut pipeline = Pipeline::new(
        PipelineConfig {
            src_rate: cli.src_rate,
            iface_rate: cli.iface_rate,
            ports: cli.port_allow_list(),
            verbosity: cli.verbose,
            dry_run: cli.dry_run,
        },
        injector,
    );

    info!(
        pid = std::process::id(),
        iface = %cli.iface,
        iface_rate_pps = cli.iface_rate,
        src_rate_pps = cli.src_rate,
        verbose = cli.verbose,
        dry_run = cli.dry_run,
        "started"
    );

    let mut event_loop = EventLoop::new(capture_fd, [&sigint, &sigterm]);
    event_loop.run(|| drain_capture(&mut capture, &mut pipeline))?;

    info!(pid = std::process::id(), "Quitting");
    let counters = pipeline.counters();
    let stats = capture.stats()?;
    info!(
        pid = std::process::id(),
        recv = stats.received,
        drop = stats.dropped,
        ifdrop = stats.if_dropped,
        accepted = counters.accepted,
        rejected = counters.rejected,
        "capture statistics"
    );
    Ok(())
}

/// Pull frames until the library reports nothing more is ready. Partial
/// captures are skipped without logging.
fn drain_capture<I: Inject>(
    capture: &mut Capture<Active>,
    pipeline: &mut Pipeline<I>,
) -> Result<(), Error> {
    loop {
        match capture.next_packet() {
            Ok(packet) => {
                if packet.header.caplen == packet.header.len {
                    pipeline.handle_frame(packet.data)?;
                }
            }
            Err(pcap::Error::TimeoutExpired) | Err(pcap::Error::NoMorePackets) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}
