//! The packet-handling pipeline.
//!
//! For each complete captured frame: classify, enforce the per-source and
//! per-interface gates, rewrite the Ethernet addresses, inject, and emit the
//! per-packet line. Admission is decided before any byte is rewritten; a
//! denied packet is never injected.

use std::fmt::Write as _;

use crate::bitmap::BitMap;
use crate::error::Error;
use crate::hashlimit::HashLimit;
use crate::inject::Inject;
use crate::parse::{self, Classification, RejectReason, SourceKey};
use crate::rewrite;

/// Slots in the per-source bucket table. Collisions silently evict, so this
/// bounds memory, not correctness.
const SOURCE_TABLE_CAPACITY: usize = 8191;

/// Burst allowance relative to the configured rate, for both limiters.
const BURST_FACTOR: f64 = 1.9;

/// Constant key for the capacity-1 interface limiter.
const IFACE_KEY: &[u8] = &[0];

pub struct PipelineConfig {
    pub src_rate: f64,
    pub iface_rate: f64,
    pub ports: Option<BitMap>,
    pub verbosity: u8,
    pub dry_run: bool,
}

/// Accept/reject tallies, reported once at shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub accepted: u64,
    pub rejected: u64,
}

pub struct Pipeline<I> {
    sources: HashLimit,
    iface: HashLimit,
    ports: Option<BitMap>,
    verbosity: u8,
    dry_run: bool,
    injector: I,
    scratch: Vec<u8>,
    counters: Counters,
}

impl<I: Inject> Pipeline<I> {
    pub fn new(config: PipelineConfig, injector: I) -> Self {
        Self {
            sources: HashLimit::new(
                SOURCE_TABLE_CAPACITY,
                config.src_rate,
                config.src_rate * BURST_FACTOR,
            ),
            iface: HashLimit::new(1, config.iface_rate, config.iface_rate * BURST_FACTOR),
            ports: config.ports,
            verbosity: config.verbosity,
            dry_run: config.dry_run,
            injector,
            scratch: Vec::new(),
            counters: Counters::default(),
        }
    }

    /// Handle one frame whose captured length equals its wire length.
    ///
    /// Per-packet outcomes are values, not errors; only a fatal injector
    /// failure propagates.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        let source = match parse::classify(frame, self.ports.as_ref()) {
            Classification::Reject { source, reason } => {
                self.reject(source, reason, frame);
                return Ok(());
            }
            Classification::Accept { source } => source,
        };

        if !self.sources.touch(source.as_bytes()) {
            self.reject(Some(source), RejectReason::SourceRateLimit, frame);
            return Ok(());
        }
        if !self.iface.touch(IFACE_KEY) {
            self.reject(Some(source), RejectReason::InterfaceRateLimit, frame);
            return Ok(());
        }

        // The capture library hands out read-only memory, so the two
        // six-byte writes land on a scratch copy.
        self.scratch.clear();
        self.scratch.extend_from_slice(frame);
        rewrite::broadcast_rewrite(&mut self.scratch);

        if !self.dry_run {
            self.injector.inject(&self.scratch)?;
        }

        self.counters.accepted += 1;
        if self.verbosity >= 1 {
            self.emit(&source.to_string(), "transmitting", &self.scratch);
        }
        Ok(())
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    #[cfg(test)]
    fn injector(&self) -> &I {
        &self.injector
    }

    fn reject(&mut self, source: Option<SourceKey>, reason: RejectReason, frame: &[u8]) {
        self.counters.rejected += 1;
        if self.verbosity >= 2 {
            let source = source.map_or_else(|| "?".to_string(), |key| key.to_string());
            self.emit(&source, &reason.to_string(), frame);
        }
    }

    fn emit(&self, source: &str, outcome: &str, frame: &[u8]) {
        if self.verbosity >= 3 {
            println!("{source} {outcome}  {}", hex_dump(frame));
        } else {
            println!("{source} {outcome}");
        }
    }
}

fn hex_dump(frame: &[u8]) -> String {
    let mut out = String::with_capacity(frame.len() * 3);
    for byte in frame {
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::BROADCAST_MAC;
    use crate::test_frames::*;
    use std::io;

    #[derive(Default)]
    struct RecordingInjector {
        frames: Vec<Vec<u8>>,
    }

    impl Inject for RecordingInjector {
        fn inject(&mut self, frame: &[u8]) -> io::Result<()> {
            self.frames.push(frame.to_vec());
            Ok(())
        }
    }

    struct FailingInjector;

    impl Inject for FailingInjector {
        fn inject(&mut self, _frame: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "send failed"))
        }
    }

    fn pipeline(config: PipelineConfig) -> Pipeline<RecordingInjector> {
        Pipeline::new(config, RecordingInjector::default())
    }

    fn defaults() -> PipelineConfig {
        PipelineConfig {
            src_rate: 100.0,
            iface_rate: 1000.0,
            ports: None,
            verbosity: 0,
            dry_run: false,
        }
    }

    #[test]
    fn ipv4_accept_rewrites_and_injects() {
        let mut pipeline = pipeline(defaults());
        let frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        pipeline.handle_frame(&frame).unwrap();

        assert_eq!(pipeline.counters().accepted, 1);
        assert_eq!(pipeline.counters().rejected, 0);
        let sent = &pipeline.injector().frames;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0..6], BROADCAST_MAC);
        assert_eq!(sent[0][6..12], DST_MAC);
        assert_eq!(sent[0][12..], frame[12..]);
    }

    #[test]
    fn ipv6_accept_injects() {
        let mut pipeline = pipeline(defaults());
        let frame = ipv6_packet_too_big(ipv6_addr("2001:db8::1"));
        pipeline.handle_frame(&frame).unwrap();
        assert_eq!(pipeline.counters().accepted, 1);
        assert_eq!(pipeline.injector().frames.len(), 1);
    }

    #[test]
    fn vlan_tagged_accept_injects() {
        let mut pipeline = pipeline(defaults());
        let frame = with_vlan(&ipv4_frag_needed([10, 0, 0, 1], 1234));
        pipeline.handle_frame(&frame).unwrap();
        assert_eq!(pipeline.counters().accepted, 1);
        let sent = &pipeline.injector().frames;
        assert_eq!(sent[0][0..6], BROADCAST_MAC);
        assert_eq!(sent[0][12..], frame[12..]);
    }

    #[test]
    fn second_frame_from_same_source_is_rate_limited() {
        let mut pipeline = pipeline(PipelineConfig {
            src_rate: 1.0,
            ..defaults()
        });
        let frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        pipeline.handle_frame(&frame).unwrap();
        pipeline.handle_frame(&frame).unwrap();

        assert_eq!(pipeline.counters().accepted, 1);
        assert_eq!(pipeline.counters().rejected, 1);
        assert_eq!(pipeline.injector().frames.len(), 1);
    }

    #[test]
    fn distinct_sources_hit_the_interface_gate() {
        let mut pipeline = pipeline(PipelineConfig {
            src_rate: 1000.0,
            iface_rate: 1.0,
            ..defaults()
        });
        for host in 1..=10u8 {
            let frame = ipv4_frag_needed([10, 0, 0, host], 1234);
            pipeline.handle_frame(&frame).unwrap();
        }
        assert_eq!(pipeline.counters().accepted, 1);
        assert_eq!(pipeline.counters().rejected, 9);
        assert_eq!(pipeline.injector().frames.len(), 1);
    }

    #[test]
    fn port_allow_list_miss_does_not_inject() {
        let mut allow = BitMap::new(1 << 16);
        allow.set(443);
        let mut pipeline = pipeline(PipelineConfig {
            ports: Some(allow),
            ..defaults()
        });
        let frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        pipeline.handle_frame(&frame).unwrap();
        assert_eq!(pipeline.counters().rejected, 1);
        assert!(pipeline.injector().frames.is_empty());

        let frame = ipv4_frag_needed([10, 0, 0, 1], 443);
        pipeline.handle_frame(&frame).unwrap();
        assert_eq!(pipeline.counters().accepted, 1);
        assert_eq!(pipeline.injector().frames.len(), 1);
    }

    #[test]
    fn already_broadcast_is_rejected_without_side_effects() {
        let mut pipeline = pipeline(defaults());
        let mut frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        frame[0..6].copy_from_slice(&BROADCAST_MAC);
        let before = frame.clone();
        pipeline.handle_frame(&frame).unwrap();

        assert_eq!(pipeline.counters().accepted, 0);
        assert_eq!(pipeline.counters().rejected, 1);
        assert!(pipeline.injector().frames.is_empty());
        assert_eq!(frame, before);
    }

    #[test]
    fn reinjecting_our_own_output_is_rejected() {
        let mut pipeline = pipeline(defaults());
        let frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        pipeline.handle_frame(&frame).unwrap();

        let rebroadcast = pipeline.injector().frames[0].clone();
        pipeline.handle_frame(&rebroadcast).unwrap();
        assert_eq!(pipeline.counters().accepted, 1);
        assert_eq!(pipeline.counters().rejected, 1);
        assert_eq!(pipeline.injector().frames.len(), 1);
    }

    #[test]
    fn dry_run_never_touches_the_injector() {
        let mut pipeline = pipeline(PipelineConfig {
            dry_run: true,
            ..defaults()
        });
        let frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        pipeline.handle_frame(&frame).unwrap();

        // All other work still runs: the accept is classified, admitted,
        // and counted exactly as in a normal run.
        assert_eq!(pipeline.counters().accepted, 1);
        assert!(pipeline.injector().frames.is_empty());
    }

    #[test]
    fn dry_run_swallows_injector_failures() {
        let mut pipeline = Pipeline::new(
            PipelineConfig {
                dry_run: true,
                ..defaults()
            },
            FailingInjector,
        );
        let frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        assert!(pipeline.handle_frame(&frame).is_ok());
    }

    #[test]
    fn fatal_injector_error_propagates() {
        let mut pipeline = Pipeline::new(defaults(), FailingInjector);
        let frame = ipv4_frag_needed([10, 0, 0, 1], 1234);
        assert!(pipeline.handle_frame(&frame).is_err());
    }

    #[test]
    fn rate_limited_sources_stay_independent() {
        let mut pipeline = pipeline(PipelineConfig {
            src_rate: 1.0,
            ..defaults()
        });
        pipeline
            .handle_frame(&ipv4_frag_needed([10, 0, 0, 1], 1234))
            .unwrap();
        pipeline
            .handle_frame(&ipv4_frag_needed([10, 0, 0, 2], 1234))
            .unwrap();
        assert_eq!(pipeline.counters().accepted, 2);
    }
}
