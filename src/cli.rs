//! Command-line interface.
//!
//! The CLI is the whole configuration surface. Value validation happens at
//! parse time: non-positive rates and malformed port numbers are fatal with
//! a diagnostic on standard error.

use clap::Parser;

use crate::bitmap::BitMap;

const DEFAULT_SRC_RATE: f64 = 1.0;
const DEFAULT_IFACE_RATE: f64 = 10.0;

#[derive(Parser, Debug)]
#[command(
    name = "pmtud",
    version,
    about = "Captures ICMP path-MTU messages and rebroadcasts them to the local segment"
)]
pub struct Cli {
    /// Network interface to capture and inject on
    #[arg(short, long)]
    pub iface: String,

    /// Per-source rate limit in packets per second
    #[arg(long, default_value_t = DEFAULT_SRC_RATE, value_parser = parse_rate)]
    pub src_rate: f64,

    /// Aggregate per-interface rate limit in packets per second
    #[arg(long, default_value_t = DEFAULT_IFACE_RATE, value_parser = parse_rate)]
    pub iface_rate: f64,

    /// Increase verbosity (repeatable: 1=accepts, 2=+rejects, 3=+hex dump)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Classify and rate-limit but never inject
    #[arg(short, long)]
    pub dry_run: bool,

    /// Pin the process to this CPU core (best effort)
    #[arg(long)]
    pub cpu: Option<usize>,

    /// Forward only when the quoted L4 source port is on this
    /// comma-separated list
    #[arg(long, value_delimiter = ',')]
    pub ports: Option<Vec<u16>>,
}

impl Cli {
    /// Build the port allow-list bitmap, if `--ports` was given.
    pub fn port_allow_list(&self) -> Option<BitMap> {
        let ports = self.ports.as_ref()?;
        let mut map = BitMap::new(1 << 16);
        for &port in ports {
            map.set(usize::from(port));
        }
        Some(map)
    }
}

fn parse_rate(arg: &str) -> Result<f64, String> {
    let rate: f64 = arg
        .parse()
        .map_err(|_| format!("not a number: {arg:?}"))?;
    if rate > 0.0 {
        Ok(rate)
    } else {
        Err("rates must be greater than zero".into())
    }
}
