//! CLI surface (spec.md §6, SPEC_FULL.md §4.K): `clap`-derived flags,
//! not hand-rolled `argv` scanning, even though spec.md treats the CLI
//! as a "collaborator contract" rather than core.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use crate::dispatch::DispatchMode;
use crate::error::ConfigError;

#[derive(Parser, Debug, Clone)]
#[command(name = "mainmemoryd", about = "A multi-threaded memcached-compatible in-memory cache")]
pub struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub addr: String,

    /// Port to bind.
    #[arg(long, default_value_t = 11211)]
    pub port: u16,

    /// Total cache volume budget across all partitions, in bytes.
    #[arg(long, default_value_t = 64 << 20)]
    pub volume: usize,

    /// Worker thread count (one partition + one listener per thread).
    #[arg(long)]
    pub threads: Option<usize>,

    /// CPU affinity bitset, e.g. "0,2,3"; empty means no pinning.
    #[arg(long, default_value = "")]
    pub affinity: String,

    /// Commands parsed per event-loop turn before handing control back.
    #[arg(long, default_value_t = 32)]
    pub batch: usize,

    /// Receive buffer segment size, bytes.
    #[arg(long, default_value_t = 8192)]
    pub rx_chunk: usize,

    /// Transmit buffer segment size, bytes.
    #[arg(long, default_value_t = 8192)]
    pub tx_chunk: usize,

    /// Action-dispatch routing mode (SPEC_FULL.md §4.K supplement; the
    /// original source picks this at compile time via
    /// ENABLE_MEMCACHE_{COMBINER,DELEGATE,LOCKING}).
    #[arg(long, default_value = "direct")]
    pub dispatch: String,
}

/// Resolved, validated configuration built from `Args`.
pub struct Config {
    pub bind_addr: SocketAddr,
    pub volume_budget_total: usize,
    pub threads: usize,
    pub affinity: Vec<usize>,
    pub batch_size: usize,
    pub rx_chunk: usize,
    pub tx_chunk: usize,
    pub dispatch: DispatchMode,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let ip: IpAddr = args.addr.parse().map_err(|e| ConfigError::BadAddr(args.addr.clone(), e))?;
        let bind_addr = SocketAddr::new(ip, args.port);

        let threads = match args.threads {
            Some(0) => return Err(ConfigError::ZeroThreads),
            Some(n) => n,
            None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };

        let affinity = if args.affinity.is_empty() {
            Vec::new()
        } else {
            args.affinity
                .split(',')
                .map(|tok| tok.trim().parse::<usize>().map_err(|_| ConfigError::BadAffinity(args.affinity.clone())))
                .collect::<Result<Vec<_>, _>>()?
        };

        let dispatch = args.dispatch.parse().map_err(|_| ConfigError::BadDispatch(args.dispatch.clone()))?;

        Ok(Self {
            bind_addr,
            volume_budget_total: args.volume,
            threads,
            affinity,
            batch_size: args.batch.max(1),
            rx_chunk: args.rx_chunk.max(2000),
            tx_chunk: args.tx_chunk.max(2000),
            dispatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("mainmemoryd").chain(argv.iter().copied()))
    }

    #[test]
    fn defaults_match_spec() {
        let args = parse(&[]);
        let cfg = Config::from_args(args).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:11211".parse().unwrap());
        assert_eq!(cfg.volume_budget_total, 64 << 20);
        assert_eq!(cfg.dispatch, DispatchMode::Direct);
    }

    #[test]
    fn rejects_zero_threads() {
        let args = parse(&["--threads", "0"]);
        assert!(matches!(Config::from_args(args), Err(ConfigError::ZeroThreads)));
    }

    #[test]
    fn chunk_sizes_floor_at_2000_bytes() {
        let args = parse(&["--rx-chunk", "10", "--tx-chunk", "10"]);
        let cfg = Config::from_args(args).unwrap();
        assert_eq!(cfg.rx_chunk, 2000);
        assert_eq!(cfg.tx_chunk, 2000);
    }

    #[test]
    fn rejects_bad_dispatch_mode() {
        let args = parse(&["--dispatch", "bogus"]);
        assert!(matches!(Config::from_args(args), Err(ConfigError::BadDispatch(_))));
    }

    #[test]
    fn affinity_list_parses() {
        let args = parse(&["--affinity", "0,2,3"]);
        let cfg = Config::from_args(args).unwrap();
        assert_eq!(cfg.affinity, vec![0, 2, 3]);
    }
}
