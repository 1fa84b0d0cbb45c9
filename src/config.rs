use crate::error::CoordinatorError;
use clap::Parser;

/// CLI surface: flags accepted by the coordinator binary.
#[derive(Parser, Debug)]
#[command(name = "equihash-coordinator")]
#[command(about = "Stratum coordinator for a fleet of sa-solver Equihash processes")]
pub struct Args {
    /// Increase log verbosity (repeatable: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug-level logging regardless of -v count
    #[arg(long)]
    pub debug: bool,

    /// List solver devices and exit (execs `sa-solver --list`, does not return)
    #[arg(long)]
    pub list: bool,

    /// Comma-separated list of GPU ids to mine on
    #[arg(long = "use", default_value = "0", value_delimiter = ',')]
    pub gpus: Vec<u32>,

    /// Number of solver instances to run per GPU
    #[arg(long, default_value_t = 2)]
    pub instances: u32,

    /// Pool address, e.g. stratum+tcp://pool.example.com:3333
    #[arg(short = 'c', long = "connect", default_value = "stratum+tcp://mg1.zec.2miners.com:1010")]
    pub connect: String,

    /// Pool worker username
    #[arg(short = 'u', long = "user", default_value = "t1default.worker1")]
    pub user: String,

    /// Pool worker password
    #[arg(short = 'p', long = "pwd")]
    pub pwd: Option<String>,
}

/// Immutable configuration derived from parsed CLI flags.
///
/// Held once in `main` and shared (cloned or referenced) by the Stratum
/// client and the solver supervisor — never a global.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pwd: Option<String>,
    pub gpus: Vec<u32>,
    pub instances: u32,
    pub verbosity: u8,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, CoordinatorError> {
        let (host, port) = parse_pool_url(&args.connect)?;
        let verbosity = if args.debug {
            u8::MAX
        } else {
            args.verbose
        };
        Ok(Self {
            host,
            port,
            user: args.user.clone(),
            pwd: args.pwd.clone(),
            gpus: args.gpus.clone(),
            instances: args.instances,
            verbosity,
        })
    }

    /// All configured devids in Cartesian-product order: gpu outer, instance inner.
    pub fn devids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.gpus.len() * self.instances as usize);
        for gpu in &self.gpus {
            for inst in 0..self.instances {
                ids.push(format!("{gpu}.{inst}"));
            }
        }
        ids
    }
}

/// Parses `stratum+tcp://host:port`, splitting on the rightmost colon so
/// IPv6 hosts (which may themselves contain colons) are handled correctly.
pub fn parse_pool_url(url: &str) -> Result<(String, u16), CoordinatorError> {
    let rest = url.strip_prefix("stratum+tcp://").ok_or_else(|| {
        CoordinatorError::Config(format!("pool URL must start with stratum+tcp://: {url}"))
    })?;

    let idx = rest.rfind(':').ok_or_else(|| {
        CoordinatorError::Config(format!("pool URL missing port: {url}"))
    })?;

    let (host, port_str) = rest.split_at(idx);
    let port_str = &port_str[1..];

    if host.is_empty() {
        return Err(CoordinatorError::Config(format!(
            "pool URL missing host: {url}"
        )));
    }

    let port: u16 = port_str
        .parse()
        .map_err(|_| CoordinatorError::Config(format!("invalid port in pool URL: {url}")))?;

    Ok((host.to_string(), port))
}
