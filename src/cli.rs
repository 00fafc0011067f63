use clap::Parser;
use eva_common::EResult;
use mbcycle::config::Config;
use mbcycle::cycle::Sequence;
use mbcycle::interval::parse_duration;
use mbcycle::store::STORE;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[clap(about = "Self-updating modbus server to test the PLC runtime", version)]
struct Args {
    #[clap(
        long = "host",
        help = "Host private network address for the server (avoid loopback address) [default: 0.0.0.0]"
    )]
    host: Option<String>,
    #[clap(long = "port", help = "The port to use for the server [default: 5020]")]
    port: Option<u16>,
    #[clap(
        long = "log",
        value_enum,
        default_value = "info",
        help = "Logging level for the logger"
    )]
    log: LogLevel,
    #[clap(long = "interval", value_parser = parse_interval_arg, help = "Cycle interval (5s, 500ms) [default: 5s]")]
    interval: Option<Duration>,
    #[clap(long = "sequence", value_enum, help = "Discrete input sequence [default: full]")]
    sequence: Option<SequenceArg>,
    #[clap(long = "unit", help = "Answer this modbus unit id only [default: any]")]
    unit: Option<u8>,
    #[clap(long = "timeout", help = "Client socket timeout, seconds [default: 1]")]
    timeout: Option<f64>,
    #[clap(long = "maxconn", help = "Max simultaneous client connections [default: 5]")]
    maxconn: Option<usize>,
    #[clap(short = 'c', long = "config", help = "YAML configuration file")]
    config: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Copy, Clone)]
enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical | LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

#[derive(clap::ValueEnum, Copy, Clone)]
enum SequenceArg {
    Full,
    Toggle,
    Release,
}

impl From<SequenceArg> for Sequence {
    fn from(s: SequenceArg) -> Self {
        match s {
            SequenceArg::Full => Sequence::Full,
            SequenceArg::Toggle => Sequence::Toggle,
            SequenceArg::Release => Sequence::Release,
        }
    }
}

fn parse_interval_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

impl Args {
    fn into_config(self) -> EResult<Config> {
        let mut config = if let Some(ref path) = self.config {
            Config::load(path)?
        } else {
            Config::default()
        };
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(unit) = self.unit {
            config.server.unit = Some(unit);
        }
        if let Some(timeout) = self.timeout {
            config.server.timeout = timeout;
        }
        if let Some(maxconn) = self.maxconn {
            config.server.maxconn = maxconn;
        }
        if let Some(interval) = self.interval {
            config.cycle.interval = interval;
        }
        if let Some(sequence) = self.sequence {
            config.cycle.sequence = sequence.into();
        }
        config.validate()?;
        Ok(config)
    }
}

fn run(args: Args) -> EResult<()> {
    mbcycle::init(args.log.into())?;
    let config = args.into_config()?;
    mbcycle::run(&STORE, &config)
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
