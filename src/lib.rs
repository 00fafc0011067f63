use eva_common::{EResult, Error};
use log::{debug, info};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::env;
use std::panic;
use std::sync::atomic;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod config;
pub mod cycle;
pub mod interval;
pub mod server;
pub mod store;
pub mod tasks;

pub mod prelude {
    pub use super::config::Config;
    pub use super::cycle::Sequence;
    pub use super::server::Identity;
    pub use super::store::{Bank, LockedStore, Store, STORE};
    pub use super::ServerInfo;
    pub use log::{debug, error, info, trace, warn};
}

pub type LockedContext<C> = RwLock<C>;

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static HOSTNAME: OnceCell<String> = OnceCell::new();
static STARTUP_TIME: OnceCell<Instant> = OnceCell::new();

static TERM_FLAG: Lazy<Arc<atomic::AtomicBool>> =
    Lazy::new(|| Arc::new(atomic::AtomicBool::new(false)));

fn sigterm_received() -> bool {
    TERM_FLAG.load(atomic::Ordering::SeqCst)
}

/// Collection of the server info, set once before serving starts
pub struct ServerInfo {
    context: &'static store::LockedStore,
    identity: server::Identity,
    server: server::modbus::ServerConfig,
}

impl ServerInfo {
    pub fn new(
        context: &'static store::LockedStore,
        identity: server::Identity,
        server: server::modbus::ServerConfig,
    ) -> Self {
        Self {
            context,
            identity,
            server,
        }
    }
    pub fn from_config(context: &'static store::LockedStore, config: &config::Config) -> Self {
        Self::new(context, config.identity.clone(), config.server.clone())
    }
    #[inline]
    pub fn context(&self) -> &'static store::LockedStore {
        self.context
    }
    #[inline]
    pub fn identity(&self) -> &server::Identity {
        &self.identity
    }
    #[inline]
    pub fn server_config(&self) -> &server::modbus::ServerConfig {
        &self.server
    }
    #[inline]
    pub fn address(&self) -> (&str, u16) {
        (&self.server.host, self.server.port)
    }
    #[inline]
    pub fn listen(&self) -> String {
        server::modbus::listen_address(&self.server.host, self.server.port)
    }
}

#[inline]
pub fn hostname() -> &'static str {
    HOSTNAME.get().map_or("", String::as_str)
}

#[inline]
pub fn uptime() -> Duration {
    STARTUP_TIME.get().map_or(Duration::ZERO, Instant::elapsed)
}

/// Initializes the panic hook and logging
///
/// Environment: SYSLOG=1 logs to the local syslog, VERBOSE=1 forces the trace level
pub fn init(level: log::LevelFilter) -> EResult<()> {
    panic::set_hook(Box::new(|s| {
        println!("PANIC: {}", s);
        std::process::exit(1);
    }));
    let hostname = hostname::get()
        .map_err(|e| Error::failed(format!("unable to get hostname: {}", e)))?
        .to_string_lossy()
        .to_string();
    let _ = HOSTNAME.set(hostname);
    let _ = STARTUP_TIME.set(Instant::now());
    let verbose: bool = env::var("VERBOSE").ok().map_or(false, |v| v == "1");
    let syslog: bool = env::var("SYSLOG").ok().map_or(false, |v| v == "1");
    let level = if verbose {
        log::LevelFilter::Trace
    } else {
        level
    };
    if syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: NAME.to_owned(),
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| Error::failed(format!("unable to connect to syslog: {}", e)))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map_err(Error::failed)?;
        log::set_max_level(level);
    } else {
        env_logger::Builder::new()
            .target(env_logger::Target::Stdout)
            .filter_level(level)
            .format_timestamp_millis()
            .try_init()
            .map_err(Error::failed)?;
    }
    debug!("log initialization completed");
    Ok(())
}

fn register_signals() -> EResult<()> {
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&TERM_FLAG))
        .map_err(Error::failed)?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&TERM_FLAG))
        .map_err(Error::failed)?;
    Ok(())
}

/// Starts the server and the cycle driver, blocks until SIGTERM/SIGINT
pub fn run(context: &'static store::LockedStore, config: &config::Config) -> EResult<()> {
    config.validate()?;
    let info = ServerInfo::from_config(context, config);
    tasks::set_starting();
    info!("system: {}", hostname());
    info!("{} {}", NAME, VERSION);
    register_signals()?;
    let identity = info.identity();
    info!(
        "starting server \"{}\" ({} {}, {}) @{}",
        identity.product_name,
        identity.vendor_name,
        identity.product_code,
        identity.major_minor_revision,
        info.listen()
    );
    for bank in [
        store::Bank::Coil,
        store::Bank::Discrete,
        store::Bank::Input,
        store::Bank::Holding,
    ] {
        info!(
            "{}: {} registers, function codes {:?}",
            bank,
            bank.size(),
            bank.function_codes()
        );
    }
    server::modbus::spawn_server(&info)?;
    cycle::spawn_cycle_driver(info.context(), config.cycle.sequence, config.cycle.interval)?;
    tasks::set_active();
    while !sigterm_received() {
        tasks::step_sleep();
    }
    tasks::set_stopping();
    info!("shutting down, uptime: {:?}", uptime());
    tasks::set_stopped();
    Ok(())
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_server_info() {
        let mut config = config::Config::default();
        config.server.host = String::new();
        config.server.port = 502;
        let info = ServerInfo::from_config(&store::STORE, &config);
        assert_eq!(info.address(), ("", 502));
        assert_eq!(info.listen(), "0.0.0.0:502");
        assert_eq!(info.server_config().unit, None);
        assert_eq!(info.identity().product_name, "mbcycle Server");
        assert_eq!(
            info.context()
                .read()
                .read(store::Bank::Input, 0, 16)
                .unwrap(),
            vec![store::DEFAULT_VALUE; 16]
        );
    }
}
