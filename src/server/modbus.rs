use crate::store::{LockedStore, COILS, DISCRETES, HOLDINGS, INPUTS};
use crate::tasks;
use crate::ServerInfo;
use eva_common::{EResult, Error};
use log::{debug, error, info};
use serde::Deserialize;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use rmodbus::{
    server::{context::ModbusContext, ModbusFrame},
    ModbusFrameBuf, ModbusProto,
};

pub const DEFAULT_PORT: u16 = 5020;

pub trait SlaveContext<const C: usize, const D: usize, const I: usize, const H: usize> {
    fn modbus_context(&self) -> &ModbusContext<C, D, I, H>;
    fn modbus_context_mut(&mut self) -> &mut ModbusContext<C, D, I, H>;
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> f64 {
    1.0
}

fn default_maxconn() -> usize {
    5
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Answer this unit only, None answers any unit id
    #[serde(default)]
    pub unit: Option<u8>,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_maxconn")]
    pub maxconn: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unit: None,
            timeout: default_timeout(),
            maxconn: default_maxconn(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> EResult<()> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(Error::invalid_params(format!(
                "invalid modbus server timeout: {}",
                self.timeout
            )));
        }
        if self.maxconn == 0 {
            return Err(Error::invalid_params(
                "modbus server maxconn must be greater than zero",
            ));
        }
        Ok(())
    }
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

/// Formats host and port as a listen string, an empty host means all interfaces
pub fn listen_address(host: &str, port: u16) -> String {
    if host.is_empty() {
        format!("{}:{}", default_host(), port)
    } else if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Unit frames are processed as when any unit id is answered
const ANY_UNIT_FRAME_UNIT: u8 = 1;

const MBAP_UNIT_POS: usize = 6;

pub fn handle_tcp_stream<X, const C: usize, const D: usize, const I: usize, const H: usize>(
    stream: Result<TcpStream, std::io::Error>,
    ctx: &'static crate::LockedContext<X>,
    unit: Option<u8>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>>
where
    X: SlaveContext<C, D, I, H>,
{
    let mut stream = stream?;
    let peer = stream.peer_addr()?;
    debug!("modbus client connected: {}", peer);
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    loop {
        let mut buf: ModbusFrameBuf = [0; 256];
        let mut response = Vec::new();
        let len = stream.read(&mut buf).unwrap_or(0);
        if len == 0 {
            break;
        }
        let request_unit = buf[MBAP_UNIT_POS];
        // 0 and 255 are broadcasts for the library, which never answers them
        let frame_unit = if let Some(u) = unit {
            u
        } else {
            buf[MBAP_UNIT_POS] = ANY_UNIT_FRAME_UNIT;
            ANY_UNIT_FRAME_UNIT
        };
        let response_required = {
            let mut frame =
                ModbusFrame::new(frame_unit, &buf, ModbusProto::TcpUdp, &mut response);
            frame.parse()?;
            if frame.processing_required {
                if frame.readonly {
                    frame.process_read(ctx.read().modbus_context())?;
                } else {
                    frame.process_write(ctx.write().modbus_context_mut())?;
                };
            }
            if frame.response_required {
                frame.finalize_response()?;
            }
            frame.response_required
        };
        if response_required {
            if unit.is_none() {
                if let Some(u) = response.get_mut(MBAP_UNIT_POS) {
                    *u = request_unit;
                }
            }
            if stream.write_all(response.as_slice()).is_err() {
                break;
            }
        }
    }
    debug!("modbus client disconnected: {}", peer);
    Ok(())
}

/// Serves the bound listener, connections are processed by a pool of maxconn workers
pub fn serve<X, const C: usize, const D: usize, const I: usize, const H: usize>(
    listener: TcpListener,
    unit: Option<u8>,
    ctx: &'static crate::LockedContext<X>,
    timeout: Duration,
    maxconn: usize,
) -> Result<(), Box<dyn std::error::Error>>
where
    X: SlaveContext<C, D, I, H> + Send + Sync + 'static,
{
    let pool = threadpool::ThreadPool::new(maxconn);
    for stream in listener.incoming() {
        pool.execute(move || {
            if let Err(e) = handle_tcp_stream(stream, ctx, unit, timeout) {
                error!("modbus server error: {}", e);
            }
        });
    }
    Ok(())
}

pub fn tcp_server<X, const C: usize, const D: usize, const I: usize, const H: usize>(
    unit: Option<u8>,
    listen: &str,
    ctx: &'static crate::LockedContext<X>,
    timeout: Duration,
    maxconn: usize,
) -> Result<(), Box<dyn std::error::Error>>
where
    X: SlaveContext<C, D, I, H> + Send + Sync + 'static,
{
    let listener = TcpListener::bind(listen)?;
    if let Some(u) = unit {
        info!("modbus listener started at: {listen}, unit: {u}");
    } else {
        info!("modbus listener started at: {listen}, any unit");
    }
    serve(listener, unit, ctx, timeout, maxconn)
}

/// Runs the listener in a service task, the listener is restarted on errors
pub fn spawn_server(info: &ServerInfo) -> EResult<thread::JoinHandle<()>> {
    let config = info.server_config();
    config.validate()?;
    let ctx: &'static LockedStore = info.context();
    let listen = info.listen();
    let unit = config.unit;
    let timeout = config.timeout();
    let maxconn = config.maxconn;
    tasks::spawn_service("modbus", move || loop {
        if let Err(e) = tcp_server::<_, COILS, DISCRETES, INPUTS, HOLDINGS>(
            unit, &listen, ctx, timeout, maxconn,
        ) {
            error!("modbus server tcp {} error: {e}", listen);
        }
        if tasks::need_stop() {
            break;
        }
        tasks::step_sleep_err();
    })
}
