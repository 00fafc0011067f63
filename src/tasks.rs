use crate::interval::Loop;
use bmart_derive::EnumStr;
use eva_common::{EResult, Error};
use log::{debug, info};
use std::sync::atomic;
use std::thread;
use std::time::Duration;

static STATUS: atomic::AtomicI16 = atomic::AtomicI16::new(Status::Inactive as i16);

pub const SLEEP_STEP: Duration = Duration::from_millis(500);
pub const SLEEP_STEP_ERR: Duration = Duration::from_secs(2);

const MAX_TASK_NAME_LEN: usize = 14;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, EnumStr)]
#[repr(i16)]
#[enumstr(rename_all = "UPPERCASE")]
pub enum Status {
    Inactive = 0,   // server is launched
    Starting = 1,   // tasks are being spawned
    Active = 100,   // serving, the cycle is running
    Stopping = -1,  // termination requested, loops must quit
    Stopped = -100, // ready to exit
    Unknown = -200,
}

impl From<i16> for Status {
    fn from(s: i16) -> Status {
        match s {
            x if x == Status::Inactive as i16 => Status::Inactive,
            x if x == Status::Starting as i16 => Status::Starting,
            x if x == Status::Active as i16 => Status::Active,
            x if x == Status::Stopping as i16 => Status::Stopping,
            x if x == Status::Stopped as i16 => Status::Stopped,
            _ => Status::Unknown,
        }
    }
}

#[inline]
fn set_status(status: Status) {
    STATUS.store(status as i16, atomic::Ordering::SeqCst);
    info!("server status: {}", status);
}

#[inline]
pub fn status() -> Status {
    STATUS.load(atomic::Ordering::SeqCst).into()
}

#[inline]
pub(crate) fn set_starting() {
    if status() != Status::Stopping {
        set_status(Status::Starting);
    }
}

#[inline]
pub(crate) fn set_active() {
    if status() == Status::Starting {
        set_status(Status::Active);
    }
}

#[inline]
pub(crate) fn set_stopping() {
    set_status(Status::Stopping);
}

#[inline]
pub fn set_stopped() {
    set_status(Status::Stopped);
}

#[inline]
pub(crate) fn need_stop() -> bool {
    status() <= Status::Stopping
}

#[inline]
pub fn step_sleep() {
    sleep(SLEEP_STEP);
}

#[inline]
pub fn sleep(duration: Duration) {
    thread::sleep(duration);
}

#[inline]
pub fn step_sleep_err() {
    sleep(SLEEP_STEP_ERR);
}

pub fn thread_name() -> String {
    let th = thread::current();
    if let Some(name) = th.name() {
        name.to_owned()
    } else {
        format!("{:?}", th.id())
    }
}

#[derive(Eq, PartialEq, Copy, Clone, EnumStr)]
#[enumstr(rename_all = "lowercase")]
pub enum Kind {
    Program,
    Service,
}

impl Kind {
    fn thread_prefix(self) -> &'static str {
        match self {
            Kind::Program => "P",
            Kind::Service => "S",
        }
    }
}

/// Spawns a named thread, the name is prefixed with the task kind
pub fn spawn<F>(name: &str, kind: Kind, f: F) -> EResult<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    if name.len() > MAX_TASK_NAME_LEN {
        return Err(Error::invalid_params(format!(
            "task name MUST be LESS than {} characters ({})",
            MAX_TASK_NAME_LEN + 1,
            name
        )));
    }
    let name = format!("{}{}", kind.thread_prefix(), name);
    debug!("spawning {} task {}", kind, name);
    thread::Builder::new()
        .name(name)
        .spawn(f)
        .map_err(Error::failed)
}

#[inline]
pub fn spawn_service<F>(name: &str, f: F) -> EResult<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    spawn(name, Kind::Service, f)
}

/// Runs the program every interval until the server is stopping
pub fn spawn_program_loop<F>(
    name: &str,
    interval: Duration,
    mut prog: F,
) -> EResult<thread::JoinHandle<()>>
where
    F: FnMut() + Send + 'static,
{
    spawn(name, Kind::Program, move || {
        let mut int = Loop::prepare(interval);
        loop {
            debug!("loop {} running", thread_name());
            prog();
            if need_stop() {
                break;
            }
            int.tick();
        }
        debug!("loop {} finished", thread_name());
    })
}

#[cfg(test)]
mod test {

    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_status_from_i16() {
        assert_eq!(Status::from(100), Status::Active);
        assert_eq!(Status::from(-1), Status::Stopping);
        assert_eq!(Status::from(42), Status::Unknown);
        assert!(Status::Stopped < Status::Stopping);
        assert!(Status::Active > Status::Starting);
        assert_eq!(Status::Active.to_string(), "ACTIVE");
    }

    #[test]
    fn test_spawn() {
        let (tx, rx) = mpsc::channel();
        spawn_service("tname", move || {
            tx.send(thread_name()).unwrap();
        })
        .unwrap()
        .join()
        .unwrap();
        assert_eq!(rx.recv().unwrap(), "Stname");
        assert!(spawn_service("a_very_long_task_name", || {}).is_err());
    }
}
