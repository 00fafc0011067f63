//! Discrete input rotation
//!
//! The first two discrete inputs emulate a push button and a switch which drive the lamp of the
//! tested PLC program: the button turns the lamp on, the switch turns it off.
use crate::store::{Bank, LockedStore};
use crate::tasks;
use bmart_derive::EnumStr;
use eva_common::EResult;
use log::{debug, error, info};
use serde::Deserialize;
use std::thread;
use std::time::Duration;

/// Discrete input the rotated pair starts at
pub const CYCLE_OFFSET: u16 = 0;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

const FULL: [[u16; 2]; 5] = [
    // turn the lamp on
    [1, 0],
    // release the button, the lamp is still on
    [0, 0],
    // turn the lamp off
    [0, 1],
    // both pressed, the lamp stays off
    [1, 1],
    // all released, the lamp stays off
    [0, 0],
];

const TOGGLE: [[u16; 2]; 4] = [[1, 0], [0, 0], [0, 1], [1, 1]];

const RELEASE: [[u16; 2]; 4] = [[1, 0], [0, 0], [0, 1], [0, 0]];

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Deserialize, EnumStr)]
#[enumstr(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sequence {
    #[default]
    Full,
    Toggle,
    Release,
}

impl Sequence {
    #[inline]
    fn table(self) -> &'static [[u16; 2]] {
        match self {
            Sequence::Full => &FULL,
            Sequence::Toggle => &TOGGLE,
            Sequence::Release => &RELEASE,
        }
    }
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(self) -> usize {
        self.table().len()
    }
    /// # Panics
    ///
    /// Will panic if the state is out of the sequence
    #[inline]
    pub fn values(self, state: usize) -> [u16; 2] {
        self.table()[state]
    }
}

pub struct Cycle {
    sequence: Sequence,
    state: usize,
}

impl Cycle {
    pub fn new(sequence: Sequence) -> Self {
        Self { sequence, state: 0 }
    }
    #[inline]
    pub fn state(&self) -> usize {
        self.state
    }
    /// Returns values of the current state and moves to the next one
    pub fn advance(&mut self) -> [u16; 2] {
        let values = self.sequence.values(self.state);
        self.state = if self.state + 1 == self.sequence.len() {
            0
        } else {
            self.state + 1
        };
        values
    }
    /// Updates the rotated discrete inputs
    ///
    /// The state is advanced once the current values are read, even if the write fails.
    pub fn step(&mut self, ctx: &LockedStore) -> EResult<[u16; 2]> {
        debug!("updating the context");
        let mut store = ctx.write();
        let current = store.read(Bank::Discrete, CYCLE_OFFSET, 2)?;
        debug!("current values: {:?}", current);
        let values = self.advance();
        info!("new values: {:?}", values);
        store.write(Bank::Discrete, CYCLE_OFFSET, &values)?;
        Ok(values)
    }
}

pub fn spawn_cycle_driver(
    ctx: &'static LockedStore,
    sequence: Sequence,
    interval: Duration,
) -> EResult<thread::JoinHandle<()>> {
    info!(
        "cycle sequence: {} ({} states), interval: {:?}",
        sequence,
        sequence.len(),
        interval
    );
    let mut cycle = Cycle::new(sequence);
    tasks::spawn_program_loop("cycle", interval, move || {
        if let Err(e) = cycle.step(ctx) {
            error!("cycle update error: {}", e);
        }
    })
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::store::Store;
    use parking_lot::RwLock;
    use std::time::Instant;

    fn wait_for(ctx: &LockedStore, values: [u16; 2], timeout: Duration) -> Duration {
        let t = Instant::now();
        loop {
            if ctx.read().read(Bank::Discrete, CYCLE_OFFSET, 2).unwrap() == values {
                return t.elapsed();
            }
            assert!(t.elapsed() < timeout, "{:?} not written in {:?}", values, timeout);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_tables() {
        let full: Vec<[u16; 2]> = (0..5).map(|s| Sequence::Full.values(s)).collect();
        assert_eq!(full, vec![[1, 0], [0, 0], [0, 1], [1, 1], [0, 0]]);
        let toggle: Vec<[u16; 2]> = (0..4).map(|s| Sequence::Toggle.values(s)).collect();
        assert_eq!(toggle, vec![[1, 0], [0, 0], [0, 1], [1, 1]]);
        let release: Vec<[u16; 2]> = (0..4).map(|s| Sequence::Release.values(s)).collect();
        assert_eq!(release, vec![[1, 0], [0, 0], [0, 1], [0, 0]]);
        assert_eq!(Sequence::default(), Sequence::Full);
        assert_eq!(Sequence::Release.to_string(), "release");
    }

    #[test]
    fn test_wrap() {
        for sequence in [Sequence::Full, Sequence::Toggle, Sequence::Release] {
            let mut cycle = Cycle::new(sequence);
            let first: Vec<[u16; 2]> = (0..sequence.len()).map(|_| cycle.advance()).collect();
            assert_eq!(cycle.state(), 0);
            let second: Vec<[u16; 2]> = (0..sequence.len()).map(|_| cycle.advance()).collect();
            assert_eq!(first, second);
            cycle.advance();
            assert_eq!(cycle.state(), 1);
        }
    }

    #[test]
    fn test_step() {
        let ctx: LockedStore = RwLock::new(Store::default());
        let mut cycle = Cycle::new(Sequence::Full);
        let mut seen = Vec::new();
        for _ in 0..6 {
            let values = cycle.step(&ctx).unwrap();
            let stored = ctx.read().read(Bank::Discrete, 0, 2).unwrap();
            assert_eq!(stored, values.to_vec());
            seen.push(values);
        }
        assert_eq!(
            seen,
            vec![[1, 0], [0, 0], [0, 1], [1, 1], [0, 0], [1, 0]]
        );
        let store = ctx.read();
        assert_eq!(store.read(Bank::Discrete, 2, 6).unwrap(), vec![1; 6]);
        assert_eq!(store.read(Bank::Holding, 0, 16).unwrap(), vec![17; 16]);
        assert_eq!(store.read(Bank::Coil, 0, 8).unwrap(), vec![1; 8]);
    }

    #[test]
    fn test_cycle_driver() {
        let ctx: &'static LockedStore = Box::leak(Box::new(RwLock::new(Store::with_default(0))));
        let interval = Duration::from_millis(200);
        let t = Instant::now();
        spawn_cycle_driver(ctx, Sequence::Full, interval).unwrap();
        wait_for(ctx, [1, 0], Duration::from_secs(5));
        assert!(t.elapsed() < interval);
        let next = wait_for(ctx, [0, 0], Duration::from_secs(5));
        assert!(next >= Duration::from_millis(100));
        wait_for(ctx, [0, 1], Duration::from_secs(5));
        assert!(t.elapsed() >= Duration::from_millis(350));
    }
}
