use crate::tasks;
use eva_common::{EResult, Error};
use log::warn;
use serde::{Deserialize, Deserializer};
use std::cmp::Ordering;
use std::time::Duration;
use std::time::Instant;

pub struct Loop {
    next_iter: Instant,
    interval: Duration,
}

#[negative_impl::negative_impl]
impl !Send for Loop {}

impl Loop {
    /// The first iteration is not delayed, the next one is scheduled at now + interval
    pub fn prepare(interval: Duration) -> Self {
        Loop {
            next_iter: Instant::now() + interval,
            interval,
        }
    }

    /// Sleeps until the next iteration, returns false if the iteration is late
    pub fn tick(&mut self) -> bool {
        let t = Instant::now();
        let result = match t.cmp(&self.next_iter) {
            Ordering::Greater => false,
            Ordering::Equal => true,
            Ordering::Less => {
                tasks::sleep(self.next_iter - t);
                true
            }
        };
        if result {
            self.next_iter += self.interval;
        } else {
            warn!(
                "{} loop timeout ({:?} + {:?})",
                tasks::thread_name(),
                self.interval,
                t - self.next_iter
            );
            self.next_iter = Instant::now() + self.interval;
        }
        result
    }
}

/// Parses interval as nanoseconds: 5s, 500ms, 10us, 7ns, a bare number is seconds
pub fn parse_interval(s: &str) -> EResult<u64> {
    let s = s.trim();
    let nanos = if let Some(v) = s.strip_suffix("ms") {
        v.parse::<u64>()?.checked_mul(1_000_000)
    } else if let Some(v) = s.strip_suffix("us") {
        v.parse::<u64>()?.checked_mul(1_000)
    } else if let Some(v) = s.strip_suffix("ns") {
        Some(v.parse::<u64>()?)
    } else if let Some(v) = s.strip_suffix('s') {
        v.parse::<u64>()?.checked_mul(1_000_000_000)
    } else {
        s.parse::<u64>()?.checked_mul(1_000_000_000)
    };
    match nanos {
        Some(0) => Err(Error::invalid_params("interval can not be zero")),
        Some(v) => Ok(v),
        None => Err(Error::invalid_params(format!("interval too large: {}", s))),
    }
}

#[inline]
pub fn parse_duration(s: &str) -> EResult<Duration> {
    parse_interval(s).map(Duration::from_nanos)
}

#[inline]
pub(crate) fn deserialize_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    parse_duration(&buf).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("5s").unwrap(), 5_000_000_000);
        assert_eq!(parse_interval("500ms").unwrap(), 500_000_000);
        assert_eq!(parse_interval("10us").unwrap(), 10_000);
        assert_eq!(parse_interval("7ns").unwrap(), 7);
        assert_eq!(parse_interval("3").unwrap(), 3_000_000_000);
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("5m").is_err());
        assert!(parse_interval("").is_err());
        assert!(parse_interval("-1s").is_err());
        assert!(parse_interval("18446744073709551615s").is_err());
    }

    #[test]
    fn test_loop() {
        let interval = Duration::from_millis(20);
        let mut int = Loop::prepare(interval);
        let t = Instant::now();
        assert!(int.tick());
        assert!(int.tick());
        assert!(t.elapsed() >= Duration::from_millis(35));
        tasks::sleep(Duration::from_millis(50));
        assert!(!int.tick());
        let t = Instant::now();
        assert!(int.tick());
        assert!(t.elapsed() >= Duration::from_millis(10));
    }
}
