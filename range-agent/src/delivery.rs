//! Fetching the configuration from the kernel
//!
//! Freshly booted machines often come up before the kernel does, and a whole
//! lab boots at once. The agent therefore waits a random startup delay, then
//! polls `GET /config` with a fixed attempt budget.

use range_model::ConfigurationResponse;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("undecodable configuration: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("no configuration after {attempts} attempt(s), last error: {last}")]
pub struct DeliveryError {
    pub attempts: u32,
    #[source]
    pub last: FetchError,
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub trait Jitter {
    /// Uniform in `[0, max]`, whole seconds.
    fn startup_delay(&self, max: Duration) -> Duration;
}

/// Draws from a generator seeded by the OS CSPRNG; falls back to half the
/// window if the OS source is unavailable.
pub struct OsJitter;

fn draw_secs(rng: &mut impl Rng, max_secs: u64) -> u64 {
    rng.random_range(0..=max_secs)
}

impl Jitter for OsJitter {
    fn startup_delay(&self, max: Duration) -> Duration {
        let max_secs = max.as_secs();
        if max_secs == 0 {
            return Duration::ZERO;
        }
        let secs = match StdRng::try_from_os_rng() {
            Ok(mut rng) => draw_secs(&mut rng, max_secs),
            Err(e) => {
                warn!("OS random source unavailable ({e}), using half the delay window");
                max_secs / 2
            }
        };
        Duration::from_secs(secs)
    }
}

pub trait ConfigFetcher {
    fn fetch(&self, mac: &str) -> Result<ConfigurationResponse, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    config_url: String,
}

impl HttpFetcher {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config_url: format!("{}/config", server_url.trim_end_matches('/')) })
    }
}

impl ConfigFetcher for HttpFetcher {
    fn fetch(&self, mac: &str) -> Result<ConfigurationResponse, FetchError> {
        let resp = self.client.get(&self.config_url).query(&[("mac", mac)]).send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), body: body.trim().to_string() });
        }
        // decode errors stay distinct from transport errors
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Sleeps the jittered startup delay and returns it.
pub fn startup_delay(jitter: &dyn Jitter, sleeper: &dyn Sleeper, max: Duration) -> Duration {
    let delay = jitter.startup_delay(max);
    if !delay.is_zero() {
        info!("waiting {}s before contacting the server", delay.as_secs());
        sleeper.sleep(delay);
    }
    delay
}

/// Every failure is retryable; the delay only separates attempts.
pub fn fetch_with_retry(
    fetcher: &dyn ConfigFetcher,
    sleeper: &dyn Sleeper,
    policy: RetryPolicy,
    mac: &str,
) -> Result<ConfigurationResponse, DeliveryError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        info!("requesting configuration for {mac} (attempt {attempt}/{attempts})");
        match fetcher.fetch(mac) {
            Ok(config) => return Ok(config),
            Err(last) if attempt >= attempts => return Err(DeliveryError { attempts, last }),
            Err(e) => {
                warn!("attempt {attempt}/{attempts} failed: {e}, retrying in {}s", policy.delay.as_secs());
                sleeper.sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}
