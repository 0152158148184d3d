//! Reconnecting a dropped client with exponential backoff and jitter.
//!
//! The server keeps no state for a departed connection: its entity is
//! destroyed on disconnect. A reconnect is therefore a fresh handshake, and
//! this module only decides *when* to try.

use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;

use crate::client::{ClientConfig, NetClient};

/// Backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt. Default: 500 ms.
    pub initial_delay: Duration,
    /// Growth factor per failed attempt. Default: 2.
    pub multiplier: f64,
    /// Delay ceiling. Default: 30 s.
    pub max_delay: Duration,
    /// Attempts before giving up. Default: 10.
    pub max_attempts: u32,
    /// Relative jitter in `[0, 1]`, applied symmetrically. Default: 0.2.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter: 0.2,
        }
    }
}

/// Attempt counter and current delay.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    delay: Duration,
}

impl ReconnectState {
    /// Fresh state.
    pub fn new(config: ReconnectConfig) -> Self {
        let delay = config.initial_delay;
        Self {
            config,
            attempts: 0,
            delay,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;

        let base = self.delay;
        self.delay = base
            .mul_f64(self.config.multiplier.max(1.0))
            .min(self.config.max_delay);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let delay = if jitter > 0.0 {
            base.mul_f64(rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter)))
        } else {
            base
        };
        Some(delay.min(self.config.max_delay))
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Back to the initial delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay = self.config.initial_delay;
    }
}

/// Reconnection failure.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: std::io::Error,
    },
    /// The schedule allows no attempts at all.
    #[error("reconnection disabled")]
    Disabled,
}

/// Keeps trying to connect to `addr` on the backoff schedule.
pub async fn reconnect(
    addr: SocketAddr,
    schedule: ReconnectConfig,
    client: &ClientConfig,
) -> Result<NetClient, ReconnectError> {
    let mut state = ReconnectState::new(schedule);
    let mut last = None;

    while let Some(delay) = state.next_delay() {
        tracing::info!(attempt = state.attempts(), ?delay, server = %addr, "reconnecting");
        tokio::time::sleep(delay).await;
        match NetClient::connect(addr, client).await {
            Ok(connection) => {
                tracing::info!(attempts = state.attempts(), "reconnected");
                return Ok(connection);
            }
            Err(e) => {
                tracing::warn!(attempt = state.attempts(), error = %e, "reconnect failed");
                last = Some(e);
            }
        }
    }

    match last {
        Some(last) => Err(ReconnectError::Exhausted {
            attempts: state.attempts(),
            last,
        }),
        None => Err(ReconnectError::Disabled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            jitter: 0.0,
            ..ReconnectConfig::default()
        }
    }

    #[test]
    fn test_delays_double_until_capped() {
        let mut state = ReconnectState::new(ReconnectConfig {
            max_delay: Duration::from_millis(350),
            ..steady()
        });
        let delays: Vec<u128> = std::iter::from_fn(|| state.next_delay())
            .take(5)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 350, 350, 350]);
    }

    #[test]
    fn test_attempts_exhaust_and_reset() {
        let mut state = ReconnectState::new(ReconnectConfig {
            max_attempts: 2,
            ..steady()
        });
        assert!(state.next_delay().is_some());
        assert!(state.next_delay().is_some());
        assert!(state.next_delay().is_none());
        assert_eq!(state.attempts(), 2);

        state.reset();
        assert_eq!(state.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            jitter: 0.2,
            ..ReconnectConfig::default()
        };
        for _ in 0..50 {
            let mut state = ReconnectState::new(config.clone());
            let delay = state.next_delay().unwrap().as_millis();
            assert!((799..=1200).contains(&delay), "{delay}");
        }
    }

    #[tokio::test]
    async fn test_reconnect_gives_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = reconnect(
            addr,
            ReconnectConfig {
                initial_delay: Duration::from_millis(1),
                max_attempts: 2,
                jitter: 0.0,
                ..ReconnectConfig::default()
            },
            &ClientConfig::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(ReconnectError::Exhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_attempts_is_disabled() {
        let result = reconnect(
            "127.0.0.1:9".parse().unwrap(),
            ReconnectConfig {
                max_attempts: 0,
                ..ReconnectConfig::default()
            },
            &ClientConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(ReconnectError::Disabled)));
    }

    #[tokio::test]
    async fn test_reconnect_succeeds_when_server_is_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _accepted = listener.accept().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let client = reconnect(
            addr,
            ReconnectConfig {
                initial_delay: Duration::from_millis(1),
                ..steady()
            },
            &ClientConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(client.peer(), addr);
    }
}
