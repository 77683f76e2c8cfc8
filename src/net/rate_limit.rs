//! Client-side rate limiting for outbound API calls.
//!
//! Admission state (call history, current budget, backoff counter) is owned by
//! a single actor task. Callers talk to it over a channel and wait out any
//! backoff themselves with `tokio::time::sleep`, so a throttled call suspends
//! its task instead of blocking a thread.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Request, Response, StatusCode};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::TransportError;
use crate::config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);
const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Cap on server-requested waits
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
  #[error("rate limit exceeded after {retries} backoff attempts")]
  Exceeded { retries: u32 },

  #[error("rate limiter is no longer running")]
  Stopped,
}

/// Outcome of an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
  Proceed,
  Wait(Duration),
}

/// What to do with a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  Accept,
  Retry(Duration),
}

/// Rate-limit headers and status of a response, detached from the body.
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
  pub status: u16,
  pub limit: Option<u32>,
  pub remaining: Option<u32>,
  pub retry_after: Option<Duration>,
}

impl ResponseInfo {
  pub fn from_parts(status: StatusCode, headers: &HeaderMap) -> Self {
    let number = |name: &str| {
      headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    };

    Self {
      status: status.as_u16(),
      limit: number(LIMIT_HEADER).and_then(|v| u32::try_from(v).ok()),
      remaining: number(REMAINING_HEADER).and_then(|v| u32::try_from(v).ok()),
      retry_after: number(RETRY_AFTER.as_str()).map(Duration::from_secs),
    }
  }
}

/// Point-in-time view of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
  pub calls_in_window: usize,
  pub max_calls_per_minute: u32,
  pub retry_count: u32,
}

enum Command {
  Admit {
    reply: oneshot::Sender<Result<Admission, RateLimitError>>,
  },
  Record,
  Complete {
    info: ResponseInfo,
    reply: oneshot::Sender<Result<Verdict, RateLimitError>>,
  },
  Snapshot {
    reply: oneshot::Sender<RateLimitSnapshot>,
  },
}

/// Sliding-window state owned by the actor.
struct RateLimitState {
  calls: VecDeque<Instant>,
  max_calls_per_minute: u32,
  retry_count: u32,
  config: RateLimitConfig,
}

impl RateLimitState {
  fn new(config: RateLimitConfig) -> Self {
    Self {
      calls: VecDeque::new(),
      max_calls_per_minute: config.max_calls_per_minute.max(1),
      retry_count: 0,
      config,
    }
  }

  fn prune(&mut self, now: Instant) {
    while let Some(&oldest) = self.calls.front() {
      if now.duration_since(oldest) >= WINDOW {
        self.calls.pop_front();
      } else {
        break;
      }
    }
  }

  fn admit(&mut self, now: Instant) -> Result<Admission, RateLimitError> {
    self.prune(now);

    if self.calls.len() < self.max_calls_per_minute as usize {
      self.calls.push_back(now);
      return Ok(Admission::Proceed);
    }

    let delay = self.next_backoff()?;
    warn!(
      calls = self.calls.len(),
      limit = self.max_calls_per_minute,
      retry = self.retry_count,
      delay_ms = delay.as_millis() as u64,
      "Rate limit window full, backing off"
    );
    Ok(Admission::Wait(delay))
  }

  fn record(&mut self, now: Instant) {
    self.prune(now);
    self.calls.push_back(now);
  }

  fn complete(&mut self, info: &ResponseInfo) -> Result<Verdict, RateLimitError> {
    self.adjust_limits(info);

    if info.status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
      let delay = match info.retry_after {
        Some(requested) => {
          if self.retry_count >= self.config.max_retries {
            return Err(self.exhausted());
          }
          self.retry_count += 1;
          requested.min(MAX_RETRY_AFTER)
        }
        None => self.next_backoff()?,
      };
      warn!(
        retry = self.retry_count,
        delay_ms = delay.as_millis() as u64,
        "Server responded 429, retrying"
      );
      return Ok(Verdict::Retry(delay));
    }

    if (200..300).contains(&info.status) {
      self.retry_count = 0;
    }
    Ok(Verdict::Accept)
  }

  /// Best effort: absent or unparsable headers leave the budget alone.
  fn adjust_limits(&mut self, info: &ResponseInfo) {
    if let Some(limit) = info.limit.filter(|&l| l > 0) {
      if limit != self.max_calls_per_minute {
        debug!(
          old = self.max_calls_per_minute,
          new = limit,
          "Adjusting rate limit from server header"
        );
        self.max_calls_per_minute = limit;
      }
    }

    if let Some(remaining) = info.remaining {
      if remaining < self.config.low_quota_threshold {
        warn!(remaining, "API quota nearly exhausted");
      }
    }
  }

  /// Consume one retry and compute its delay, or fail once retries are spent.
  fn next_backoff(&mut self) -> Result<Duration, RateLimitError> {
    if self.retry_count >= self.config.max_retries {
      return Err(self.exhausted());
    }
    let delay = backoff_delay(&self.config, self.retry_count);
    self.retry_count += 1;
    Ok(delay)
  }

  /// The failing call gets the error; the next call starts with a fresh budget.
  fn exhausted(&mut self) -> RateLimitError {
    let retries = std::mem::take(&mut self.retry_count);
    RateLimitError::Exceeded { retries }
  }

  fn snapshot(&mut self, now: Instant) -> RateLimitSnapshot {
    self.prune(now);
    RateLimitSnapshot {
      calls_in_window: self.calls.len(),
      max_calls_per_minute: self.max_calls_per_minute,
      retry_count: self.retry_count,
    }
  }
}

/// `min(max_backoff, base * 2^retry) + jitter`
fn backoff_delay(config: &RateLimitConfig, retry_count: u32) -> Duration {
  let exponential = config
    .base_backoff_ms
    .saturating_mul(1u64 << retry_count.min(32));
  let capped = exponential.min(config.max_backoff_ms);
  let jitter = if config.max_jitter_ms > 0 {
    rand::thread_rng().gen_range(0..config.max_jitter_ms)
  } else {
    0
  };
  Duration::from_millis(capped + jitter)
}

async fn run(mut state: RateLimitState, mut rx: mpsc::Receiver<Command>) {
  while let Some(command) = rx.recv().await {
    let now = Instant::now();
    match command {
      Command::Admit { reply } => {
        let _ = reply.send(state.admit(now));
      }
      Command::Record => state.record(now),
      Command::Complete { info, reply } => {
        let _ = reply.send(state.complete(&info));
      }
      Command::Snapshot { reply } => {
        let _ = reply.send(state.snapshot(now));
      }
    }
  }
  debug!("Rate limiter stopped");
}

/// Handle to the rate limiter actor. Cheap to clone; all clones share one budget.
#[derive(Clone)]
pub struct RateLimiter {
  tx: mpsc::Sender<Command>,
}

impl RateLimiter {
  /// Spawn the limiter actor. Must be called within a tokio runtime.
  pub fn new(config: RateLimitConfig) -> Self {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run(RateLimitState::new(config), rx));
    Self { tx }
  }

  async fn request<T>(
    &self,
    build: impl FnOnce(oneshot::Sender<T>) -> Command,
  ) -> Result<T, RateLimitError> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(build(reply))
      .await
      .map_err(|_| RateLimitError::Stopped)?;
    rx.await.map_err(|_| RateLimitError::Stopped)
  }

  /// Wait until a call may proceed.
  pub async fn acquire(&self) -> Result<(), RateLimitError> {
    match self.request(|reply| Command::Admit { reply }).await?? {
      Admission::Proceed => Ok(()),
      Admission::Wait(delay) => {
        tokio::time::sleep(delay).await;
        self
          .tx
          .send(Command::Record)
          .await
          .map_err(|_| RateLimitError::Stopped)
      }
    }
  }

  /// Report a completed response and learn whether to retry it.
  pub async fn complete(&self, info: ResponseInfo) -> Result<Verdict, RateLimitError> {
    self
      .request(|reply| Command::Complete { info, reply })
      .await?
  }

  pub async fn snapshot(&self) -> Result<RateLimitSnapshot, RateLimitError> {
    self.request(|reply| Command::Snapshot { reply }).await
  }

  /// Send a request through the limiter, retrying on 429 as instructed.
  pub async fn execute(&self, client: &Client, request: Request) -> Result<Response, TransportError> {
    loop {
      self.acquire().await?;

      let attempt = request.try_clone().ok_or(TransportError::NotReplayable)?;
      debug!(url = %attempt.url(), "Sending request");
      let response = client.execute(attempt).await?;

      let info = ResponseInfo::from_parts(response.status(), response.headers());
      match self.complete(info).await? {
        Verdict::Accept => return Ok(response),
        Verdict::Retry(delay) => tokio::time::sleep(delay).await,
      }
    }
  }
}
