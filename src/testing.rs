//! Test helpers shared across modules.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use url::Url;

use crate::cache::Clock;
use crate::cocktail::CocktailClient;
use crate::config::RateLimitConfig;
use crate::net::RateLimiter;

/// Minimal HTTP/1.1 responder that replays canned responses in order.
///
/// Once the list is exhausted the last response is repeated.
pub struct TestServer {
  addr: SocketAddr,
  hits: Arc<AtomicUsize>,
  requests: Arc<Mutex<Vec<String>>>,
  task: JoinHandle<()>,
}

impl TestServer {
  pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> String {
    let mut raw = format!("HTTP/1.1 {} Test\r\n", status);
    for (name, value) in headers {
      raw.push_str(&format!("{}: {}\r\n", name, value));
    }
    raw.push_str(&format!(
      "Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
      body.len(),
      body
    ));
    raw
  }

  pub fn json(body: &str) -> String {
    Self::response(200, &[], body)
  }

  pub async fn start(responses: Vec<String>) -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let task = {
      let hits = Arc::clone(&hits);
      let requests = Arc::clone(&requests);
      tokio::spawn(async move {
        let mut queue = responses.into_iter();
        let mut last: Option<String> = None;
        while let Ok((mut stream, _)) = listener.accept().await {
          let request_line = read_request(&mut stream).await;
          hits.fetch_add(1, Ordering::SeqCst);
          requests.lock().unwrap().push(request_line);

          let response = queue
            .next()
            .or_else(|| last.clone())
            .unwrap_or_else(|| Self::response(500, &[], "{}"));
          last = Some(response.clone());

          let _ = stream.write_all(response.as_bytes()).await;
          let _ = stream.shutdown().await;
        }
      })
    };

    Self {
      addr,
      hits,
      requests,
      task,
    }
  }

  pub fn base_url(&self) -> String {
    format!("http://{}/", self.addr)
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url(), path)
  }

  pub fn hits(&self) -> usize {
    self.hits.load(Ordering::SeqCst)
  }

  /// Request lines received so far, e.g. `GET /filter.php?c=Cocktail HTTP/1.1`.
  pub fn requests(&self) -> Vec<String> {
    self.requests.lock().unwrap().clone()
  }
}

impl Drop for TestServer {
  fn drop(&mut self) {
    self.task.abort();
  }
}

async fn read_request(stream: &mut TcpStream) -> String {
  let mut data = Vec::new();
  let mut buf = [0u8; 1024];
  loop {
    match stream.read(&mut buf).await {
      Ok(0) | Err(_) => break,
      Ok(n) => {
        data.extend_from_slice(&buf[..n]);
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
          break;
        }
      }
    }
  }
  String::from_utf8_lossy(&data)
    .lines()
    .next()
    .unwrap_or_default()
    .to_string()
}

/// Clock whose time only moves when told to.
pub struct ManualClock {
  now: AtomicI64,
}

impl ManualClock {
  pub fn new(now_millis: i64) -> Arc<Self> {
    Arc::new(Self {
      now: AtomicI64::new(now_millis),
    })
  }

  pub fn advance(&self, millis: i64) {
    self.now.fetch_add(millis, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_millis(&self) -> i64 {
    self.now.load(Ordering::SeqCst)
  }
}

/// Client pointed at a test server, with short backoff and no jitter.
pub fn test_client(server: &TestServer) -> CocktailClient {
  let limiter = RateLimiter::new(RateLimitConfig {
    max_jitter_ms: 0,
    base_backoff_ms: 10,
    ..RateLimitConfig::default()
  });
  CocktailClient::with_base_url(
    Url::parse(&server.base_url()).unwrap(),
    Duration::from_secs(5),
    limiter,
  )
  .unwrap()
}
