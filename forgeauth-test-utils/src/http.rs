//! A wiremock server driven from synchronous tests
//!
//! Platform clients use blocking HTTP, which must not run inside an async
//! runtime. `MockApi` owns a multi-threaded runtime that keeps the mock
//! server serving while the test thread blocks on requests.

use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer, Request};

pub struct MockApi {
  // Dropped before the runtime
  server: MockServer,
  runtime: Runtime,
}

impl MockApi {
  pub fn start() -> Self {
    let runtime = Runtime::new().expect("Failed to create async runtime");
    let server = runtime.block_on(MockServer::start());
    Self { server, runtime }
  }

  /// Base URL of the mock server, without a trailing slash
  pub fn uri(&self) -> String {
    self.server.uri()
  }

  pub fn mount(&self, mock: Mock) {
    self.runtime.block_on(mock.mount(&self.server));
  }

  /// Requests received so far
  pub fn requests(&self) -> Vec<Request> {
    self
      .runtime
      .block_on(self.server.received_requests())
      .unwrap_or_default()
  }

  /// Number of received requests whose path equals `path`
  pub fn hits(&self, path: &str) -> usize {
    self.requests().iter().filter(|r| r.url.path() == path).count()
  }
}
