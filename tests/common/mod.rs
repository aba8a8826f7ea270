//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::Path, routing::get, Router};
use fetch_gateway::config::GatewayConfig;
use fetch_gateway::fetch::{Fetch, FetchFailed};
use fetch_gateway::lifecycle::{Shutdown, ShutdownOutcome};
use fetch_gateway::net::Listener;
use fetch_gateway::simulator::{self, parse_duration};
use fetch_gateway::HttpServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<ShutdownOutcome>>,
}

impl TestGateway {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Trigger shutdown and wait for the server to stop.
    pub async fn stop(self) -> ShutdownOutcome {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap()
    }
}

/// Gateway defaults with loopback-friendly settings.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.fetch.honor_proxy_env = false;
    config
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let server = HttpServer::new(config).unwrap();
    serve(server).await
}

pub async fn start_gateway_with(config: GatewayConfig, fetcher: Arc<dyn Fetch>) -> TestGateway {
    serve(HttpServer::with_fetcher(config, fetcher)).await
}

async fn serve(server: HttpServer) -> TestGateway {
    let listener = Listener::bind(&server.config().listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, signal).await });

    TestGateway {
        addr,
        shutdown,
        handle,
    }
}

/// Start the sleep simulator and return its address.
pub async fn start_simulator() -> SocketAddr {
    serve_router(simulator::router()).await
}

/// Instrumented upstream.
///
/// - `GET /echo/<delay>/<tag>` sleeps, then answers `<tag>`
/// - `GET /bytes/<n>` answers `n` bytes of `x`
#[derive(Clone)]
pub struct Upstream {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn echo(&self, delay: &str, tag: &str) -> String {
        format!("http://{}/echo/{}/{}", self.addr, delay, tag)
    }

    pub fn bytes(&self, n: usize) -> String {
        format!("http://{}/bytes/{}", self.addr, n)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub async fn start_upstream() -> Upstream {
    let calls = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let echo = {
        let (calls, in_flight, peak) = (calls.clone(), in_flight.clone(), peak.clone());
        move |Path((delay, tag)): Path<(String, String)>| {
            let (calls, in_flight, peak) = (calls.clone(), in_flight.clone(), peak.clone());
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(parse_duration(&delay).unwrap()).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                tag
            }
        }
    };
    let bytes = {
        let calls = calls.clone();
        move |Path(n): Path<usize>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "x".repeat(n)
            }
        }
    };

    let router = Router::new()
        .route("/echo/{delay}/{tag}", get(echo))
        .route("/bytes/{n}", get(bytes));
    let addr = serve_router(router).await;

    Upstream {
        addr,
        calls,
        in_flight,
        peak,
    }
}

async fn serve_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Fetcher that only counts calls.
#[derive(Default)]
pub struct CountingFetcher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Fetch for CountingFetcher {
    async fn fetch(&self, _ctx: &CancellationToken, _url: &str) -> Result<String, FetchFailed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("counted".into())
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn batch(urls: &[String]) -> serde_json::Value {
    serde_json::json!({ "urls": urls })
}
