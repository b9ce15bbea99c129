//! Prometheus metrics (Rust `prometheus` crate).
//!
//! One `MetricsContext` is intended per process. It owns the exporter's
//! self-metrics and serves them, together with whatever a `ScrapeSource`
//! produces on each request, from a small built-in HTTP endpoint.

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::proto::MetricFamily;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Name prefix of every self-metric.
const NAMESPACE: &str = "jellyfin_exporter";

/// Buckets for upstream latencies; a slow media server sits in the seconds range.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Something that produces metric families on demand, once per scrape.
///
/// Implementations must tolerate concurrent calls; each call is an
/// independent collection cycle.
pub trait ScrapeSource: Send + Sync + 'static {
    /// Collect the metric families for one scrape.
    ///
    /// An empty vector is a valid answer (e.g. the upstream was unreachable).
    fn collect(&self) -> impl Future<Output = Vec<MetricFamily>> + Send;
}

/// Configuration for the built-in Prometheus scrape endpoint.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    // ---
    /// Address to bind, e.g. `0.0.0.0:9027`.
    pub bind: SocketAddr,
}

impl MetricsServerConfig {
    // ---
    pub fn new(bind: SocketAddr) -> Self {
        // ---
        Self { bind }
    }
}

/// Self-metrics registry + handles.
///
/// Cloning is cheap; every handle shares the same underlying series.
#[derive(Clone)]
pub struct MetricsContext {
    // ---
    registry: Registry,

    // Scrape bookkeeping
    pub scrapes_total: IntCounter,
    pub scrape_failures_total: IntCounter,
    pub scrape_duration_seconds: Histogram,

    // Upstream latency (seconds), by API path
    pub api_request_duration_seconds: HistogramVec,
}

impl MetricsContext {
    // ---
    /// Create a new registry and register the self-metrics.
    pub fn new() -> Result<Self> {
        // ---
        let registry = Registry::new_custom(Some(NAMESPACE.into()), None)?;

        let scrapes_total = IntCounter::with_opts(Opts::new(
            "scrapes_total",
            "Total scrape requests served",
        ))?;
        let scrape_failures_total = IntCounter::with_opts(Opts::new(
            "scrape_failures_total",
            "Total scrapes that returned no Jellyfin metrics because an API call failed",
        ))?;
        let scrape_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "scrape_duration_seconds",
                "Time spent collecting Jellyfin metrics for one scrape (seconds)",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let api_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "api_request_duration_seconds",
                "Jellyfin API request latency (seconds)",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["path"],
        )?;

        registry.register(Box::new(scrapes_total.clone()))?;
        registry.register(Box::new(scrape_failures_total.clone()))?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(api_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            scrapes_total,
            scrape_failures_total,
            scrape_duration_seconds,
            api_request_duration_seconds,
        })
    }

    /// Gather metric families from this registry.
    pub fn gather(&self) -> Vec<MetricFamily> {
        // ---
        self.registry.gather()
    }

    /// Binds the scrape endpoint and serves it on a spawned task.
    ///
    /// Routes: `GET /metrics` (source families + self-metrics),
    /// `GET /health`, anything else is a 404. Returns the bound address,
    /// which differs from the configured one when port 0 was requested.
    pub fn spawn_metrics_server<S: ScrapeSource>(
        &self,
        cfg: MetricsServerConfig,
        source: Arc<S>,
    ) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        // ---
        let ctx = self.clone();
        let make_svc = make_service_fn(move |_conn| {
            let ctx = ctx.clone();
            let source = Arc::clone(&source);
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let ctx = ctx.clone();
                    let source = Arc::clone(&source);
                    async move { handle_request(req, ctx, source).await }
                }))
            }
        });

        let server = Server::try_bind(&cfg.bind)
            .with_context(|| format!("failed to bind metrics endpoint to {}", cfg.bind))?
            .serve(make_svc);
        let local_addr = server.local_addr();
        info!("Serving metrics on http://{local_addr}/metrics");

        let handle = tokio::spawn(async move {
            // ---
            server.await.map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        });

        Ok((local_addr, handle))
    }
}

async fn handle_request<S: ScrapeSource>(
    req: Request<Body>,
    ctx: MetricsContext,
    source: Arc<S>,
) -> Result<Response<Body>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            ctx.scrapes_total.inc();
            let timer = ctx.scrape_duration_seconds.start_timer();
            let mut metric_families = source.collect().await;
            timer.observe_duration();
            metric_families.extend(ctx.gather());

            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                let mut resp = Response::new(Body::from(format!("encode error: {e}")));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return Ok(resp);
            }

            let mut resp = Response::new(Body::from(buffer));
            resp.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            Ok(resp)
        }
        (&Method::GET, "/health") => Ok(Response::new(Body::from("OK"))),
        _ => {
            let mut resp = Response::new(Body::from("not found"));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Ok(resp)
        }
    }
}
