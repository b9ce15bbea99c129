//! In-process stand-in for the Jellyfin HTTP API.
//!
//! Serves canned JSON bodies keyed by route and records every request URI
//! so tests can check authentication and call order.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Route key for `GET /Users?isDisabled=true`.
pub const DISABLED_USERS: &str = "/Users?isDisabled=true";

#[derive(Clone)]
struct Route {
    status: StatusCode,
    body: String,
}

/// Builder for the fake server's routes.
#[derive(Default)]
pub struct FakeJellyfinConfig {
    routes: HashMap<String, Route>,
}

impl FakeJellyfinConfig {
    // ---
    /// A server that answers every endpoint the exporter needs with empty data.
    pub fn empty() -> Self {
        // ---
        Self::default()
            .json("/Sessions", "[]")
            .json("/Users", "[]")
            .json(DISABLED_USERS, "[]")
            .json("/Items/Counts", "{}")
    }

    /// Answer `route` with `200` and `body`.
    pub fn json(self, route: &str, body: &str) -> Self {
        self.respond(route, StatusCode::OK, body)
    }

    /// Answer `route` with an arbitrary status and body.
    pub fn respond(mut self, route: &str, status: StatusCode, body: &str) -> Self {
        // ---
        self.routes.insert(
            route.to_string(),
            Route {
                status,
                body: body.to_string(),
            },
        );
        self
    }
}

/// A running fake server.
pub struct FakeJellyfin {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeJellyfin {
    // ---
    /// Binds an ephemeral port and serves `config` until the test runtime ends.
    pub fn start(config: FakeJellyfinConfig) -> Self {
        // ---
        let routes = Arc::new(config.routes);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let make_svc = {
            let requests = Arc::clone(&requests);
            make_service_fn(move |_conn| {
                let routes = Arc::clone(&routes);
                let requests = Arc::clone(&requests);
                async move {
                    Ok::<_, Infallible>(service_fn(move |req| {
                        let routes = Arc::clone(&routes);
                        let requests = Arc::clone(&requests);
                        async move { Ok::<_, Infallible>(handle(req, &routes, &requests)) }
                    }))
                }
            })
        };

        let addr = "127.0.0.1:0".parse().expect("valid address");
        let server = Server::bind(&addr).serve(make_svc);
        let addr = server.local_addr();
        tokio::spawn(server);

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request URIs seen so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

fn handle(
    req: Request<Body>,
    routes: &HashMap<String, Route>,
    requests: &Mutex<Vec<String>>,
) -> Response<Body> {
    // ---
    let uri = req.uri().to_string();
    requests.lock().expect("requests lock").push(uri);

    let query = req.uri().query().unwrap_or_default();
    let mut key = req.uri().path().to_string();
    if query.split('&').any(|pair| pair == "isDisabled=true") {
        key.push_str("?isDisabled=true");
    }

    match routes.get(&key) {
        Some(route) => {
            let mut resp = Response::new(Body::from(route.body.clone()));
            *resp.status_mut() = route.status;
            resp.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("application/json"),
            );
            resp
        }
        None => {
            let mut resp = Response::new(Body::from("not found"));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        }
    }
}
