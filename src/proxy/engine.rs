// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! The proxy engine
//!
//! Accepts client connections on the loopback interface, answers `CONNECT`
//! with an on-the-fly TLS man-in-the-middle, and runs every parsed request
//! through the pipeline: intercept gate, rewrite rules, Cookie Jar overlay,
//! upstream forward, passive scan, history commit, spider feed. Replayed
//! traffic enters through the same listener, so the pipeline applies to it
//! identically.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::ca::CertificateAuthority;
use super::intercept::{InterceptDecision, InterceptGate, InterceptedRequest};
use super::rewrite::apply_rules;
use super::websocket::{FrameDecoder, WebSocketLog};
use crate::config::ConfigStore;
use crate::cookies::CookieManager;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::flow::{Flow, FlowRequest, FlowResponse, Headers, History};
use crate::scan::PassiveScanner;
use crate::spider::Spider;

/// Upstream forward timeout
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// How long shutdown waits for in-flight flows
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Hosts that serve the CA certificate instead of being proxied
const CA_HOSTS: &[&str] = &["mitm.it", "remora.ca"];

type ServiceError = Box<dyn std::error::Error + Send + Sync>;
type ProxyResponse = Response<Full<Bytes>>;

struct Shared {
    config: Arc<ConfigStore>,
    history: Arc<History>,
    cookies: Arc<CookieManager>,
    gate: Arc<InterceptGate>,
    spider: Arc<Spider>,
    websockets: Arc<WebSocketLog>,
    passive: PassiveScanner,
    events: EventBus,
    ca: CertificateAuthority,
    upstream: reqwest::Client,
    next_flow_id: AtomicU64,
    inflight: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Counts a flow as in-flight for the drain phase of shutdown
struct InflightGuard {
    counter: Arc<AtomicUsize>,
}

impl InflightGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The MITM proxy engine
pub struct ProxyEngine {
    shared: Arc<Shared>,
}

impl ProxyEngine {
    /// Create an engine with its CA stored under `./remora-ca`
    pub fn new(config: Arc<ConfigStore>) -> Result<Self> {
        Self::with_ca_dir(config, "remora-ca")
    }

    /// Create an engine with the CA stored under `ca_dir`
    pub fn with_ca_dir(config: Arc<ConfigStore>, ca_dir: impl AsRef<std::path::Path>) -> Result<Self> {
        let events = EventBus::new();
        let upstream = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(UPSTREAM_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                history: Arc::new(History::default()),
                cookies: Arc::new(CookieManager::new()),
                gate: Arc::new(InterceptGate::new(events.clone())),
                spider: Arc::new(Spider::new()),
                websockets: Arc::new(WebSocketLog::new()),
                passive: PassiveScanner::new(),
                events,
                ca: CertificateAuthority::load_or_create(ca_dir)?,
                upstream,
                next_flow_id: AtomicU64::new(0),
                inflight: Arc::new(AtomicUsize::new(0)),
                shutdown,
                shutdown_rx,
            }),
        })
    }

    /// The flow history
    pub fn history(&self) -> Arc<History> {
        self.shared.history.clone()
    }

    /// The cookie manager
    pub fn cookies(&self) -> Arc<CookieManager> {
        self.shared.cookies.clone()
    }

    /// The intercept gate
    pub fn gate(&self) -> Arc<InterceptGate> {
        self.shared.gate.clone()
    }

    /// The spider
    pub fn spider(&self) -> Arc<Spider> {
        self.shared.spider.clone()
    }

    /// The WebSocket session log
    pub fn websockets(&self) -> Arc<WebSocketLog> {
        self.shared.websockets.clone()
    }

    /// The event bus
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// The configuration store
    pub fn config(&self) -> Arc<ConfigStore> {
        self.shared.config.clone()
    }

    /// The CA certificate in PEM form
    pub fn ca_pem(&self) -> String {
        self.shared.ca.ca_pem().to_string()
    }

    /// Request a graceful shutdown
    pub fn stop(&self) {
        let _ = self.shared.shutdown.send(true);
    }

    /// Bind the configured loopback port and serve until stopped
    pub async fn run(&self) -> Result<()> {
        let port = self.shared.config.port();
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        info!("Proxy listening on 127.0.0.1:{port}");
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener until stopped
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        let shared = self.shared.clone();
        shared.events.emit(Event::ProxyStateChanged { running: true });
        // The stored receiver has seen only the initial value, so a stop()
        // issued before this point still breaks the loop immediately
        let mut shutdown = shared.shutdown_rx.clone();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {peer}");
                            let shared = shared.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(shared, stream).await {
                                    debug!("Connection from {peer} ended: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept failed: {e}");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        // Refuse new connections (listener dropped), drain in-flight flows,
        // then drop anything still held at the gate
        drop(listener);
        info!("Proxy draining in-flight flows");
        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN;
        while shared.inflight.load(Ordering::Relaxed) > 0
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        shared.gate.set_enabled(false);
        shared.events.emit(Event::ProxyStateChanged { running: false });
        info!("Proxy stopped");
        Ok(())
    }
}

async fn handle_connection(shared: Arc<Shared>, stream: TcpStream) -> Result<()> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| route(shared.clone(), req));

    http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(|e| crate::error::Error::proxy(e.to_string()))
}

/// Top-level request router: CONNECT starts a MITM tunnel, the CA hosts
/// serve the root certificate, everything else is proxied
async fn route(
    shared: Arc<Shared>,
    req: Request<Incoming>,
) -> std::result::Result<ProxyResponse, ServiceError> {
    if req.method() == Method::CONNECT {
        return handle_connect(shared, req);
    }

    let host = req
        .uri()
        .host()
        .map(str::to_string)
        .or_else(|| {
            req.headers()
                .get(hyper::header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(':').next().unwrap_or(v).to_string())
        })
        .unwrap_or_default()
        .to_lowercase();

    if CA_HOSTS.contains(&host.as_str()) {
        return Ok(ca_response(&shared));
    }

    process_flow(shared, req, None).await
}

/// Serve the root CA certificate for trust-store installation
fn ca_response(shared: &Shared) -> ProxyResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-x509-ca-cert")
        .header("content-disposition", "attachment; filename=\"remora-ca.pem\"")
        .body(Full::new(Bytes::from(shared.ca.ca_pem().to_string())))
        .expect("static response")
}

/// Answer CONNECT with 200 and take over the tunneled bytes for MITM TLS
fn handle_connect(
    shared: Arc<Shared>,
    req: Request<Incoming>,
) -> std::result::Result<ProxyResponse, ServiceError> {
    let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
        warn!("CONNECT without authority");
        return Ok(Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Full::new(Bytes::new()))
            .expect("static response"));
    };

    let upgrade = hyper::upgrade::on(req);
    tokio::spawn(async move {
        match upgrade.await {
            Ok(upgraded) => mitm_tunnel(shared, upgraded, authority).await,
            Err(e) => warn!("CONNECT upgrade failed for {authority}: {e}"),
        }
    });

    Ok(Response::new(Full::new(Bytes::new())))
}

/// Terminate TLS with a minted certificate and serve the decrypted requests
async fn mitm_tunnel(shared: Arc<Shared>, upgraded: hyper::upgrade::Upgraded, authority: String) {
    let host = authority
        .split(':')
        .next()
        .unwrap_or(authority.as_str())
        .to_string();

    let tls_config = match shared.ca.server_config_for(&host) {
        Ok(config) => config,
        Err(e) => {
            warn!("No certificate for {host}: {e}");
            return;
        }
    };

    let acceptor = TlsAcceptor::from(tls_config);
    let tls_stream = match acceptor.accept(TokioIo::new(upgraded)).await {
        Ok(stream) => stream,
        Err(e) => {
            // Client rejected our certificate or spoke garbage; no flow committed
            warn!("TLS handshake with client failed for {host}: {e}");
            return;
        }
    };

    let tunnel = authority.clone();
    let service = service_fn(move |req| process_flow(shared.clone(), req, Some(tunnel.clone())));
    if let Err(e) = http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(TokioIo::new(tls_stream), service)
        .with_upgrades()
        .await
    {
        debug!("Tunnel to {authority} closed: {e}");
    }
}

/// Derive hostname, pretty URL, and path+query for a request, either from
/// the CONNECT authority (HTTPS) or the absolute-form URI (plain HTTP)
fn request_target(
    uri: &http::Uri,
    headers: &http::HeaderMap,
    tunnel: &Option<String>,
) -> (String, String, String) {
    let path_q = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    match tunnel {
        Some(authority) => {
            let host = authority
                .split(':')
                .next()
                .unwrap_or(authority.as_str())
                .to_lowercase();
            let display_authority = authority.strip_suffix(":443").unwrap_or(authority);
            let url = format!("https://{display_authority}{path_q}");
            (host, url, path_q)
        }
        None => {
            let host = uri
                .host()
                .map(str::to_string)
                .or_else(|| {
                    headers
                        .get(hyper::header::HOST)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.split(':').next().unwrap_or(v).to_string())
                })
                .unwrap_or_default()
                .to_lowercase();
            let url = if uri.scheme().is_some() {
                uri.to_string()
            } else {
                format!("http://{host}{path_q}")
            };
            (host, url, path_q)
        }
    }
}

/// The per-request pipeline
async fn process_flow(
    shared: Arc<Shared>,
    mut req: Request<Incoming>,
    tunnel: Option<String>,
) -> std::result::Result<ProxyResponse, ServiceError> {
    let _inflight = InflightGuard::new(shared.inflight.clone());

    // Keep the client's upgrade handle in case this turns into a WebSocket
    let client_upgrade = hyper::upgrade::on(&mut req);
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let (host, url, path_q) = request_target(&parts.uri, &parts.headers, &tunnel);
    let method = parts.method.as_str().to_string();

    let mut request = FlowRequest::new(method, url, host, path_q);
    request.headers = parts
        .headers
        .iter()
        .map(|(n, v)| {
            (
                n.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect::<Headers>();
    request.body = body;

    // Soft mute: forward verbatim with no hooks, no history
    if shared.config.is_paused() {
        return match forward_upstream(&shared, &request).await {
            Ok(upstream) => Ok(client_response(upstream_to_flow_response(upstream).await)),
            Err(e) => Ok(client_response(synthetic_error_response(&shared, &e))),
        };
    }

    let flow_id = shared.next_flow_id.fetch_add(1, Ordering::Relaxed) + 1;
    let mut flow = Flow::new(flow_id, request);

    // Manual intercept gate
    let decision = shared
        .gate
        .offer(InterceptedRequest {
            method: flow.request.method.clone(),
            url: flow.request.url.clone(),
            host: flow.request.host.clone(),
            path: flow.request.path.clone(),
            headers: flow.request.headers.clone(),
            body: flow.request.body.clone(),
        })
        .await;
    match decision {
        InterceptDecision::Forward { headers, body } => {
            if let Some(headers) = headers {
                flow.request.headers = headers;
            }
            if let Some(body) = body {
                flow.request.body = body;
                flow.request
                    .headers
                    .set("Content-Length", flow.request.body.len().to_string());
            }
        }
        InterceptDecision::Drop => {
            info!("Flow dropped at the gate: {}", flow.request.url);
            return Err("flow dropped by operator".into());
        }
    }

    // Rule engine
    apply_rules(&shared.config.rules(), &mut flow.request);

    // Cookie Jar overlay
    if !shared.cookies.jar_is_empty() {
        flow.request
            .headers
            .set("Cookie", shared.cookies.jar_header());
    }

    let wants_websocket = flow
        .request
        .headers
        .get("upgrade")
        .map(|v| v.to_lowercase().contains("websocket"))
        .unwrap_or(false);

    // Forward upstream
    let upstream = match forward_upstream(&shared, &flow.request).await {
        Ok(response) => response,
        Err(e) => {
            let response = synthetic_error_response(&shared, &e);
            flow.response = Some(response.clone());
            commit_flow(&shared, flow);
            return Ok(client_response(response));
        }
    };

    if wants_websocket && upstream.status() == reqwest::StatusCode::SWITCHING_PROTOCOLS {
        return Ok(begin_websocket(shared, flow, client_upgrade, upstream));
    }

    let response = upstream_to_flow_response(upstream).await;

    // Capture Set-Cookie into the per-domain table
    let set_cookies: Vec<&str> = response.headers.get_all("set-cookie");
    if !set_cookies.is_empty() {
        shared
            .cookies
            .capture_from_response(&flow.request.host, &set_cookies);
    }

    // Passive scan annotates the flow before commit
    let findings = shared.passive.scan(&flow.request, &response);
    for finding in &findings {
        shared.events.emit(Event::ScanFinding(finding.clone()));
    }
    flow.vulnerabilities = findings;
    flow.response = Some(response.clone());

    let request_url = flow.request.url.clone();
    commit_flow(&shared, flow);

    // Spider consumes in-scope HTML bodies
    if shared.spider.is_running() && response.is_html() && shared.spider.in_scope(&request_url) {
        shared.spider.process_response(
            &request_url,
            &response.body_text(),
            response.content_type().unwrap_or(""),
        );
        shared
            .events
            .emit(Event::SpiderStats(shared.spider.stats()));
    }

    Ok(client_response(response))
}

/// Send the (possibly mutated) request upstream via the shared client
async fn forward_upstream(
    shared: &Shared,
    request: &FlowRequest,
) -> std::result::Result<reqwest::Response, reqwest::Error> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let mut builder = shared.upstream.request(method, &request.url);

    for (name, value) in &request.headers {
        // The URL supplies the host; reqwest recomputes the length
        if name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("proxy-connection")
        {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.body.is_empty() {
        builder = builder.body(request.body.clone());
    }

    builder.send().await
}

/// Drain an upstream response into a flow response record
async fn upstream_to_flow_response(upstream: reqwest::Response) -> FlowResponse {
    let status = upstream.status().as_u16();
    let headers: Headers = upstream
        .headers()
        .iter()
        .map(|(n, v)| {
            (
                n.to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = upstream.bytes().await.unwrap_or_default();

    let mut response = FlowResponse::new(status);
    response.headers = headers;
    response.body = body;
    response
}

/// 502/504 stand-in when the upstream is unreachable or times out
fn synthetic_error_response(shared: &Shared, error: &reqwest::Error) -> FlowResponse {
    let status = if error.is_timeout() { 504 } else { 502 };
    warn!("Upstream failure ({status}): {error}");
    shared.events.emit(Event::ProxyError {
        message: error.to_string(),
    });

    let mut response = FlowResponse::new(status);
    response.headers.append("Content-Type", "text/plain");
    response.body = Bytes::from(format!("remora: upstream request failed: {error}"));
    response
}

/// Commit a finalized flow to history and announce it
fn commit_flow(shared: &Shared, flow: Flow) {
    let event = Event::NewHistoryEntry {
        id: flow.id,
        method: flow.request.method.clone(),
        url: flow.request.url.clone(),
        status: flow.status(),
    };
    shared.history.push(flow);
    shared.events.emit(event);
}

/// Headers that must not be copied verbatim to the client
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

/// Build the hyper response streamed back to the client
fn client_response(response: FlowResponse) -> ProxyResponse {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Full::new(response.body))
        .unwrap_or_else(|e| {
            error!("Failed to build client response: {e}");
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Full::new(Bytes::from_static(b"remora: response build failed")))
                .expect("static response")
        })
}

/// Return the 101 to the client and start relaying the upgraded byte
/// streams, observing frames in both directions
fn begin_websocket(
    shared: Arc<Shared>,
    flow: Flow,
    client_upgrade: hyper::upgrade::OnUpgrade,
    upstream: reqwest::Response,
) -> ProxyResponse {
    let flow_id = flow.id;
    let url = flow.request.url.clone();

    // The 101 must carry the upgrade handshake headers verbatim
    let mut builder = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    for (name, value) in upstream.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    let response_101 = builder
        .body(Full::new(Bytes::new()))
        .expect("101 response build");

    shared
        .websockets
        .start_session(flow_id, url.clone(), flow.request.host.clone());
    shared.events.emit(Event::WsSessionStarted {
        id: flow_id,
        url: url.clone(),
    });

    let mut record = flow;
    record.response = Some(FlowResponse::new(101));
    commit_flow(&shared, record);

    tokio::spawn(async move {
        let upstream_io = match upstream.upgrade().await {
            Ok(io) => io,
            Err(e) => {
                warn!("Upstream WebSocket upgrade failed for {url}: {e}");
                shared.websockets.close_session(flow_id);
                shared.events.emit(Event::WsSessionClosed { id: flow_id });
                return;
            }
        };
        let client_io = match client_upgrade.await {
            Ok(io) => TokioIo::new(io),
            Err(e) => {
                warn!("Client WebSocket upgrade failed for {url}: {e}");
                shared.websockets.close_session(flow_id);
                shared.events.emit(Event::WsSessionClosed { id: flow_id });
                return;
            }
        };

        let (client_read, client_write) = tokio::io::split(client_io);
        let (upstream_read, upstream_write) = tokio::io::split(upstream_io);

        let c2s = pump_direction(shared.clone(), flow_id, true, client_read, upstream_write);
        let s2c = pump_direction(shared.clone(), flow_id, false, upstream_read, client_write);
        let _ = tokio::join!(c2s, s2c);

        shared.websockets.close_session(flow_id);
        shared.events.emit(Event::WsSessionClosed { id: flow_id });
        debug!("WebSocket session {flow_id} closed");
    });

    response_101
}

/// Relay one direction of an upgraded tunnel, decoding frames as they pass
async fn pump_direction<R, W>(
    shared: Arc<Shared>,
    flow_id: u64,
    from_client: bool,
    mut reader: R,
    mut writer: W,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        for frame in decoder.feed(&buf[..n]) {
            if frame.is_data() {
                shared
                    .websockets
                    .record_frame(flow_id, from_client, &frame.payload);
                shared.events.emit(Event::WsFrame {
                    session_id: flow_id,
                    from_client,
                    size: frame.payload.len(),
                });
            }
        }

        if writer.write_all(&buf[..n]).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn start_engine(config: Arc<ConfigStore>) -> (Arc<ProxyEngine>, String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ProxyEngine::with_ca_dir(config, dir.path()).unwrap());
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let run_engine = engine.clone();
        tokio::spawn(async move {
            let _ = run_engine.run_on(listener).await;
        });

        (engine, format!("http://{addr}"), dir)
    }

    fn proxied_client(proxy_url: &str) -> reqwest::Client {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::http(proxy_url).unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_rule_rewrite_on_live_request() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "hacked"))
            .and(query_param("p", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rewritten"))
            .mount(&upstream)
            .await;

        let config = Arc::new(ConfigStore::in_memory());
        config.add_rule("127.0.0.1", "/search", "q", "hacked").unwrap();
        let (engine, proxy_url, _dir) = start_engine(config).await;

        let client = proxied_client(&proxy_url);
        let response = client
            .get(format!("{}/search?q=cats&p=1", upstream.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "rewritten");

        let flows = engine.history().snapshot();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].request.method, "GET");
        assert!(flows[0].request.url.contains("q=hacked"));
        assert_eq!(flows[0].status(), 200);
    }

    #[tokio::test]
    async fn test_history_ids_strictly_increase() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&upstream)
            .await;

        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let client = proxied_client(&proxy_url);
        for i in 0..3 {
            client
                .get(format!("{}/page/{i}", upstream.uri()))
                .send()
                .await
                .unwrap();
        }

        let flows = engine.history().snapshot();
        assert_eq!(flows.len(), 3);
        assert!(flows.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_paused_proxy_skips_history_and_rules() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "cats"))
            .respond_with(ResponseTemplate::new(200).set_body_string("untouched"))
            .mount(&upstream)
            .await;

        let config = Arc::new(ConfigStore::in_memory());
        config.add_rule("127.0.0.1", "/", "q", "hacked").unwrap();
        config.toggle_pause();
        let (engine, proxy_url, _dir) = start_engine(config).await;

        let client = proxied_client(&proxy_url);
        let response = client
            .get(format!("{}/?q=cats", upstream.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "untouched");
        assert!(engine.history().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_cookie_jar_overrides_cookie_header() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("cookie", "session=forced"))
            .respond_with(ResponseTemplate::new(200).set_body_string("jarred"))
            .mount(&upstream)
            .await;

        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        engine.cookies().add_to_jar("session", "forced");

        let client = proxied_client(&proxy_url);
        let response = client
            .get(format!("{}/", upstream.uri()))
            .header("cookie", "session=original")
            .send()
            .await
            .unwrap();
        assert_eq!(response.text().await.unwrap(), "jarred");
    }

    #[tokio::test]
    async fn test_set_cookie_captured_not_jarred() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "sid=abc123; Path=/; HttpOnly"),
            )
            .mount(&upstream)
            .await;

        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let client = proxied_client(&proxy_url);
        client.get(format!("{}/", upstream.uri())).send().await.unwrap();

        assert_eq!(
            engine.cookies().captured_value("127.0.0.1", "sid"),
            Some("abc123".to_string())
        );
        assert!(engine.cookies().jar_is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_synthesizes_502() {
        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let client = proxied_client(&proxy_url);

        // Port 9 on loopback is almost certainly closed
        let response = client.get("http://127.0.0.1:9/").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 502);

        let flows = engine.history().snapshot();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].status(), 502);
    }

    #[tokio::test]
    async fn test_ca_served_on_conventional_host() {
        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let client = proxied_client(&proxy_url);

        let response = client.get("http://mitm.it/").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("BEGIN CERTIFICATE"));
        assert_eq!(body, engine.ca_pem());
    }

    #[tokio::test]
    async fn test_passive_findings_attached_to_flow() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("You have an error in your SQL syntax"),
            )
            .mount(&upstream)
            .await;

        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let mut events = engine.events().subscribe();
        let client = proxied_client(&proxy_url);
        client
            .get(format!("{}/item?id=1", upstream.uri()))
            .send()
            .await
            .unwrap();

        let flows = engine.history().snapshot();
        assert!(flows[0]
            .vulnerabilities
            .iter()
            .any(|f| f.vuln_type == "SQL Injection"));

        // scan_finding precedes new_history_entry on the bus
        let mut saw_finding = false;
        loop {
            match events.recv().await.unwrap() {
                Event::ScanFinding(_) => saw_finding = true,
                Event::NewHistoryEntry { .. } => break,
                _ => continue,
            }
        }
        assert!(saw_finding);
    }

    #[tokio::test]
    async fn test_spider_fed_with_in_scope_html() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(r#"<a href="/next">next</a>"#),
            )
            .mount(&upstream)
            .await;

        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        engine
            .spider()
            .start(vec![upstream.uri()], 3, 100);

        let client = proxied_client(&proxy_url);
        client.get(format!("{}/", upstream.uri())).send().await.unwrap();

        let stats = engine.spider().stats();
        assert!(stats.discovered_urls >= 1);
        assert!(engine
            .spider()
            .discovered_urls()
            .iter()
            .any(|u| u.ends_with("/")));
    }

    #[tokio::test]
    async fn test_intercept_edit_reaches_upstream() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(wiremock::matchers::body_string("user=a&pw=c"))
            .respond_with(ResponseTemplate::new(200).set_body_string("edited"))
            .mount(&upstream)
            .await;

        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let gate = engine.gate();
        gate.set_enabled(true);

        let client = proxied_client(&proxy_url);
        let target = format!("{}/login", upstream.uri());
        let request = tokio::spawn(async move {
            client
                .post(target)
                .header("content-type", "application/x-www-form-urlencoded")
                .body("user=a&pw=b")
                .send()
                .await
        });

        while gate.pending().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let held = gate.pending().unwrap();
        assert_eq!(String::from_utf8_lossy(&held.body), "user=a&pw=b");

        gate.resolve(InterceptDecision::Forward {
            headers: None,
            body: Some(Bytes::from_static(b"user=a&pw=c")),
        });

        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "edited");
    }

    #[tokio::test]
    async fn test_intercept_drop_reaches_no_upstream() {
        let upstream = MockServer::start().await;
        // No mock mounted: any forwarded request would 404 and be visible
        let (engine, proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let gate = engine.gate();
        gate.set_enabled(true);

        let client = proxied_client(&proxy_url);
        let target = format!("{}/secret", upstream.uri());
        let request = tokio::spawn(async move { client.get(target).send().await });

        while gate.pending().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        gate.resolve(InterceptDecision::Drop);

        // The client sees a failed request, nothing was forwarded, and no
        // flow was committed
        assert!(request.await.unwrap().is_err());
        assert_eq!(upstream.received_requests().await.unwrap().len(), 0);
        assert!(engine.history().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_graceful_stop_emits_state_change() {
        let (engine, _proxy_url, _dir) = start_engine(Arc::new(ConfigStore::in_memory())).await;
        let mut events = engine.events().subscribe();
        engine.stop();

        // running=false arrives once the drain completes
        loop {
            match events.recv().await {
                Ok(Event::ProxyStateChanged { running: false }) => break,
                Ok(_) => continue,
                Err(e) => panic!("bus closed early: {e}"),
            }
        }
    }
}
