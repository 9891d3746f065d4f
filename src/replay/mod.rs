// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Replay execution
//!
//! Replays raw HTTP requests, optionally substituting a parameter value.
//! Replayed traffic is routed back through the proxy listener so rewrite
//! rules, the Cookie Jar, and history apply exactly as for live traffic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::codec::RawRequest;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::flow::Headers;
use crate::intruder::AttackResult;

/// Per-replay request timeout
const REPLAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Response captured from a replayed request
#[derive(Debug, Clone)]
pub struct ReplayResponse {
    /// Final URL of the request
    pub url: String,
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Bytes,
    /// Wall-clock round trip time
    pub elapsed: Duration,
}

impl ReplayResponse {
    /// Body decoded as UTF-8 with replacement
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Check if the status is a success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends raw requests, normally via the local proxy listener
#[derive(Debug, Clone)]
pub struct ReplayExecutor {
    client: reqwest::Client,
}

impl ReplayExecutor {
    /// Create an executor that routes through the proxy on `proxy_port`.
    ///
    /// Certificate verification is disabled because the proxy re-signs
    /// upstream certificates with its own CA.
    pub fn via_proxy(proxy_port: u16) -> Result<Self> {
        let proxy = reqwest::Proxy::all(format!("http://127.0.0.1:{proxy_port}"))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .danger_accept_invalid_certs(true)
            .timeout(REPLAY_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Create an executor that sends directly, bypassing the proxy
    pub fn direct() -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REPLAY_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Parse a raw request, optionally substitute one parameter, and send it
    pub async fn send_from_raw(
        &self,
        raw: &str,
        param: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<ReplayResponse> {
        let mut request = RawRequest::parse(raw)?;
        if let (Some(name), Some(value)) = (param, new_value) {
            request.substitute_param(name, value);
        }
        self.send_request(&request).await
    }

    /// Send a parsed raw request
    pub async fn send_request(&self, request: &RawRequest) -> Result<ReplayResponse> {
        let url = request.url()?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::parse(format!("invalid method: {}", request.method)))?;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            // Host comes from the URL; Content-Length from the body
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        info!("Replaying: {} {url}", request.method);
        let start = Instant::now();
        let response = builder.send().await?;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(n, v)| (n.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.bytes().await?;

        Ok(ReplayResponse {
            url: final_url,
            status,
            headers,
            body,
            elapsed,
        })
    }

    /// Replay the base request once per value, substituting `param`, with a
    /// bounded worker pool. Progress and result rows are emitted on `events`.
    pub async fn run_bulk(
        &self,
        raw: &str,
        param: &str,
        values: Vec<String>,
        workers: usize,
        events: &EventBus,
    ) -> Result<Vec<AttackResult>> {
        // Fail fast on an unparseable base request
        RawRequest::parse(raw)?;

        let total = values.len();
        info!("Bulk replay: {total} requests, {workers} workers");
        events.emit(Event::IntruderProgressStart { total });

        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut handles = Vec::with_capacity(total);
        for value in values {
            let executor = self.clone();
            let raw = raw.to_string();
            let param = param.to_string();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = executor
                    .send_from_raw(&raw, Some(&param), Some(value.trim()))
                    .await;
                (value, outcome)
            }));
        }

        let mut results = Vec::with_capacity(total);
        for (done, handle) in handles.into_iter().enumerate() {
            let (value, outcome) = match handle.await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Bulk replay worker panicked: {e}");
                    (String::new(), Err(Error::other("worker panicked")))
                }
            };
            let row = match outcome {
                Ok(response) => AttackResult::from_response(vec![value], &response, Vec::new()),
                Err(e) => AttackResult::failure(vec![value], e.to_string()),
            };
            events.emit(Event::IntruderResult(row.clone()));
            events.emit(Event::IntruderProgressUpdate {
                percent: (done + 1) as f64 * 100.0 / total.max(1) as f64,
            });
            results.push(row);
        }

        events.emit(Event::IntruderProgressDone);
        info!("Bulk replay completed");
        Ok(results)
    }

    /// Send plain GET requests built as `url?param=value`, one per value.
    ///
    /// This is the CLI bulk sender; it bypasses raw-request parsing.
    pub async fn run_bulk_get(
        &self,
        url: &str,
        param: &str,
        values: Vec<String>,
        workers: usize,
    ) -> Vec<(String, Option<u16>)> {
        let total = values.len();
        info!("Bulk GET: {total} requests to {url}");

        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let futures: Vec<_> = values
            .into_iter()
            .map(|value| {
                let client = self.client.clone();
                let separator = if url.contains('?') { '&' } else { '?' };
                let full_url = format!("{url}{separator}{param}={}", value.trim());
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    let status = match client.get(&full_url).send().await {
                        Ok(r) => Some(r.status().as_u16()),
                        Err(e) => {
                            error!("Request to {full_url} failed: {e}");
                            None
                        }
                    };
                    (full_url, status)
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;
        for (done, (url, status)) in results.iter().enumerate() {
            match status {
                Some(code) => info!("[{}/{total}] {url} -> {code}", done + 1),
                None => error!("[{}/{total}] {url} -> failed", done + 1),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn raw_get(server_url: &str, path_and_query: &str) -> String {
        let host = server_url.trim_start_matches("http://");
        format!("GET {path_and_query} HTTP/1.1\nHost: {host}\n\n")
    }

    #[tokio::test]
    async fn test_send_from_raw_with_substitution() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "replaced"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let executor = ReplayExecutor::direct().unwrap();
        let raw = raw_get(&server.uri(), "/search?q=original");
        let response = executor
            .send_from_raw(&raw, Some("q"), Some("replaced"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body_text(), "ok");
    }

    #[tokio::test]
    async fn test_send_request_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("pw=c"))
            .respond_with(ResponseTemplate::new(302))
            .mount(&server)
            .await;

        let executor = ReplayExecutor::direct().unwrap();
        let host = server.uri();
        let host = host.trim_start_matches("http://");
        let raw = format!(
            "POST /login HTTP/1.1\nHost: {host}\nContent-Type: application/x-www-form-urlencoded\n\nuser=a&pw=b"
        );
        let response = executor
            .send_from_raw(&raw, Some("pw"), Some("c"))
            .await
            .unwrap();
        assert_eq!(response.status, 302);
    }

    #[tokio::test]
    async fn test_bulk_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probe"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let executor = ReplayExecutor::direct().unwrap();
        let results = executor
            .run_bulk_get(
                &format!("{}/probe", server.uri()),
                "v",
                vec!["1".into(), "2".into(), "3".into()],
                2,
            )
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(_, s)| *s == Some(200)));
    }

    #[tokio::test]
    async fn test_invalid_raw_aborts_only_that_request() {
        let executor = ReplayExecutor::direct().unwrap();
        assert!(executor.send_from_raw("garbage", None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_replay_routes_through_proxy_pipeline() {
        use crate::config::ConfigStore;
        use crate::proxy::ProxyEngine;
        use std::sync::Arc;

        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "hacked"))
            .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
            .mount(&upstream)
            .await;

        // Rules and history must apply to replayed traffic exactly as to
        // live traffic
        let config = Arc::new(ConfigStore::in_memory());
        config.add_rule("127.0.0.1", "/search", "q", "hacked").unwrap();

        let ca_dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ProxyEngine::with_ca_dir(config, ca_dir.path()).unwrap());
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let proxy_port = listener.local_addr().unwrap().port();
        let run_engine = engine.clone();
        tokio::spawn(async move {
            let _ = run_engine.run_on(listener).await;
        });

        let executor = ReplayExecutor::via_proxy(proxy_port).unwrap();
        let raw = raw_get(&upstream.uri(), "/search?q=original");
        let response = executor.send_from_raw(&raw, None, None).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), "via proxy");

        let flows = engine.history().snapshot();
        assert_eq!(flows.len(), 1);
        assert!(flows[0].request.url.contains("q=hacked"));
    }
}
