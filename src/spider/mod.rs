// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Spider - scoped URL and form discovery
//!
//! The spider consumes HTML response bodies handed over by the proxy,
//! extracts links and forms, and maintains a queue of unvisited in-scope
//! URLs plus a per-host sitemap. Parsing is CPU-bound; the single state
//! lock is held only for the state updates.

mod html;

pub use html::{extract_page, ExtractedForm, ExtractedPage, FormInput};

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

/// File extensions that are never worth crawling
const IGNORED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".ico", ".css", ".js", ".woff", ".woff2",
    ".ttf", ".eot", ".pdf", ".zip", ".tar", ".gz", ".rar", ".mp4", ".avi", ".mov", ".mp3", ".wav",
    ".xml", ".json",
];

/// A form discovered while spidering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpiderForm {
    /// Resolved submission URL
    pub url: String,
    /// Page the form was found on
    pub page_url: String,
    /// Uppercased method
    pub method: String,
    /// Field names and types
    pub inputs: Vec<(String, String)>,
}

/// Spider progress counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpiderStats {
    pub running: bool,
    pub discovered_urls: usize,
    pub queue_size: usize,
    pub visited: usize,
    pub forms_found: usize,
    pub hosts: usize,
}

#[derive(Debug, Default)]
struct SiteEntry {
    paths: BTreeSet<String>,
    parameters: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct SpiderState {
    running: bool,
    scope: Vec<Url>,
    queue: VecDeque<String>,
    visited: HashSet<String>,
    discovered: HashSet<String>,
    forms: Vec<SpiderForm>,
    sitemap: BTreeMap<String, SiteEntry>,
    parse_errors: usize,
    max_depth: u32,
    max_urls: usize,
    depths: std::collections::HashMap<String, u32>,
}

/// Scoped crawler state machine
#[derive(Debug, Default)]
pub struct Spider {
    state: Mutex<SpiderState>,
}

impl Spider {
    /// Create an idle spider
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the spider is running
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Start spidering the given scope.
    ///
    /// Scope entries are base URLs; anything with the same scheme and host,
    /// or a DNS child of a scope host, is in scope.
    pub fn start(&self, scope: Vec<String>, max_depth: u32, max_urls: usize) {
        let mut state = self.state.lock();
        state.running = true;
        state.max_depth = max_depth;
        state.max_urls = max_urls;
        state.scope = scope
            .iter()
            .filter_map(|s| match Url::parse(s) {
                Ok(u) => Some(u),
                Err(e) => {
                    warn!("Ignoring unparseable scope entry '{s}': {e}");
                    None
                }
            })
            .collect();

        let seeds: Vec<String> = state.scope.iter().map(|u| u.to_string()).collect();
        for seed in seeds {
            state.depths.insert(seed.clone(), 0);
            enqueue(&mut state, seed);
        }
        info!("Spider started with {} scope entries", state.scope.len());
    }

    /// Stop without losing state
    pub fn stop(&self) {
        self.state.lock().running = false;
        info!("Spider stopped");
    }

    /// Stop and wipe every collection
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = SpiderState::default();
        info!("Spider reset");
    }

    /// Check a URL against the configured scope
    pub fn in_scope(&self, url: &str) -> bool {
        let state = self.state.lock();
        url_in_scope(&state.scope, url)
    }

    /// Feed one response into the spider.
    ///
    /// Only HTML bodies are parsed; other content types just mark the URL
    /// visited. A document the parser cannot make sense of is recorded and
    /// skipped.
    pub fn process_response(&self, url: &str, body: &str, content_type: &str) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }

        state.visited.insert(url.to_string());

        if state.discovered.len() >= state.max_urls {
            warn!("Spider discovery limit reached ({})", state.max_urls);
            return;
        }
        state.discovered.insert(url.to_string());
        update_sitemap(&mut state, url);

        if !content_type.to_lowercase().contains("html") {
            return;
        }

        let page_depth = state.depths.get(url).copied().unwrap_or(0);
        if page_depth >= state.max_depth {
            debug!("Max depth reached at {url}");
            return;
        }

        let base = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                state.parse_errors += 1;
                warn!("Spider cannot parse page URL {url}: {e}");
                return;
            }
        };

        let page = html::extract_page(body);
        let mut enqueued = 0usize;
        for link in &page.links {
            let Some(absolute) = resolve(&base, link) else {
                continue;
            };
            if absolute == url || should_ignore(&absolute) {
                continue;
            }
            state.depths.entry(absolute.clone()).or_insert(page_depth + 1);
            if enqueue(&mut state, absolute) {
                enqueued += 1;
            }
        }

        for form in &page.forms {
            let form_url = if form.action.is_empty() {
                url.to_string()
            } else {
                match resolve(&base, &form.action) {
                    Some(u) => u,
                    None => continue,
                }
            };
            let discovered = SpiderForm {
                url: form_url,
                page_url: url.to_string(),
                method: form.method.clone(),
                inputs: form
                    .inputs
                    .iter()
                    .map(|i| (i.name.clone(), i.input_type.clone()))
                    .collect(),
            };
            let duplicate = state
                .forms
                .iter()
                .any(|f| f.url == discovered.url && f.page_url == discovered.page_url);
            if !duplicate {
                info!("Form discovered: {} {}", discovered.method, discovered.url);
                state.forms.push(discovered);
            }
        }

        debug!(
            "Spider processed {url}: {} links ({enqueued} enqueued), {} forms",
            page.links.len(),
            page.forms.len()
        );
    }

    /// Pop the next unvisited URL off the queue
    pub fn next_url(&self) -> Option<String> {
        self.state.lock().queue.pop_front()
    }

    /// Sorted list of discovered URLs
    pub fn discovered_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.state.lock().discovered.iter().cloned().collect();
        urls.sort();
        urls
    }

    /// Discovered forms
    pub fn forms(&self) -> Vec<SpiderForm> {
        self.state.lock().forms.clone()
    }

    /// Number of documents skipped because their page URL would not parse
    pub fn parse_error_count(&self) -> usize {
        self.state.lock().parse_errors
    }

    /// Progress counters
    pub fn stats(&self) -> SpiderStats {
        let state = self.state.lock();
        SpiderStats {
            running: state.running,
            discovered_urls: state.discovered.len(),
            queue_size: state.queue.len(),
            visited: state.visited.len(),
            forms_found: state.forms.len(),
            hosts: state.sitemap.len(),
        }
    }

    /// Sitemap as host -> (paths, parameter names)
    pub fn sitemap(&self) -> BTreeMap<String, (Vec<String>, Vec<String>)> {
        let state = self.state.lock();
        state
            .sitemap
            .iter()
            .map(|(host, entry)| {
                (
                    host.clone(),
                    (
                        entry.paths.iter().cloned().collect(),
                        entry.parameters.iter().cloned().collect(),
                    ),
                )
            })
            .collect()
    }

    /// Plain-text sitemap export grouped by host
    pub fn export_sitemap_text(&self) -> String {
        let state = self.state.lock();
        let mut lines = Vec::new();
        lines.push("SITEMAP".to_string());
        lines.push(String::new());

        for (host, entry) in &state.sitemap {
            lines.push(format!("Host: {host}"));
            lines.push(format!("  Paths: {}", entry.paths.len()));
            for path in &entry.paths {
                lines.push(format!("    - {path}"));
            }
            if !entry.parameters.is_empty() {
                lines.push(format!("  Parameters: {}", entry.parameters.len()));
                for param in &entry.parameters {
                    lines.push(format!("    - {param}"));
                }
            }
            lines.push(String::new());
        }

        lines.push(format!("Total URLs discovered: {}", state.discovered.len()));
        lines.push(format!("Total forms: {}", state.forms.len()));
        lines.join("\n")
    }
}

/// Enqueue when in scope, unseen, and under the discovery limit
fn enqueue(state: &mut SpiderState, url: String) -> bool {
    if state.discovered.len() >= state.max_urls {
        return false;
    }
    if state.visited.contains(&url)
        || state.discovered.contains(&url)
        || state.queue.contains(&url)
    {
        return false;
    }
    if !url_in_scope(&state.scope, &url) {
        return false;
    }
    debug!("Spider enqueued {url}");
    state.queue.push_back(url);
    true
}

fn url_in_scope(scope: &[Url], url: &str) -> bool {
    if scope.is_empty() {
        return true;
    }
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };

    scope.iter().any(|entry| {
        let same_origin = entry.scheme() == parsed.scheme()
            && entry.host_str() == Some(host)
            && entry.port_or_known_default() == parsed.port_or_known_default();
        let subdomain = entry
            .host_str()
            .map(|scope_host| host.ends_with(&format!(".{scope_host}")))
            .unwrap_or(false);
        same_origin || subdomain
    })
}

/// Resolve a possibly relative link against the page URL, dropping fragments
fn resolve(base: &Url, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty()
        || link.starts_with("javascript:")
        || link.starts_with("mailto:")
        || link.starts_with("tel:")
        || link.starts_with("data:")
    {
        return None;
    }
    let mut resolved = base.join(link).ok()?;
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

fn should_ignore(url: &str) -> bool {
    let url = url.to_lowercase();
    let path_only = url.split('?').next().unwrap_or(&url);
    IGNORED_EXTENSIONS.iter().any(|ext| path_only.ends_with(ext))
}

fn update_sitemap(state: &mut SpiderState, url: &str) {
    let Ok(parsed) = Url::parse(url) else {
        return;
    };
    let Some(host) = parsed.host_str() else {
        return;
    };
    let host = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let entry = state.sitemap.entry(host).or_default();
    let path = parsed.path();
    entry
        .paths
        .insert(if path.is_empty() { "/".to_string() } else { path.to_string() });
    for (name, _) in parsed.query_pairs() {
        entry.parameters.insert(name.to_string());
    }
}
