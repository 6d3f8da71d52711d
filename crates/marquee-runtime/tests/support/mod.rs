//! Recording fakes for the browser and content server seams.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use marquee_browser::{
    Browser, BrowserError, BrowserLauncher, BrowserLog, LaunchOptions, Page, PageEvent, Viewport,
};
use marquee_runtime::CompositionService;
use marquee_server::{BundleLocation, ContentServer, ContentServerFactory, ServedBundle, ServerError};
use marquee_settings::MarqueeSettings;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;

/// What the fake bundle answers.
#[derive(Clone, Debug)]
pub struct BundleScript {
    pub compositions: Value,
    pub site_version: Option<&'static str>,
    /// Readiness flag turns true on this poll.
    pub ready_on_poll: usize,
    /// Throw an uncaught exception on this readiness poll.
    pub fault_on_poll: Option<usize>,
    /// How long `getStaticCompositions()` takes to answer.
    pub query_delay: Duration,
}

impl Default for BundleScript {
    fn default() -> Self {
        Self {
            compositions: json!([
                {"id": "intro", "width": 1920, "height": 1080, "fps": 30, "durationInFrames": 150,
                 "defaultProps": {"title": "Hi"}, "props": {"title": "Hi"}},
                {"id": "square", "width": 1000, "height": 1000, "fps": 25, "durationInFrames": 50,
                 "defaultProps": {}, "props": {}}
            ]),
            site_version: Some("11"),
            ready_on_poll: 2,
            fault_on_poll: None,
            query_delay: Duration::ZERO,
        }
    }
}

/// Counts everything the runtime opens and closes.
#[derive(Default)]
pub struct Recorder {
    pub launches: AtomicUsize,
    pub open_browsers: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub server_starts: AtomicUsize,
    pub live_servers: AtomicUsize,
    pub events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn log(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    pub fn open_browsers(&self) -> usize {
        self.open_browsers.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn server_starts(&self) -> usize {
        self.server_starts.load(Ordering::SeqCst)
    }

    pub fn live_servers(&self) -> usize {
        self.live_servers.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Browser
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakePage {
    id: String,
    recorder: Arc<Recorder>,
    script: BundleScript,
    events: broadcast::Sender<PageEvent>,
    polls: AtomicUsize,
    closed: AtomicBool,
    /// Evaluations slower than this fail like a CDP command timeout.
    command_timeout: Mutex<Duration>,
}

#[async_trait]
impl Page for FakePage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn evaluate(&self, expression: &str, _frame: Option<&str>) -> Result<Value, BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        if expression.contains("typeof window.getStaticCompositions") {
            return Ok(json!({"hasCompositions": true, "siteVersion": self.script.site_version}));
        }
        if expression.contains("remotion_setBundleMode") {
            let _ = self.events.send(PageEvent::Console(BrowserLog {
                kind: "log".into(),
                text: "bundle mode: evaluation".into(),
                stack_trace: vec![],
            }));
            return Ok(Value::Null);
        }
        if expression.contains("remotion_renderReady") {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.script.fault_on_poll == Some(poll) {
                let _ = self.events.send(PageEvent::Exception {
                    message: "Uncaught Error: calculateMetadata() failed".into(),
                    stack: Some("at calculateMetadata (bundle.js:42:7)".into()),
                });
            }
            return Ok(json!({"ready": poll >= self.script.ready_on_poll, "cancelled": null}));
        }
        let limit = *self.command_timeout.lock();
        if self.script.query_delay > limit {
            tokio::time::sleep(limit).await;
            return Err(BrowserError::Timeout {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                context: "CDP Runtime.evaluate".into(),
            });
        }
        if !self.script.query_delay.is_zero() {
            tokio::time::sleep(self.script.query_delay).await;
        }
        Ok(self.script.compositions.clone())
    }

    fn set_default_timeout(&self, timeout: Duration) {
        *self.command_timeout.lock() = timeout;
        self.recorder
            .log(format!("default timeout {}ms", timeout.as_millis()));
    }

    async fn add_script_on_new_document(&self, _source: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<Option<u16>, BrowserError> {
        self.recorder.log(format!("navigate {url}"));
        Ok(Some(200))
    }

    async fn set_viewport(&self, _viewport: Viewport) -> Result<(), BrowserError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.recorder.open_pages.fetch_sub(1, Ordering::SeqCst);
            self.recorder.log(format!("close {}", self.id));
        }
        Ok(())
    }
}

pub struct FakeBrowser {
    recorder: Arc<Recorder>,
    script: BundleScript,
    pages: AtomicUsize,
    closed: AtomicBool,
}

impl FakeBrowser {
    /// A browser that is already running (counted as open).
    pub fn running(recorder: &Arc<Recorder>, script: BundleScript) -> Arc<Self> {
        let _ = recorder.open_browsers.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            recorder: Arc::clone(recorder),
            script,
            pages: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn Page>, BrowserError> {
        if self.is_closed() {
            return Err(BrowserError::Closed);
        }
        let n = self.pages.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.recorder.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakePage {
            id: format!("page-{n}"),
            recorder: Arc::clone(&self.recorder),
            script: self.script.clone(),
            events: broadcast::channel(32).0,
            polls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            command_timeout: Mutex::new(Duration::from_secs(30)),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.recorder.open_browsers.fetch_sub(1, Ordering::SeqCst);
            self.recorder.log("close browser");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.is_closed()
    }
}

pub struct FakeLauncher {
    recorder: Arc<Recorder>,
    script: BundleScript,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn Browser>, BrowserError> {
        let _ = self.recorder.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBrowser::running(&self.recorder, self.script.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Content server
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakeServer {
    info: ServedBundle,
    recorder: Arc<Recorder>,
    stopped: AtomicBool,
}

impl FakeServer {
    pub fn running(recorder: &Arc<Recorder>, serve_url: &str) -> Arc<Self> {
        Self::with_source_map(recorder, serve_url, None)
    }

    pub fn with_source_map(
        recorder: &Arc<Recorder>,
        serve_url: &str,
        source_map: Option<PathBuf>,
    ) -> Arc<Self> {
        let _ = recorder.live_servers.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            info: ServedBundle {
                serve_url: serve_url.to_owned(),
                proxy_port: 4100,
                source_map,
            },
            recorder: Arc::clone(recorder),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentServer for FakeServer {
    fn info(&self) -> &ServedBundle {
        &self.info
    }

    async fn stop(&self, _force: bool) -> Result<(), ServerError> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.recorder.live_servers.fetch_sub(1, Ordering::SeqCst);
            self.recorder.log("stop server");
        }
        Ok(())
    }
}

pub struct FakeServerFactory {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl ContentServerFactory for FakeServerFactory {
    async fn start(
        &self,
        _location: &BundleLocation,
        _port: Option<u16>,
    ) -> Result<Arc<dyn ContentServer>, ServerError> {
        let _ = self.recorder.server_starts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        Ok(FakeServer::running(&self.recorder, "http://127.0.0.1:4000"))
    }
}

/// A service wired to the fakes.
pub fn service(recorder: &Arc<Recorder>, script: BundleScript) -> CompositionService {
    CompositionService::new(
        Arc::new(FakeLauncher {
            recorder: Arc::clone(recorder),
            script,
        }),
        Arc::new(FakeServerFactory {
            recorder: Arc::clone(recorder),
        }),
        MarqueeSettings::default(),
    )
}

pub fn bundle() -> BundleLocation {
    BundleLocation::parse("/tmp/marquee-bundle")
}
