//! Browser process lifecycle and page creation.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::connection::Connection;
use super::page::CdpPage;
use crate::chrome::find_chrome;
use crate::error::BrowserError;
use crate::options::LaunchOptions;
use crate::traits::{Browser, BrowserLauncher, Page};

const VERSION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A Chrome instance driven over one DevTools WebSocket.
pub struct CdpBrowser {
    conn: Arc<Connection>,
    /// `None` when attached to a browser someone else started.
    child: Mutex<Option<Child>>,
}

impl CdpBrowser {
    /// Spawn Chrome and connect to it.
    #[tracing::instrument(skip_all)]
    pub async fn launch(options: &LaunchOptions) -> Result<Self, BrowserError> {
        let chrome_path =
            find_chrome(options.executable.as_deref()).ok_or(BrowserError::ChromeNotFound)?;

        let port = free_port()?;
        let mut child = Command::new(&chrome_path)
            .args(options.args())
            .arg(format!("--remote-debugging-port={port}"))
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed {
                context: format!("{}: {e}", chrome_path.display()),
            })?;

        let ws_url = wait_for_ws_url(port, &mut child, options.launch_timeout).await?;
        let conn = Connection::connect(&ws_url, options.command_timeout).await?;
        tracing::info!(path = %chrome_path.display(), port, "browser launched");

        Ok(Self {
            conn,
            child: Mutex::new(Some(child)),
        })
    }

    /// Attach to an already running browser by its DevTools WebSocket URL.
    ///
    /// [`Browser::close`] on an attached browser shuts it down too; callers
    /// that only borrow a browser should close pages instead.
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> Result<Self, BrowserError> {
        let conn = Connection::connect(ws_url, command_timeout).await?;
        Ok(Self {
            conn,
            child: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn new_page(&self) -> Result<Arc<dyn Page>, BrowserError> {
        let created = self
            .conn
            .send("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await?;
        let target_id = created["targetId"]
            .as_str()
            .ok_or_else(|| BrowserError::Cdp("createTarget returned no targetId".into()))?
            .to_owned();
        let page = CdpPage::attach(Arc::clone(&self.conn), target_id).await?;
        Ok(Arc::new(page))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if !self.conn.is_closed() {
            let _ = self.conn.send("Browser.close", json!({}), None).await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let exited = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
            if !matches!(exited, Ok(Ok(_))) {
                let _ = child.kill().await;
            }
        }
        tracing::debug!("browser closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.conn.is_closed()
    }
}

/// Launches a fresh local Chrome per call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Browser>, BrowserError> {
        Ok(Arc::new(CdpBrowser::launch(options).await?))
    }
}

fn free_port() -> Result<u16, BrowserError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").map_err(|e| BrowserError::LaunchFailed {
        context: format!("bind port: {e}"),
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| BrowserError::LaunchFailed {
            context: format!("local_addr: {e}"),
        })?
        .port();
    Ok(port)
}

/// Poll `/json/version` until Chrome reports its browser WebSocket URL.
async fn wait_for_ws_url(port: u16, child: &mut Child, budget: Duration) -> Result<String, BrowserError> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let deadline = tokio::time::Instant::now() + budget;

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(VERSION_POLL_INTERVAL).await;

        if let Some(status) = child.try_wait().map_err(|e| BrowserError::LaunchFailed {
            context: format!("wait: {e}"),
        })? {
            return Err(BrowserError::LaunchFailed {
                context: format!("Chrome exited early with {status}"),
            });
        }

        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(version) = resp.json::<Value>().await else {
            continue;
        };
        if let Some(ws_url) = version["webSocketDebuggerUrl"].as_str() {
            return Ok(ws_url.to_owned());
        }
    }

    Err(BrowserError::LaunchFailed {
        context: format!(
            "Chrome did not start within {}ms on port {port}",
            budget.as_millis()
        ),
    })
}
