// spider_chrome re-exports chromiumoxide API
use super::page::CdpPage;
use crate::error::{BrowserError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide_fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CHROME_HELP: &str = "Chrome not found. You can:\n\
     - Install Chrome: https://www.google.com/chrome/\n\
     - Ubuntu/Debian: sudo apt install chromium-browser\n\
     - Fedora: sudo dnf install chromium\n\
     - macOS: brew install --cask google-chrome\n\
     - Or specify path: --chrome-path /path/to/chrome\n\
     - Linux sandbox issue? Try: --no-sandbox";

/// Owns the browser process (or debug-port connection) behind a page session.
pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Sandboxed mode - launches Chrome using system installation
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Advanced mode - connects to existing Chrome on debug port
    DebugPort(u16),
}

impl ChromeDriver {
    /// The first tab that is not a chrome:// page, else the newest tab, else a
    /// fresh about:blank tab.
    async fn get_active_page(&self) -> Result<chromiumoxide::page::Page> {
        let pages = self.browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create page: {}", e)))
    }

    /// Launch Chrome with a custom executable
    pub async fn launch_with_path(
        chrome_path: String,
        no_sandbox: bool,
        headless: bool,
    ) -> Result<Self> {
        Self::new(ConnectionMode::Sandboxed {
            chrome_path: Some(chrome_path),
            no_sandbox,
            headless,
        })
        .await
    }

    /// Launch Chrome, going headless and unsandboxed on CI
    pub async fn launch_auto() -> Result<Self> {
        let is_ci = std::env::var("CI").is_ok()
            || std::env::var("GITHUB_ACTIONS").is_ok()
            || std::env::var("GITLAB_CI").is_ok()
            || std::env::var("JENKINS_HOME").is_ok()
            || std::env::var("CIRCLECI").is_ok();

        Self::new(ConnectionMode::Sandboxed {
            chrome_path: None,
            no_sandbox: is_ci,
            headless: is_ci,
        })
        .await
    }

    /// Connect to existing Chrome on debug port (advanced mode)
    pub async fn connect_debug_port(port: u16) -> Result<Self> {
        Self::new(ConnectionMode::DebugPort(port)).await
    }

    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // One profile directory per instance so parallel sessions never share state
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                let temp_dir =
                    std::env::temp_dir().join(format!("browser-surface-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    BrowserError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };

                config = config.user_data_dir(&temp_dir);

                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                } else {
                    match Self::ensure_chrome_installed().await {
                        Ok(path) => {
                            config = config.chrome_executable(path);
                        }
                        Err(e) => {
                            log::warn!("Auto-download failed ({}), trying system Chrome", e);
                        }
                    }
                }

                let config = config
                    .build()
                    .map_err(|e| BrowserError::LaunchFailed(format!("{}. \n\n{}", e, CHROME_HELP)))?;

                log::info!(
                    "Launching Chrome (headless: {}, no_sandbox: {})",
                    headless,
                    no_sandbox
                );
                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(format!("{}. \n\n{}", e, CHROME_HELP)))?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {}
                    log::debug!("Browser handler finished");
                });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                log::info!("Connecting to Chrome at {}", url);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    BrowserError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                             Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {}
                    log::debug!("Browser handler finished");
                });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// The active tab, excluding Chrome's new-tab-page
    pub async fn current_page(&self) -> Result<chromiumoxide::page::Page> {
        self.get_active_page().await
    }

    /// The active tab wrapped for the page session.
    pub async fn page(&self) -> Result<CdpPage> {
        Ok(CdpPage::new(self.get_active_page().await?))
    }

    /// Check if the browser is still alive and responsive
    pub async fn is_alive(&self) -> bool {
        match self.browser.pages().await {
            Ok(pages) => {
                if let Some(page) = pages.first() {
                    matches!(
                        tokio::time::timeout(Duration::from_secs(2), page.url()).await,
                        Ok(Ok(_))
                    )
                } else {
                    // No pages but browser responded
                    true
                }
            }
            Err(_) => false,
        }
    }

    pub async fn close(self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?;
        Ok(())
    }

    /// Ensure Chrome is installed, downloading if necessary
    async fn ensure_chrome_installed() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| BrowserError::Other("Cannot determine cache directory".to_string()))?
            .join("browser-surface")
            .join("chrome");

        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create cache dir: {}", e)))?;

        let marker = cache_dir.join(".downloaded");
        if marker.exists() {
            if let Some(executable) = Self::find_chrome_in_cache(&cache_dir) {
                return Ok(executable);
            }
        }

        log::info!("Downloading Chrome for Testing (first time only, ~150MB)");
        let fetcher = BrowserFetcher::new(
            BrowserFetcherOptions::builder()
                .with_path(&cache_dir)
                .build()
                .map_err(|e| BrowserError::Other(format!("Fetcher config failed: {}", e)))?,
        );

        let info = fetcher
            .fetch()
            .await
            .map_err(|e| BrowserError::Other(format!("Chrome download failed: {}", e)))?;

        tokio::fs::write(&marker, "downloaded")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to write marker: {}", e)))?;

        log::info!("Chrome downloaded to {}", info.executable_path.display());
        Ok(info.executable_path)
    }

    fn find_chrome_in_cache(cache_dir: &Path) -> Option<PathBuf> {
        [
            "chrome",
            "chrome.exe",
            "Google Chrome.app/Contents/MacOS/Google Chrome",
            "chrome-linux/chrome",
            "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
            "chrome-win/chrome.exe",
        ]
        .iter()
        .map(|p| cache_dir.join(p))
        .find(|p| p.exists())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}
