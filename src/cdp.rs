//! Chrome DevTools Protocol rendering backend (uses the `headless_chrome`
//! crate)
//!
//! Availability is the presence of a Chrome executable; a session is a
//! launched headless browser plus one tab. Blocking CDP calls run under
//! `spawn_blocking` so the async pipeline never stalls a runtime worker.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use headless_chrome::browser::tab::Tab;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use tokio::task::spawn_blocking;

use crate::error::{Error, Result};
use crate::{PrintParams, RenderBackend, RenderSession};

/// CDP-backed print-to-PDF engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeBackend;

impl ChromeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RenderBackend for ChromeBackend {
    type Session = ChromeSession;

    fn is_available(&self) -> bool {
        headless_chrome::browser::default_executable().is_ok()
    }

    async fn launch(&self) -> Result<ChromeSession> {
        spawn_blocking(|| {
            let launch_options = LaunchOptions::default_builder()
                .headless(true)
                .build()
                .map_err(|e| {
                    Error::SessionLaunch(format!("failed to build launch options: {}", e))
                })?;
            let browser = Browser::new(launch_options)
                .map_err(|e| Error::SessionLaunch(format!("failed to launch browser: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| Error::SessionLaunch(format!("failed to open tab: {}", e)))?;
            debug!("chrome session launched");
            Ok(ChromeSession {
                _browser: browser,
                tab,
            })
        })
        .await
        .map_err(|e| Error::SessionLaunch(format!("launch task panicked: {}", e)))?
    }
}

/// One headless-Chrome session, exclusively owned by a single conversion.
pub struct ChromeSession {
    // Held so the browser process outlives the tab
    _browser: Browser,
    tab: Arc<Tab>,
}

impl RenderSession for ChromeSession {
    async fn load_document(&mut self, html: &str) -> Result<()> {
        let url = format!("data:text/html;base64,{}", BASE64.encode(html));
        let tab = self.tab.clone();
        spawn_blocking(move || {
            tab.navigate_to(&url)
                .map_err(|e| Error::PrintFailed(format!("navigation failed: {}", e)))?;
            tab.wait_until_navigated()
                .map_err(|e| Error::PrintFailed(format!("wait for navigation failed: {}", e)))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::PrintFailed(format!("load task panicked: {}", e)))?
    }

    async fn content_height(&mut self) -> Result<f64> {
        let tab = self.tab.clone();
        spawn_blocking(move || {
            let eval = tab
                .evaluate("document.documentElement.scrollHeight", false)
                .map_err(|e| Error::PrintFailed(format!("height evaluation failed: {}", e)))?;
            eval.value
                .and_then(|v| v.as_f64())
                .ok_or_else(|| Error::PrintFailed("no content height returned".into()))
        })
        .await
        .map_err(|e| Error::PrintFailed(format!("height task panicked: {}", e)))?
    }

    async fn print_to_pdf(&mut self, params: &PrintParams) -> Result<Vec<u8>> {
        // The geometry is pre-swapped for orientation; setting the CDP
        // landscape flag as well would rotate the page a second time.
        let options = PrintToPdfOptions {
            landscape: Some(false),
            print_background: Some(params.print_background),
            scale: Some(params.scale),
            paper_width: Some(params.width_in),
            paper_height: Some(params.height_in),
            margin_top: Some(params.margin_top_in),
            margin_bottom: Some(params.margin_bottom_in),
            margin_left: Some(params.margin_left_in),
            margin_right: Some(params.margin_right_in),
            prefer_css_page_size: Some(true),
            ..Default::default()
        };
        let tab = self.tab.clone();
        spawn_blocking(move || {
            tab.print_to_pdf(Some(options))
                .map_err(|e| Error::PrintFailed(format!("print failed: {}", e)))
        })
        .await
        .map_err(|e| Error::PrintFailed(format!("print task panicked: {}", e)))?
    }

    async fn close(self) -> Result<()> {
        let ChromeSession { _browser: browser, tab } = self;
        spawn_blocking(move || {
            drop(tab);
            drop(browser);
        })
        .await
        .map_err(|e| Error::PrintFailed(format!("close task panicked: {}", e)))?;
        debug!("chrome session released");
        Ok(())
    }
}
