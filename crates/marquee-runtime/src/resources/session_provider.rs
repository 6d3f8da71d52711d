//! Browser session and page acquisition.

use std::sync::Arc;

use marquee_browser::{Browser, BrowserLauncher, LaunchOptions, Page, Viewport};

use super::handle::{Ownership, ReleaseAction, ResourceHandle};
use crate::errors::DiscoveryError;

/// A page opened for one call, and the browser it lives in.
#[derive(Clone)]
pub struct Session {
    /// Page scoped to the call.
    pub page: Arc<dyn Page>,
    /// The browser; borrowed when the caller supplied it.
    pub browser: Ownership<Arc<dyn Browser>>,
}

/// Opens pages, launching a browser when the caller did not supply one.
pub struct SessionProvider {
    launcher: Arc<dyn BrowserLauncher>,
}

impl SessionProvider {
    /// Launch new browsers through `launcher`.
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }

    /// Open a page for one call.
    ///
    /// With `supplied`, the release action closes only the page. Otherwise a
    /// browser is launched and the release action closes the page and then
    /// the browser.
    #[tracing::instrument(skip_all, fields(borrowed = supplied.is_some()))]
    pub async fn acquire(
        &self,
        supplied: Option<Arc<dyn Browser>>,
        launch: &LaunchOptions,
        device_scale_factor: f64,
    ) -> Result<ResourceHandle<Session>, DiscoveryError> {
        let browser = match supplied {
            Some(browser) => Ownership::Borrowed(browser),
            None => Ownership::Owned(
                self.launcher
                    .launch(launch)
                    .await
                    .map_err(DiscoveryError::SessionAcquisition)?,
            ),
        };

        let page = match browser.get().new_page().await {
            Ok(page) => page,
            Err(e) => {
                if let Ownership::Owned(ref owned) = browser {
                    if let Err(close_err) = owned.close().await {
                        tracing::warn!(error = %close_err, "failed to close browser after page creation failed");
                    }
                }
                return Err(DiscoveryError::SessionAcquisition(e));
            }
        };

        let session = Session {
            page: Arc::clone(&page),
            browser,
        };
        let release = release_action(&session);

        let viewport = Viewport {
            device_scale_factor,
            ..Viewport::default()
        };
        if let Err(e) = page.set_viewport(viewport).await {
            if let Err(release_err) = release.run().await {
                tracing::warn!(error = %release_err, "failed to release session after viewport error");
            }
            return Err(DiscoveryError::SessionAcquisition(e));
        }

        tracing::debug!(page_id = page.id(), owned = session.browser.is_owned(), "session acquired");
        Ok(ResourceHandle::new(session, release))
    }
}

fn release_action(session: &Session) -> ReleaseAction {
    let page = Arc::clone(&session.page);
    let owned_browser = match &session.browser {
        Ownership::Owned(browser) => Some(Arc::clone(browser)),
        Ownership::Borrowed(_) => None,
    };
    ReleaseAction::new("browser session", move || async move {
        let page_result = page.close().await;
        if let Some(browser) = owned_browser {
            browser.close().await?;
        }
        page_result?;
        tracing::debug!(page_id = page.id(), "session released");
        Ok(())
    })
}
