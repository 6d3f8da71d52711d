//! The discovery protocol.
//!
//! `Idle → PropsInjected → ModeSwitched → Ready → Queried → Done`, with
//! `Faulted` reachable from every non-terminal state. One deadline covers the
//! whole run; the readiness wait gets whatever budget is left when it starts,
//! and timeouts always report the full call budget.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use marquee_browser::BrowserError;
use marquee_core::RawComposition;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::errors::DiscoveryError;
use crate::exchange::{RemoteQueryChannel, wait_for_ready};
use crate::protocol::{
    BUNDLE_CONTRACT_PROBE, BundleContract, GET_STATIC_COMPOSITIONS, PageGlobals, SET_BUNDLE_MODE,
    SITE_VERSION, evaluation_mode, is_acceptable_status, normalize_serve_url,
};

/// A deadline-bounded step of the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscoveryStep {
    /// Register the injected globals and load the bundle.
    InjectProps,
    /// Put the bundle into evaluation mode.
    SwitchMode,
    /// Wait for the readiness flag.
    WaitForReady,
    /// Fetch the composition list.
    QueryCompositions,
}

impl fmt::Display for DiscoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InjectProps => "inject props",
            Self::SwitchMode => "switch bundle mode",
            Self::WaitForReady => "wait for ready",
            Self::QueryCompositions => "query compositions",
        })
    }
}

/// Where a discovery run is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Nothing sent yet.
    Idle,
    /// Globals registered, bundle loaded and checked.
    PropsInjected,
    /// Bundle is in evaluation mode.
    ModeSwitched,
    /// Readiness flag observed.
    Ready,
    /// Composition list received.
    Queried,
    /// Compositions parsed.
    Done,
    /// A step failed.
    Faulted,
}

/// Inputs of one discovery run.
#[derive(Clone, Debug)]
pub struct DiscoveryParams<'a> {
    /// Props exposed to the bundle.
    pub input_props: &'a Map<String, Value>,
    /// Environment exposed to the bundle.
    pub env_variables: &'a BTreeMap<String, String>,
    /// Where the bundle is served.
    pub serve_url: &'a str,
    /// Port of the asset proxy.
    pub proxy_port: u16,
    /// Budget for the whole run.
    pub timeout: Duration,
    /// Readiness poll interval.
    pub poll_interval: Duration,
    /// Extra attempts when the execution context is replaced while loading.
    pub injection_retries: u32,
}

/// Run the protocol on the channel's page and return the bundle's
/// compositions as reported.
#[tracing::instrument(skip_all, fields(serve_url = params.serve_url, timeout_ms = millis(params.timeout)))]
pub async fn run_discovery(
    channel: &RemoteQueryChannel,
    params: &DiscoveryParams<'_>,
) -> Result<Vec<RawComposition>, DiscoveryError> {
    let mut run = DiscoveryRun {
        channel,
        params,
        state: DiscoveryState::Idle,
        deadline: Instant::now() + params.timeout,
    };
    match run.drive().await {
        Ok(compositions) => {
            run.transition(DiscoveryState::Done);
            Ok(compositions)
        }
        Err(e) => {
            tracing::debug!(from = ?run.state, error = %e, category = e.category(), "discovery faulted");
            run.transition(DiscoveryState::Faulted);
            Err(e)
        }
    }
}

struct DiscoveryRun<'a, 'p> {
    channel: &'a RemoteQueryChannel,
    params: &'a DiscoveryParams<'p>,
    state: DiscoveryState,
    deadline: Instant,
}

impl DiscoveryRun<'_, '_> {
    fn transition(&mut self, next: DiscoveryState) {
        tracing::debug!(from = ?self.state, to = ?next, "discovery transition");
        self.state = next;
    }

    async fn drive(&mut self) -> Result<Vec<RawComposition>, DiscoveryError> {
        let channel = self.channel;

        self.bounded(DiscoveryStep::InjectProps, channel.guard(self.inject_props()))
            .await?;
        self.transition(DiscoveryState::PropsInjected);

        let _ = self
            .bounded(
                DiscoveryStep::SwitchMode,
                channel.send(&SET_BUNDLE_MODE, &[evaluation_mode()], None),
            )
            .await?;
        self.transition(DiscoveryState::ModeSwitched);

        let remaining = self.deadline.saturating_duration_since(Instant::now());
        tracing::debug!(step = %DiscoveryStep::WaitForReady, remaining_ms = millis(remaining), "discovery step");
        wait_for_ready(channel, remaining, self.params.poll_interval)
            .await
            .map_err(|e| match e {
                DiscoveryError::ReadinessTimeout { .. } => DiscoveryError::ReadinessTimeout {
                    timeout_ms: millis(self.params.timeout),
                },
                other => other,
            })?;
        self.transition(DiscoveryState::Ready);

        let value = self
            .bounded(
                DiscoveryStep::QueryCompositions,
                channel.send(&GET_STATIC_COMPOSITIONS, &[], None),
            )
            .await?;
        self.transition(DiscoveryState::Queried);

        parse_compositions(value)
    }

    async fn bounded<T, F>(&self, step: DiscoveryStep, fut: F) -> Result<T, DiscoveryError>
    where
        F: Future<Output = Result<T, DiscoveryError>>,
    {
        tracing::debug!(step = %step, "discovery step");
        match tokio::time::timeout_at(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::DiscoveryTimeout {
                step,
                timeout_ms: millis(self.params.timeout),
            }),
        }
    }

    async fn inject_props(&self) -> Result<(), DiscoveryError> {
        let page = self.channel.page();
        let script = PageGlobals {
            input_props: self.params.input_props,
            env_variables: self.params.env_variables,
            proxy_port: self.params.proxy_port,
            timeout_ms: millis(self.params.timeout),
        }
        .new_document_script();
        page.add_script_on_new_document(&script).await?;

        let url = normalize_serve_url(self.params.serve_url);
        let mut retries_remaining = self.params.injection_retries;
        loop {
            match self.load_bundle(&url).await {
                Err(e) if e.is_context_destroyed() && retries_remaining > 0 => {
                    retries_remaining -= 1;
                    tracing::warn!(error = %e, retries_remaining, "execution context replaced while loading bundle, retrying");
                }
                other => return other,
            }
        }
    }

    async fn load_bundle(&self, url: &str) -> Result<(), DiscoveryError> {
        let status = self
            .channel
            .page()
            .navigate(url)
            .await
            .map_err(|e| match e {
                BrowserError::NavigationFailed { reason, .. } => DiscoveryError::Navigation {
                    url: url.to_owned(),
                    reason,
                },
                other => DiscoveryError::Transport(other),
            })?;
        if !is_acceptable_status(status) {
            return Err(DiscoveryError::Navigation {
                url: url.to_owned(),
                reason: format!("HTTP status code {}", status.unwrap_or_default()),
            });
        }

        let value = self.channel.send(&BUNDLE_CONTRACT_PROBE, &[], None).await?;
        let contract: BundleContract = serde_json::from_value(value)
            .map_err(|e| DiscoveryError::Protocol(format!("bundle contract check: {e}")))?;
        if !contract.has_compositions {
            return Err(DiscoveryError::InvalidBundle { url: url.to_owned() });
        }
        if contract.site_version.as_deref() != Some(SITE_VERSION) {
            return Err(DiscoveryError::IncompatibleBundle {
                url: url.to_owned(),
                expected: SITE_VERSION,
                actual: contract.site_version,
            });
        }
        Ok(())
    }
}

/// Parse a `getStaticCompositions()` result, rejecting repeated ids.
pub fn parse_compositions(value: Value) -> Result<Vec<RawComposition>, DiscoveryError> {
    let Value::Array(items) = value else {
        return Err(DiscoveryError::Protocol(format!(
            "getStaticCompositions() returned {}, expected an array",
            json_type(&value)
        )));
    };

    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .map(|item| {
            let composition: RawComposition = serde_json::from_value(item)
                .map_err(|e| DiscoveryError::Protocol(format!("malformed composition: {e}")))?;
            if !seen.insert(composition.id.clone()) {
                return Err(DiscoveryError::DuplicateComposition { id: composition.id });
            }
            Ok(composition)
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
