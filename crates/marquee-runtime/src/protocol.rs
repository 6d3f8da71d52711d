//! The contract between the runtime and a served bundle.
//!
//! Everything the page side is expected to expose, and everything we inject
//! into it, is named here and nowhere else.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Protocol version a bundle must report as `window.siteVersion`.
pub const SITE_VERSION: &str = "11";

/// HTTP statuses accepted for the bundle's `index.html`.
pub const ACCEPTABLE_STATUSES: [u16; 4] = [200, 301, 302, 304];

/// Whether a navigation status means the bundle page loaded.
///
/// `None` (no HTTP response, e.g. `file:` URLs) is accepted.
pub fn is_acceptable_status(status: Option<u16>) -> bool {
    status.is_none_or(|s| ACCEPTABLE_STATUSES.contains(&s))
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote operations
// ─────────────────────────────────────────────────────────────────────────────

/// A named JavaScript function invoked inside the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteOperation {
    /// Name used in errors and logs.
    pub name: &'static str,
    /// Function declaration source.
    pub declaration: &'static str,
}

impl RemoteOperation {
    /// Expression that calls the declaration with `args` spread as arguments.
    pub fn call_expression(&self, args: &[Value]) -> String {
        format!("({})(...{})", self.declaration, Value::Array(args.to_vec()))
    }
}

/// Switch the bundle into a mode. Takes `{type: "evaluation"}`.
pub const SET_BUNDLE_MODE: RemoteOperation = RemoteOperation {
    name: "setBundleMode",
    declaration: "(mode) => { window.remotion_setBundleMode(mode); }",
};

/// Fetch the composition list.
pub const GET_STATIC_COMPOSITIONS: RemoteOperation = RemoteOperation {
    name: "getStaticCompositions",
    declaration: "() => window.getStaticCompositions()",
};

/// Read the readiness flag and the cancellation slot.
pub const READINESS_PROBE: RemoteOperation = RemoteOperation {
    name: "waitForReady",
    declaration: "() => ({ \
        ready: window.remotion_renderReady === true, \
        cancelled: window.remotion_cancelledError === undefined ? null : String(window.remotion_cancelledError) \
    })",
};

/// Check that the page is a bundle this runtime can talk to.
pub const BUNDLE_CONTRACT_PROBE: RemoteOperation = RemoteOperation {
    name: "checkBundle",
    declaration: "() => ({ \
        hasCompositions: typeof window.getStaticCompositions === 'function', \
        siteVersion: window.siteVersion === undefined ? null : String(window.siteVersion) \
    })",
};

/// Argument for [`SET_BUNDLE_MODE`] that enables composition queries.
pub fn evaluation_mode() -> Value {
    json!({ "type": "evaluation" })
}

/// Result of [`READINESS_PROBE`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReadinessState {
    /// `window.remotion_renderReady === true`.
    pub ready: bool,
    /// `window.remotion_cancelledError`, when the bundle gave up.
    #[serde(default)]
    pub cancelled: Option<String>,
}

/// Result of [`BUNDLE_CONTRACT_PROBE`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleContract {
    /// Whether `window.getStaticCompositions` is a function.
    pub has_compositions: bool,
    /// `window.siteVersion`.
    #[serde(default)]
    pub site_version: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Injected globals
// ─────────────────────────────────────────────────────────────────────────────

/// Values placed on `window` before the bundle's own scripts run.
#[derive(Clone, Debug, PartialEq)]
pub struct PageGlobals<'a> {
    /// Caller's input props, exposed as a JSON string.
    pub input_props: &'a Map<String, Value>,
    /// Environment variables, exposed as a JSON string.
    pub env_variables: &'a BTreeMap<String, String>,
    /// Port of the local asset proxy.
    pub proxy_port: u16,
    /// Call budget, for the bundle's own `delayRender` timeouts.
    pub timeout_ms: u64,
}

impl PageGlobals<'_> {
    /// Script registered with `Page.addScriptToEvaluateOnNewDocument`.
    pub fn new_document_script(&self) -> String {
        // values are stored as JSON *strings*; the bundle parses them itself
        let props = Value::String(Value::Object(self.input_props.clone()).to_string());
        let env = Value::String(json!(self.env_variables).to_string());
        format!(
            "window.remotion_inputProps = {props};\n\
             window.remotion_envVariables = {env};\n\
             window.remotion_initialFrame = 0;\n\
             window.remotion_proxyPort = {port};\n\
             window.remotion_audioEnabled = false;\n\
             window.remotion_videoEnabled = false;\n\
             window.remotion_puppeteerTimeout = {timeout};\n",
            port = self.proxy_port,
            timeout = self.timeout_ms,
        )
    }
}

/// URL of the bundle's entry document.
///
/// Drops the query string and makes sure the path ends in `/index.html`.
pub fn normalize_serve_url(serve_url: &str) -> String {
    let base = serve_url.split_once('?').map_or(serve_url, |(base, _)| base);
    if base.ends_with("/index.html") {
        base.to_owned()
    } else if base.ends_with('/') {
        format!("{base}index.html")
    } else {
        format!("{base}/index.html")
    }
}
