//! Waiting for the bundle to finish initializing.

use std::time::Duration;

use crate::errors::DiscoveryError;
use crate::exchange::channel::RemoteQueryChannel;
use crate::protocol::{READINESS_PROBE, ReadinessState};

/// Poll the readiness flag every `poll_interval` until it is set.
///
/// Fails with [`DiscoveryError::ReadinessTimeout`] after `timeout`, with
/// [`DiscoveryError::RemoteOperation`] as soon as the bundle reports a
/// cancellation, and with [`DiscoveryError::RemotePage`] as soon as the page
/// faults.
#[tracing::instrument(skip(channel))]
pub async fn wait_for_ready(
    channel: &RemoteQueryChannel,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), DiscoveryError> {
    let poll = async {
        let mut polls = 0u32;
        loop {
            polls += 1;
            let value = channel.send(&READINESS_PROBE, &[], None).await?;
            let state: ReadinessState = serde_json::from_value(value)
                .map_err(|e| DiscoveryError::Protocol(format!("readiness check: {e}")))?;
            if let Some(message) = state.cancelled {
                return Err(DiscoveryError::RemoteOperation {
                    operation: READINESS_PROBE.name.to_owned(),
                    message,
                    stack: None,
                });
            }
            if state.ready {
                tracing::debug!(polls, "bundle ready");
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    channel
        .guard(async {
            match tokio::time::timeout(timeout, poll).await {
                Ok(result) => result,
                Err(_) => Err(DiscoveryError::ReadinessTimeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        })
        .await
}
