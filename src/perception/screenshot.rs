//! Resilient screen capture.
//!
//! Tiers, in order: the link's primary capture, the same after a short pause,
//! the same after a health check, a raw `screencap -p` through the shell, and
//! finally the raw shell again after reconnecting the transport.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CaptureConfig;
use crate::device::DeviceLink;
use crate::errors::{MobileClawError, MobileClawResult};
use crate::fallback::first_success;
use crate::perception::types::{Screenshot, PNG_SIGNATURE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTier {
    Primary,
    PrimaryRetry,
    HealthCheckedPrimary,
    RawShell,
    ReconnectedRawShell,
}

pub const CAPTURE_TIERS: [CaptureTier; 5] = [
    CaptureTier::Primary,
    CaptureTier::PrimaryRetry,
    CaptureTier::HealthCheckedPrimary,
    CaptureTier::RawShell,
    CaptureTier::ReconnectedRawShell,
];

impl fmt::Display for CaptureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureTier::Primary => "primary",
            CaptureTier::PrimaryRetry => "primary_retry",
            CaptureTier::HealthCheckedPrimary => "health_checked_primary",
            CaptureTier::RawShell => "raw_shell",
            CaptureTier::ReconnectedRawShell => "reconnected_raw_shell",
        };
        f.write_str(name)
    }
}

/// Undoes the newline translation some shell transports apply to binary
/// output. Payloads that already carry the PNG signature pass through.
pub fn normalize_png(bytes: Vec<u8>) -> Vec<u8> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        return bytes;
    }

    // Exact inverse of LF -> CRLF when scanned left to right: a genuine
    // CR LF arrives as CR CR LF and comes back as CR LF.
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"\r\n") {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    // Drop any banner text printed ahead of the image.
    let start = out
        .windows(PNG_SIGNATURE.len())
        .position(|w| w == PNG_SIGNATURE);
    match start {
        Some(start) if start > 0 => out.split_off(start),
        _ => out,
    }
}

pub struct ScreenshotCapture {
    link: Arc<dyn DeviceLink>,
    config: CaptureConfig,
}

impl ScreenshotCapture {
    pub fn new(link: Arc<dyn DeviceLink>, config: CaptureConfig) -> Self {
        Self { link, config }
    }

    pub async fn capture(&self) -> MobileClawResult<Screenshot> {
        match first_success(&CAPTURE_TIERS, |tier| self.capture_tier(tier)).await {
            Ok((tier, shot)) => {
                tracing::debug!(tier = %tier, width = shot.width, height = shot.height, "screenshot captured");
                Ok(shot)
            }
            Err(attempts) => {
                tracing::error!(attempts = %attempts, "all capture tiers failed");
                Err(MobileClawError::CaptureFailed(attempts.summary()))
            }
        }
    }

    async fn capture_tier(&self, tier: CaptureTier) -> MobileClawResult<Screenshot> {
        let link = self.link.as_ref();
        let bytes = match tier {
            CaptureTier::Primary => link.screenshot().await?,
            CaptureTier::PrimaryRetry => {
                sleep_ms(self.config.retry_delay_ms).await;
                link.screenshot().await?
            }
            CaptureTier::HealthCheckedPrimary => {
                match link.health_check().await {
                    Ok(healthy) => tracing::debug!(healthy, "link health check"),
                    Err(e) => tracing::debug!(error = %e, "link health check failed"),
                }
                sleep_ms(self.config.health_delay_ms).await;
                link.screenshot().await?
            }
            CaptureTier::RawShell => self.raw_screencap().await?,
            CaptureTier::ReconnectedRawShell => {
                link.reconnect().await?;
                sleep_ms(self.config.reconnect_delay_ms).await;
                self.raw_screencap().await?
            }
        };
        Screenshot::from_png(normalize_png(bytes))
    }

    async fn raw_screencap(&self) -> MobileClawResult<Vec<u8>> {
        let out = self.link.shell("screencap -p").await?;
        if !out.success() || out.stdout.is_empty() {
            return Err(MobileClawError::DeviceTransient(format!(
                "screencap exited {} with {} bytes: {}",
                out.code,
                out.stdout.len(),
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
