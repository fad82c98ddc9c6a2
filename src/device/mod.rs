//! The device boundary.
//!
//! Everything above this module talks to a phone only through [`DeviceLink`].
//! [`adb::AdbDevice`] drives a real handset; [`fake::FakeDevice`] is an in-memory
//! stand-in that scripts responses and records every call.

pub mod adb;
pub mod fake;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::errors::MobileClawResult;

/// Package/activity pair currently in the foreground.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundApp {
    pub package: String,
    pub activity: String,
}

impl ForegroundApp {
    pub fn new(package: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            activity: activity.into(),
        }
    }
}

impl std::fmt::Display for ForegroundApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.package, self.activity)
    }
}

/// Result of a text-entry attempt: which input method actually landed the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOutcome {
    pub ok: bool,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TypeOutcome {
    pub fn success(method: impl Into<String>) -> Self {
        Self {
            ok: true,
            method: method.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            method: "none".into(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub code: i32,
    /// Raw bytes; screen captures travel through here.
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// A node from the on-screen view hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiNode {
    pub text: String,
    pub resource_id: String,
    pub class_name: String,
    /// `(left, top, right, bottom)` in device pixels.
    pub bounds: (i32, i32, i32, i32),
}

impl UiNode {
    pub fn is_text_field(&self) -> bool {
        self.class_name == "android.widget.EditText"
    }

    pub fn center(&self) -> (i32, i32) {
        let (l, t, r, b) = self.bounds;
        ((l + r) / 2, (t + b) / 2)
    }
}

/// How the launcher locates widgets it needs to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSelector {
    ResourceId(String),
    ClassName(String),
    /// Regex matched against the node text.
    TextMatches(String),
}

impl UiSelector {
    /// Case-insensitive whole-text match.
    pub fn text_exact(label: &str) -> Self {
        UiSelector::TextMatches(format!("(?i)^{}$", regex::escape(label)))
    }

    /// Case-insensitive substring match.
    pub fn text_contains(label: &str) -> Self {
        UiSelector::TextMatches(format!("(?i){}", regex::escape(label)))
    }

    pub fn matches(&self, node: &UiNode) -> bool {
        match self {
            UiSelector::ResourceId(id) => node.resource_id == *id,
            UiSelector::ClassName(class) => node.class_name == *class,
            UiSelector::TextMatches(pattern) => RegexBuilder::new(pattern)
                .build()
                .map(|re| re.is_match(&node.text))
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Display for UiSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiSelector::ResourceId(id) => write!(f, "resource-id={id}"),
            UiSelector::ClassName(class) => write!(f, "class={class}"),
            UiSelector::TextMatches(pattern) => write!(f, "text~{pattern}"),
        }
    }
}

/// Everything the core needs from a phone. Coordinates are device pixels,
/// durations are seconds.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn click(&self, x: i32, y: i32) -> MobileClawResult<()>;

    async fn long_press(&self, x: i32, y: i32, duration: f64) -> MobileClawResult<()>;

    async fn drag(&self, sx: i32, sy: i32, ex: i32, ey: i32, duration: f64)
        -> MobileClawResult<()>;

    async fn swipe(&self, sx: i32, sy: i32, ex: i32, ey: i32, duration: f64)
        -> MobileClawResult<()>;

    /// Enters text into the focused field. A trailing `\n` submits.
    async fn type_text(&self, content: &str) -> MobileClawResult<TypeOutcome>;

    async fn press_home(&self) -> MobileClawResult<()>;

    async fn press_back(&self) -> MobileClawResult<()>;

    /// Starts `package` through the platform's own app-start call.
    async fn open_app_native(&self, package: &str) -> MobileClawResult<()>;

    /// Encoded screen image (PNG) from the primary capture API.
    async fn screenshot(&self) -> MobileClawResult<Vec<u8>>;

    async fn foreground_app(&self) -> MobileClawResult<Option<ForegroundApp>>;

    async fn shell(&self, cmd: &str) -> MobileClawResult<ShellOutput>;

    /// Physical `(width, height)` in pixels.
    async fn window_size(&self) -> MobileClawResult<(u32, u32)>;

    /// Every node matching `selector`, in hierarchy order.
    async fn find_nodes(&self, selector: &UiSelector) -> MobileClawResult<Vec<UiNode>>;

    async fn find_node(&self, selector: &UiSelector) -> MobileClawResult<Option<UiNode>> {
        Ok(self.find_nodes(selector).await?.into_iter().next())
    }

    /// `Ok(false)` means the link has no health check.
    async fn health_check(&self) -> MobileClawResult<bool> {
        Ok(false)
    }

    /// Forces the transport back online.
    async fn reconnect(&self) -> MobileClawResult<()> {
        Ok(())
    }
}
