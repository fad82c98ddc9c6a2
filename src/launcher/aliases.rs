//! App-name aliases: human label -> package id or platform intent action.
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One alias as written in `config.toml`:
///
/// ```toml
/// notes   = "com.example.notes"
/// display = "intent:android.settings.DISPLAY_SETTINGS"
/// clock   = { package = "com.google.android.deskclock" }
/// wifi    = { intent = "android.settings.WIFI_SETTINGS" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasSpec {
    Package { package: String },
    Intent { intent: String },
    Plain(String),
}

impl AliasSpec {
    /// `None` when a plain string is neither `intent:...` nor dotted.
    pub fn target(&self) -> Option<AliasTarget> {
        match self {
            AliasSpec::Package { package } => Some(AliasTarget::Package(package.trim().to_string())),
            AliasSpec::Intent { intent } => Some(AliasTarget::Intent(intent.trim().to_string())),
            AliasSpec::Plain(value) => {
                let value = value.trim();
                if let Some(action) = value.strip_prefix("intent:") {
                    Some(AliasTarget::Intent(action.trim().to_string()))
                } else if value.contains('.') {
                    Some(AliasTarget::Package(value.to_string()))
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    Package(String),
    Intent(String),
}

const DEFAULT_INTENTS: &[(&str, &str)] = &[
    ("settings", "android.settings.SETTINGS"),
    ("设置", "android.settings.SETTINGS"),
    ("wifi", "android.settings.WIFI_SETTINGS"),
    ("无线", "android.settings.WIFI_SETTINGS"),
    ("bluetooth", "android.settings.BLUETOOTH_SETTINGS"),
    ("蓝牙", "android.settings.BLUETOOTH_SETTINGS"),
    ("location", "android.settings.LOCATION_SOURCE_SETTINGS"),
    ("位置信息", "android.settings.LOCATION_SOURCE_SETTINGS"),
];

const DEFAULT_PACKAGES: &[(&str, &str)] = &[
    ("camera", "com.android.camera"),
    ("相机", "com.android.camera"),
    ("chrome", "com.android.chrome"),
    ("浏览器", "com.android.chrome"),
    ("play store", "com.android.vending"),
    ("play 商店", "com.android.vending"),
    ("phone", "com.android.dialer"),
    ("电话", "com.android.dialer"),
    ("messages", "com.google.android.apps.messaging"),
    ("短信", "com.google.android.apps.messaging"),
    ("计算器", "com.google.android.calculator"),
    ("calendar", "com.google.android.calendar"),
    ("日历", "com.google.android.calendar"),
    ("maps", "com.google.android.apps.maps"),
    ("地图", "com.google.android.apps.maps"),
    ("gmail", "com.google.android.gm"),
    ("youtube", "com.google.android.youtube"),
];

/// Case-insensitive, whitespace-collapsed lookup key.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Built-in aliases with the caller's entries merged on top. Built once per
/// session and never mutated.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: HashMap<String, AliasTarget>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let entries = DEFAULT_INTENTS
            .iter()
            .map(|(name, action)| (normalize_name(name), AliasTarget::Intent(action.to_string())))
            .chain(
                DEFAULT_PACKAGES
                    .iter()
                    .map(|(name, pkg)| (normalize_name(name), AliasTarget::Package(pkg.to_string()))),
            )
            .collect();
        Self { entries }
    }

    pub fn with_overrides(overrides: &BTreeMap<String, AliasSpec>) -> Self {
        let mut table = Self::builtin();
        for (name, spec) in overrides {
            match spec.target() {
                Some(target) => {
                    table.entries.insert(normalize_name(name), target);
                }
                None => {
                    tracing::warn!(alias = %name, spec = ?spec, "alias is neither a package nor an intent, ignored");
                }
            }
        }
        table
    }

    pub fn resolve(&self, name: &str) -> Option<&AliasTarget> {
        self.entries.get(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_normalize_case_and_spacing() {
        assert_eq!(normalize_name("  Play   STORE "), "play store");
        let table = AliasTable::builtin();
        assert_eq!(
            table.resolve("Play  Store"),
            Some(&AliasTarget::Package("com.android.vending".into()))
        );
        assert_eq!(
            table.resolve("设置"),
            Some(&AliasTarget::Intent("android.settings.SETTINGS".into()))
        );
        assert_eq!(table.resolve("whatsapp"), None);
    }

    #[test]
    fn plain_strings_classify_by_shape() {
        assert_eq!(
            AliasSpec::Plain("intent: android.settings.DISPLAY_SETTINGS".into()).target(),
            Some(AliasTarget::Intent("android.settings.DISPLAY_SETTINGS".into()))
        );
        assert_eq!(
            AliasSpec::Plain("com.example.notes".into()).target(),
            Some(AliasTarget::Package("com.example.notes".into()))
        );
        assert_eq!(AliasSpec::Plain("notes".into()).target(), None);
    }

    #[test]
    fn caller_overrides_win_over_builtins() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "Settings".to_string(),
            AliasSpec::Package { package: "com.vendor.settings".into() },
        );
        overrides.insert("broken".to_string(), AliasSpec::Plain("nodots".into()));
        let table = AliasTable::with_overrides(&overrides);
        assert_eq!(
            table.resolve("settings"),
            Some(&AliasTarget::Package("com.vendor.settings".into()))
        );
        assert_eq!(table.resolve("broken"), None);
        assert_eq!(table.len(), AliasTable::builtin().len());
    }

    #[test]
    fn table_forms_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            aliases: BTreeMap<String, AliasSpec>,
        }
        let w: Wrapper = toml::from_str(
            r#"
            [aliases]
            a = "com.a"
            b = { package = "com.b" }
            c = { intent = "android.settings.C" }
            "#,
        )
        .unwrap();
        assert_eq!(w.aliases["a"], AliasSpec::Plain("com.a".into()));
        assert_eq!(w.aliases["b"], AliasSpec::Package { package: "com.b".into() });
        assert_eq!(w.aliases["c"], AliasSpec::Intent { intent: "android.settings.C".into() });
    }
}
