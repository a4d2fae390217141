use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::storage::KeyValueStore;

// Store keys. Speed records ("sources", "lastSpeed") are owned by the
// speed-memory layer, not by Settings.
pub const KEY_ENABLED: &str = "enabled";
pub const KEY_BLACKLIST: &str = "blacklist";
pub const KEY_BINDINGS: &str = "keyBindings";
pub const KEY_REMEMBER_SPEED: &str = "rememberSpeed";
pub const KEY_FORCE_LAST_SAVED: &str = "forceLastSavedSpeed";
pub const KEY_AUDIO_ENABLED: &str = "audioEnabled";
pub const KEY_START_HIDDEN: &str = "startHidden";
pub const KEY_CONTROLLER_OPACITY: &str = "controllerOpacity";

const SETTINGS_KEYS: &[&str] = &[
    KEY_ENABLED,
    KEY_BLACKLIST,
    KEY_BINDINGS,
    KEY_REMEMBER_SPEED,
    KEY_FORCE_LAST_SAVED,
    KEY_AUDIO_ENABLED,
    KEY_START_HIDDEN,
    KEY_CONTROLLER_OPACITY,
];

// Legacy single-purpose option keys from the pre-keyBindings layout.
const LEGACY_KEYCODE_KEYS: &[(&str, &str)] = &[
    ("displayKeyCode", "display"),
    ("slowerKeyCode", "slower"),
    ("fasterKeyCode", "faster"),
    ("rewindKeyCode", "rewind"),
    ("advanceKeyCode", "advance"),
    ("resetKeyCode", "reset"),
    ("fastKeyCode", "fast"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyBinding {
    pub action: String,
    /// Physical key, DOM `KeyboardEvent.code` style ("KeyS", "Digit1").
    pub code: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub value2: f64,
    /// Handle the key even when the event targets an editable element.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
}

impl KeyBinding {
    pub fn new(action: &str, code: &str, value: f64) -> Self {
        KeyBinding {
            action: action.to_string(),
            code: code.to_string(),
            value,
            value2: 0.0,
            force: false,
            shift: false,
            ctrl: false,
            alt: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub enabled: bool,
    pub blacklist: Vec<String>,
    pub key_bindings: Vec<KeyBinding>,
    pub remember_speed: bool,
    pub force_last_saved_speed: bool,
    pub audio_enabled: bool,
    pub start_hidden: bool,
    pub controller_opacity: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: true,
            blacklist: vec![
                "www.instagram.com".to_string(),
                "x.com".to_string(),
                "imgur.com".to_string(),
                "teams.microsoft.com".to_string(),
            ],
            key_bindings: default_key_bindings(),
            remember_speed: false,
            force_last_saved_speed: false,
            audio_enabled: false,
            start_hidden: false,
            controller_opacity: 0.3,
        }
    }
}

pub fn default_key_bindings() -> Vec<KeyBinding> {
    vec![
        KeyBinding::new("display", "KeyV", 0.0),
        KeyBinding::new("slower", "KeyS", 0.1),
        KeyBinding::new("faster", "KeyD", 0.1),
        KeyBinding::new("rewind", "KeyZ", 10.0),
        KeyBinding::new("advance", "KeyX", 10.0),
        KeyBinding::new("reset", "KeyR", 1.0),
        KeyBinding::new("fast", "KeyG", 1.8),
    ]
}

impl Settings {
    /// Loads settings from the store, migrating a legacy numeric-keycode
    /// layout to `keyBindings` if needed. Migration is persisted before
    /// returning so later sessions see the new layout; a failing write is
    /// logged and the in-memory result is used anyway.
    pub fn load(store: &mut dyn KeyValueStore) -> Self {
        let mut wanted: Vec<&str> = SETTINGS_KEYS.to_vec();
        wanted.extend(LEGACY_KEYCODE_KEYS.iter().map(|(key, _)| *key));
        wanted.extend(["speedStep", "rewindTime", "fastSpeed"]);

        let stored = match store.get(&wanted) {
            Ok(map) => map,
            Err(e) => {
                log::error!("Settings load failed ({}), using defaults", e);
                return Settings::default();
            }
        };

        let mut settings = Settings::from_entries(&stored);

        if settings.key_bindings.is_empty() {
            settings.key_bindings = migrate_legacy_bindings(&stored);
            log::info!(
                "Migrated {} key bindings from legacy layout",
                settings.key_bindings.len()
            );
            let mut entries = HashMap::new();
            entries.insert(
                KEY_BINDINGS.to_string(),
                serde_json::to_value(&settings.key_bindings).unwrap_or(Value::Null),
            );
            if let Err(e) = store.set(entries) {
                log::error!("Failed to persist migrated key bindings: {}", e);
            }
        }

        settings
    }

    /// Builds settings from raw store entries, falling back to the default
    /// per key when a value is missing or malformed. A single bad entry
    /// must not take the whole configuration down.
    pub fn from_entries(stored: &HashMap<String, Value>) -> Self {
        let defaults = Settings::default();
        Settings {
            enabled: read_key(stored, KEY_ENABLED, defaults.enabled),
            blacklist: read_key(stored, KEY_BLACKLIST, defaults.blacklist),
            key_bindings: read_bindings(stored),
            remember_speed: read_key(stored, KEY_REMEMBER_SPEED, defaults.remember_speed),
            force_last_saved_speed: read_key(
                stored,
                KEY_FORCE_LAST_SAVED,
                defaults.force_last_saved_speed,
            ),
            audio_enabled: read_key(stored, KEY_AUDIO_ENABLED, defaults.audio_enabled),
            start_hidden: read_key(stored, KEY_START_HIDDEN, defaults.start_hidden),
            controller_opacity: read_key(
                stored,
                KEY_CONTROLLER_OPACITY,
                defaults.controller_opacity,
            ),
        }
    }

    pub fn to_entries(&self) -> HashMap<String, Value> {
        let mut entries = HashMap::new();
        entries.insert(KEY_ENABLED.to_string(), Value::from(self.enabled));
        entries.insert(
            KEY_BLACKLIST.to_string(),
            serde_json::to_value(&self.blacklist).unwrap_or(Value::Null),
        );
        entries.insert(
            KEY_BINDINGS.to_string(),
            serde_json::to_value(&self.key_bindings).unwrap_or(Value::Null),
        );
        entries.insert(KEY_REMEMBER_SPEED.to_string(), Value::from(self.remember_speed));
        entries.insert(
            KEY_FORCE_LAST_SAVED.to_string(),
            Value::from(self.force_last_saved_speed),
        );
        entries.insert(KEY_AUDIO_ENABLED.to_string(), Value::from(self.audio_enabled));
        entries.insert(KEY_START_HIDDEN.to_string(), Value::from(self.start_hidden));
        entries.insert(
            KEY_CONTROLLER_OPACITY.to_string(),
            Value::from(self.controller_opacity),
        );
        entries
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> anyhow::Result<()> {
        store.set(self.to_entries())
    }

    /// Finds the binding matching a key event. Modifier flags must match
    /// exactly so `S` and `Shift+S` can carry different actions.
    pub fn find_binding(&self, code: &str, shift: bool, ctrl: bool, alt: bool) -> Option<&KeyBinding> {
        self.key_bindings.iter().find(|b| {
            b.code == code && b.shift == shift && b.ctrl == ctrl && b.alt == alt
        })
    }

    pub fn binding_for_action(&self, action: &str) -> Option<&KeyBinding> {
        self.key_bindings.iter().find(|b| b.action == action)
    }

    /// The configured fast-speed target, from the `fast` binding.
    pub fn fast_speed(&self) -> f64 {
        self.binding_for_action("fast").map(|b| b.value).unwrap_or(1.8)
    }
}

fn read_key<T: serde::de::DeserializeOwned>(
    stored: &HashMap<String, Value>,
    key: &str,
    default: T,
) -> T {
    match stored.get(key) {
        None => default,
        Some(value) => match serde_json::from_value::<T>(value.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("Ignoring malformed stored value for {}: {}", key, e);
                default
            }
        },
    }
}

/// Bindings parse element-by-element: one broken entry is dropped, the
/// rest survive.
fn read_bindings(stored: &HashMap<String, Value>) -> Vec<KeyBinding> {
    let Some(Value::Array(raw)) = stored.get(KEY_BINDINGS) else {
        return Vec::new();
    };
    let mut bindings = Vec::new();
    for entry in raw {
        match serde_json::from_value::<KeyBinding>(entry.clone()) {
            Ok(binding) => bindings.push(binding),
            Err(e) => log::warn!("Dropping malformed key binding {}: {}", entry, e),
        }
    }
    bindings
}

/// Builds a binding set from the legacy per-action keycode options,
/// keeping the defaults for anything the legacy layout does not carry.
/// Unknown keycodes drop that binding with a warning.
fn migrate_legacy_bindings(stored: &HashMap<String, Value>) -> Vec<KeyBinding> {
    let speed_step = read_key(stored, "speedStep", 0.1_f64);
    let rewind_time = read_key(stored, "rewindTime", 10.0_f64);
    let fast_speed = read_key(stored, "fastSpeed", 1.8_f64);

    let mut bindings = Vec::new();
    for default in default_key_bindings() {
        let legacy_key = LEGACY_KEYCODE_KEYS
            .iter()
            .find(|(_, action)| *action == default.action)
            .map(|(key, _)| *key);
        let mut binding = default;
        binding.value = match binding.action.as_str() {
            "slower" | "faster" => speed_step,
            "rewind" | "advance" => rewind_time,
            "fast" => fast_speed,
            _ => binding.value,
        };
        if let Some(key) = legacy_key {
            if let Some(raw) = stored.get(key) {
                match raw.as_u64().and_then(|kc| keycode_to_code(kc as u32)) {
                    Some(code) => binding.code = code,
                    None => {
                        log::warn!(
                            "Legacy keycode {} for {} not mappable, dropping binding",
                            raw,
                            binding.action
                        );
                        continue;
                    }
                }
            }
        }
        bindings.push(binding);
    }
    bindings
}

/// Maps a legacy numeric keyCode to a `KeyboardEvent.code` string.
pub fn keycode_to_code(keycode: u32) -> Option<String> {
    match keycode {
        65..=90 => Some(format!("Key{}", (b'A' + (keycode - 65) as u8) as char)),
        48..=57 => Some(format!("Digit{}", keycode - 48)),
        96..=105 => Some(format!("Numpad{}", keycode - 96)),
        112..=123 => Some(format!("F{}", keycode - 111)),
        32 => Some("Space".to_string()),
        37 => Some("ArrowLeft".to_string()),
        38 => Some("ArrowUp".to_string()),
        39 => Some("ArrowRight".to_string()),
        40 => Some("ArrowDown".to_string()),
        186 => Some("Semicolon".to_string()),
        188 => Some("Comma".to_string()),
        190 => Some("Period".to_string()),
        _ => None,
    }
}
