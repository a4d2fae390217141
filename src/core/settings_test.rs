use std::collections::HashMap;

use serde_json::{json, Value};

use crate::core::settings::{keycode_to_code, KeyBinding, Settings, KEY_BINDINGS};
use crate::core::storage::{KeyValueStore, MemoryStore};

#[test]
fn test_default_bindings_cover_core_actions() {
    let settings = Settings::default();
    for action in ["display", "slower", "faster", "rewind", "advance", "reset", "fast"] {
        assert!(
            settings.binding_for_action(action).is_some(),
            "missing default binding for {}",
            action
        );
    }
    assert_eq!(settings.binding_for_action("fast").unwrap().code, "KeyG");
    assert_eq!(settings.fast_speed(), 1.8);
}

#[test]
fn test_from_entries_overrides_present_keys_only() {
    let mut stored = HashMap::new();
    stored.insert("enabled".to_string(), Value::from(false));
    stored.insert("controllerOpacity".to_string(), Value::from(0.8));

    let settings = Settings::from_entries(&stored);
    assert!(!settings.enabled);
    assert_eq!(settings.controller_opacity, 0.8);
    // Untouched keys keep their defaults.
    assert!(!settings.remember_speed);
    assert_eq!(settings.blacklist.len(), 4);
}

#[test]
fn test_malformed_value_falls_back_to_default() {
    let mut stored = HashMap::new();
    stored.insert("rememberSpeed".to_string(), Value::from("yes please"));
    let settings = Settings::from_entries(&stored);
    assert!(!settings.remember_speed);
}

#[test]
fn test_malformed_binding_dropped_others_kept() {
    let mut stored = HashMap::new();
    stored.insert(
        KEY_BINDINGS.to_string(),
        json!([
            { "action": "faster", "code": "KeyD", "value": 0.25 },
            { "action": "slower" },
            { "action": "rewind", "code": "KeyZ", "value": 5.0 }
        ]),
    );
    let settings = Settings::from_entries(&stored);
    assert_eq!(settings.key_bindings.len(), 2);
    assert_eq!(settings.key_bindings[0].action, "faster");
    assert_eq!(settings.key_bindings[0].value, 0.25);
    assert_eq!(settings.key_bindings[1].action, "rewind");
}

#[test]
fn test_legacy_keycodes_migrate_and_persist() {
    let mut store = MemoryStore::with(HashMap::from([
        ("fasterKeyCode".to_string(), Value::from(76)), // L
        ("slowerKeyCode".to_string(), Value::from(75)), // K
        ("speedStep".to_string(), Value::from(0.25)),
        ("fastSpeed".to_string(), Value::from(2.5)),
    ]));

    let settings = Settings::load(&mut store);
    let faster = settings.binding_for_action("faster").unwrap();
    assert_eq!(faster.code, "KeyL");
    assert_eq!(faster.value, 0.25);
    assert_eq!(settings.binding_for_action("slower").unwrap().code, "KeyK");
    // Actions without a legacy keycode keep their default key.
    assert_eq!(settings.binding_for_action("rewind").unwrap().code, "KeyZ");
    assert_eq!(settings.fast_speed(), 2.5);

    // The migrated layout is written back before the session starts.
    let persisted = store.get(&[KEY_BINDINGS]).unwrap();
    let bindings: Vec<KeyBinding> =
        serde_json::from_value(persisted.get(KEY_BINDINGS).unwrap().clone()).unwrap();
    assert_eq!(bindings.len(), settings.key_bindings.len());
}

#[test]
fn test_unmappable_legacy_keycode_drops_binding() {
    let mut store = MemoryStore::with(HashMap::from([
        ("displayKeyCode".to_string(), Value::from(255)),
    ]));
    let settings = Settings::load(&mut store);
    assert!(settings.binding_for_action("display").is_none());
    assert!(settings.binding_for_action("faster").is_some());
}

#[test]
fn test_existing_bindings_skip_migration() {
    let mut store = MemoryStore::with(HashMap::from([
        (
            KEY_BINDINGS.to_string(),
            json!([{ "action": "faster", "code": "KeyD", "value": 0.1 }]),
        ),
        ("fasterKeyCode".to_string(), Value::from(76)),
    ]));
    let settings = Settings::load(&mut store);
    assert_eq!(settings.key_bindings.len(), 1);
    assert_eq!(settings.binding_for_action("faster").unwrap().code, "KeyD");
}

#[test]
fn test_save_then_load_round_trip() {
    let mut store = MemoryStore::new();
    let mut settings = Settings::default();
    settings.enabled = false;
    settings.start_hidden = true;
    settings.blacklist = vec!["example.com".to_string()];
    settings.save(&mut store).unwrap();

    let reloaded = Settings::load(&mut store);
    assert_eq!(reloaded, settings);
}

#[test]
fn test_find_binding_requires_exact_modifiers() {
    let mut settings = Settings::default();
    settings.key_bindings.push(KeyBinding {
        shift: true,
        ..KeyBinding::new("mark", "KeyS", 0.0)
    });

    let plain = settings.find_binding("KeyS", false, false, false).unwrap();
    assert_eq!(plain.action, "slower");
    let shifted = settings.find_binding("KeyS", true, false, false).unwrap();
    assert_eq!(shifted.action, "mark");
    assert!(settings.find_binding("KeyS", false, true, false).is_none());
}

#[test]
fn test_keycode_mapping() {
    assert_eq!(keycode_to_code(68).as_deref(), Some("KeyD"));
    assert_eq!(keycode_to_code(53).as_deref(), Some("Digit5"));
    assert_eq!(keycode_to_code(100).as_deref(), Some("Numpad4"));
    assert_eq!(keycode_to_code(115).as_deref(), Some("F4"));
    assert_eq!(keycode_to_code(37).as_deref(), Some("ArrowLeft"));
    assert_eq!(keycode_to_code(19).as_deref(), None);
}
