use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};

/// A scripted page session: the document URL plus an ordered list of
/// steps. Scenarios are what the driver binary replays and what
/// integration tests build their fixtures from. They stand in for the
/// host page mutating its own tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub url: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scripted operation. Node references are labels bound by earlier
/// `create`/`attachShadow`/`attachContent` steps; `document`, `html` and
/// `body` are always bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Create an element, optionally appending it and setting attributes.
    Create {
        label: String,
        tag: String,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        attrs: HashMap<String, String>,
    },
    /// Append (or reparent) an existing node.
    Append { node: String, parent: String },
    Remove { node: String },
    SetAttr { node: String, name: String, value: String },
    RemoveAttr { node: String, name: String },
    AttachShadow { host: String, label: String },
    /// Give an iframe a content document.
    AttachContent {
        iframe: String,
        label: String,
        #[serde(default = "default_true")]
        same_origin: bool,
    },
    /// Replace the document element (document.write-style rewrite).
    Rewrite,

    SetSource {
        node: String,
        #[serde(default)]
        url: Option<String>,
    },
    SetDuration { node: String, seconds: f64 },
    Play { node: String },
    Pause { node: String },
    /// A page script assigning playbackRate directly.
    SetRate { node: String, rate: f64 },
    Seek { node: String, time: f64 },
    SetIntersecting { node: String, value: bool },
    SetRect { node: String, x: f64, y: f64, width: f64, height: f64 },

    Key {
        code: String,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        alt: bool,
        #[serde(default)]
        target: Option<String>,
    },
    /// Click the overlay button carrying `data-action` for the controller
    /// attached to `media`.
    Click { media: String, action: String },
    PointerMove { x: f64, y: f64 },
    PointerUp,
    /// Inject an action without an originating event (system trigger).
    Dispatch {
        action: String,
        #[serde(default)]
        value: Option<f64>,
        #[serde(default)]
        value2: Option<f64>,
    },

    /// Deliver pending records/events to the engine (end of a microtask
    /// turn, before any idle time passes).
    Pump,
    /// Let the engine reach an idle point.
    Idle,
    /// Advance the clock, moving playback and firing due timers.
    Advance { ms: u64 },

    /// Flip runtime settings mid-session.
    UpdateSettings {
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        audio_enabled: Option<bool>,
        #[serde(default)]
        remember_speed: Option<bool>,
        #[serde(default)]
        force_last_saved_speed: Option<bool>,
        #[serde(default)]
        start_hidden: Option<bool>,
    },
}

fn default_true() -> bool {
    true
}

impl Scenario {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read scenario {}: {}", path.display(), e))?;
        Self::from_json(&content)
    }

    /// Built-in demo: a page that gains a video after load, plays it, gets
    /// a speed bump from the keyboard, then swaps the video out.
    pub fn demo() -> Self {
        let json = r#"{
          "url": "https://video.example.com/watch?v=demo",
          "steps": [
            { "op": "create", "label": "player", "tag": "div", "parent": "body" },
            { "op": "pump" }, { "op": "idle" },
            { "op": "create", "label": "vid", "tag": "video", "parent": "player",
              "attrs": { "src": "https://cdn.example.com/demo.mp4" } },
            { "op": "setDuration", "node": "vid", "seconds": 120 },
            { "op": "pump" }, { "op": "idle" },
            { "op": "play", "node": "vid" },
            { "op": "key", "code": "KeyD" },
            { "op": "key", "code": "KeyD" },
            { "op": "advance", "ms": 2000 },
            { "op": "key", "code": "KeyZ" },
            { "op": "remove", "node": "vid" },
            { "op": "pump" }, { "op": "idle" }
          ]
        }"#;
        Self::from_json(json).expect("built-in demo scenario is valid")
    }
}

/// Binds step labels to arena ids while a scenario runs. `document`,
/// `html` and `body` resolve against the live document so a rewrite
/// rebinds them automatically.
#[derive(Debug, Default)]
pub struct ScenarioContext {
    labels: HashMap<String, NodeId>,
}

impl ScenarioContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, label: &str, id: NodeId) {
        self.labels.insert(label.to_string(), id);
    }

    pub fn resolve(&self, doc: &Document, label: &str) -> anyhow::Result<NodeId> {
        match label {
            "document" => Ok(doc.document_node()),
            "html" => Ok(doc.document_element()),
            "body" => Ok(doc.body()),
            _ => self
                .labels
                .get(label)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("Unknown scenario label: {}", label)),
        }
    }
}
