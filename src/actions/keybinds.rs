use crate::core::{KeyBinding, Settings};
use crate::dom::{Document, NodeId};

/// A physical key press as the page event layer reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub code: String,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl KeyPress {
    pub fn plain(code: &str) -> Self {
        KeyPress {
            code: code.to_string(),
            shift: false,
            ctrl: false,
            alt: false,
        }
    }
}

/// Resolves a key press against the configured bindings. Presses landing
/// in an editable element are dropped unless the matched binding is marked
/// `force`, so typing "s" into a comment box never slows the video down.
pub fn binding_for<'a>(
    settings: &'a Settings,
    press: &KeyPress,
    editable_target: bool,
) -> Option<&'a KeyBinding> {
    let binding = settings.find_binding(&press.code, press.shift, press.ctrl, press.alt)?;
    if editable_target && !binding.force {
        log::debug!("Key {} swallowed by editable target", press.code);
        return None;
    }
    Some(binding)
}

/// Whether key events targeting `node` belong to text entry. Covers the
/// form controls plus anything marked contenteditable.
pub fn is_editable(doc: &Document, node: NodeId) -> bool {
    let Some(n) = doc.try_node(node) else {
        return false;
    };
    if matches!(n.tag(), Some("input") | Some("textarea") | Some("select")) {
        return true;
    }
    n.attribute("contenteditable")
        .is_some_and(|value| !value.eq_ignore_ascii_case("false"))
}
