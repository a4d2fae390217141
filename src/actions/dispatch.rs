use crate::dom::{Document, NodeId};
use crate::engine::{EngineCtx, LifecycleManager, SlotKey};

/// Native platform playback-rate limits. Every speed write goes through
/// these regardless of where the request came from.
pub const MIN_RATE: f64 = 0.0625;
pub const MAX_RATE: f64 = 16.0;

/// Absolute seek-step ceiling when a binding carries no explicit one.
pub const DEFAULT_SEEK_CAP_SECONDS: f64 = 5.0;

pub const DEFAULT_BLINK_MS: u64 = 1000;
const DEFAULT_VOLUME_STEP: f64 = 0.1;

const RATE_EPSILON: f64 = 1e-6;

pub fn clamp_rate(rate: f64) -> f64 {
    rate.clamp(MIN_RATE, MAX_RATE)
}

fn rates_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < RATE_EPSILON
}

/// The reset/fast toggle memory, shared across every controller in the
/// session. `last_manual_rate` is the remembered "reset" rate; it starts
/// at 1.0 and is overwritten whenever a toggle jumps away from a rate
/// that matches neither memory.
#[derive(Debug, Clone, Copy)]
pub struct SpeedToggle {
    pub last_manual_rate: f64,
    pub fast_rate: f64,
}

impl SpeedToggle {
    pub fn new(fast_rate: f64) -> Self {
        SpeedToggle {
            last_manual_rate: 1.0,
            fast_rate,
        }
    }

    /// Three-way toggle: at the remembered reset rate go fast, at the fast
    /// rate go back, anywhere else remember the current rate first and
    /// then jump to the requested target.
    pub fn next_rate(&mut self, current: f64, target: f64, is_fast: bool) -> f64 {
        if is_fast && target > 0.0 {
            self.fast_rate = target;
        }
        if rates_equal(current, self.last_manual_rate) {
            self.fast_rate
        } else if rates_equal(current, self.fast_rate) {
            self.last_manual_rate
        } else {
            self.last_manual_rate = current;
            target
        }
    }
}

/// Routes `(action, value, value2, origin?)` tuples to controllers. An
/// origin event pins the action to the one controller whose overlay hosts
/// the event target; without one, every registered controller is a target.
/// Suspended controllers are always skipped. Failures on one target never
/// roll back or block the others.
pub struct Dispatcher {
    pub toggle: SpeedToggle,
}

impl Dispatcher {
    pub fn new(fast_rate: f64) -> Self {
        Dispatcher {
            toggle: SpeedToggle::new(fast_rate),
        }
    }

    pub fn dispatch(
        &mut self,
        doc: &mut Document,
        lifecycle: &mut LifecycleManager,
        ctx: &mut EngineCtx,
        action: &str,
        value: f64,
        value2: f64,
        origin: Option<NodeId>,
    ) -> usize {
        let targets: Vec<NodeId> = match origin {
            Some(event_target) => lifecycle
                .registry
                .media_for_event_target(doc, event_target)
                .into_iter()
                .collect(),
            None => lifecycle.registry.media_ids(),
        };

        let mut applied = 0;
        for media in targets {
            let suspended = lifecycle
                .registry
                .get(media)
                .map(|c| c.suspended)
                .unwrap_or(true);
            if suspended {
                log::debug!("Skipping suspended controller on {}", media);
                continue;
            }
            if self.apply(doc, lifecycle, ctx, action, value, value2, media) {
                applied += 1;
            }
        }
        applied
    }

    fn apply(
        &mut self,
        doc: &mut Document,
        lifecycle: &mut LifecycleManager,
        ctx: &mut EngineCtx,
        action: &str,
        value: f64,
        value2: f64,
        media: NodeId,
    ) -> bool {
        let current_rate = match doc.media(media) {
            Ok(state) => state.playback_rate,
            Err(e) => {
                log::warn!("Action {} on non-media {}: {}", action, media, e);
                return false;
            }
        };

        match action {
            "faster" => {
                self.set_media_rate(doc, lifecycle, ctx, media, current_rate + value);
            }
            "slower" => {
                self.set_media_rate(doc, lifecycle, ctx, media, current_rate - value);
            }
            "rewind" => {
                self.seek(doc, ctx, media, value, value2, -1.0);
            }
            "advance" => {
                self.seek(doc, ctx, media, value, value2, 1.0);
            }
            "reset" => {
                let target = if value > 0.0 { value } else { 1.0 };
                let next = self.toggle.next_rate(current_rate, target, false);
                self.set_media_rate(doc, lifecycle, ctx, media, next);
            }
            "fast" => {
                let target = if value > 0.0 { value } else { self.toggle.fast_rate };
                let next = self.toggle.next_rate(current_rate, target, true);
                self.set_media_rate(doc, lifecycle, ctx, media, next);
            }
            "display" => {
                let Some(controller) = lifecycle.registry.get_mut(media) else {
                    return false;
                };
                controller.manual = !controller.manual;
                controller.hidden = !controller.hidden;
                let hidden = controller.hidden;
                let visual = controller.visual;
                lifecycle.renderer.set_hidden(doc, visual, hidden);
            }
            "blink" => {
                let Some(controller) = lifecycle.registry.get_mut(media) else {
                    return false;
                };
                if !controller.hidden && !controller.blinking {
                    return false;
                }
                controller.blinking = true;
                let visual = controller.visual;
                lifecycle.renderer.set_hidden(doc, visual, false);
                let duration = if value > 0.0 {
                    value as u64
                } else {
                    DEFAULT_BLINK_MS
                };
                // Restart, not queue: a second blink replaces the pending
                // hide outright.
                ctx.scheduler.debounce(SlotKey::BlinkHide(media), duration);
            }
            // "mute" is the name some callers send for the same toggle.
            "muted" | "mute" => {
                let muted = doc.media(media).map(|m| m.muted).unwrap_or(false);
                if let Err(e) = doc.set_muted(media, !muted) {
                    log::warn!("Mute toggle failed on {}: {}", media, e);
                    return false;
                }
            }
            "pause" => {
                let paused = doc.media(media).map(|m| m.paused).unwrap_or(false);
                let result = if paused {
                    doc.play(media)
                } else {
                    doc.pause(media)
                };
                if let Err(e) = result {
                    log::warn!("Pause toggle failed on {}: {}", media, e);
                    return false;
                }
            }
            "mark" => {
                let time = doc.media(media).map(|m| m.current_time).unwrap_or(0.0);
                let Some(controller) = lifecycle.registry.get_mut(media) else {
                    return false;
                };
                controller.marked_time = Some(time);
                log::debug!("Marked {} at {:.2}s", controller.id, time);
            }
            "jump" => {
                let marked = lifecycle.registry.get(media).and_then(|c| c.marked_time);
                let Some(time) = marked else {
                    return false;
                };
                if let Err(e) = doc.set_current_time(media, time) {
                    log::warn!("Jump failed on {}: {}", media, e);
                    return false;
                }
            }
            "louder" => {
                let step = if value > 0.0 { value } else { DEFAULT_VOLUME_STEP };
                return self.adjust_volume(doc, media, step);
            }
            "softer" => {
                let step = if value > 0.0 { value } else { DEFAULT_VOLUME_STEP };
                return self.adjust_volume(doc, media, -step);
            }
            other => {
                log::warn!("Unknown action {:?} ignored", other);
                return false;
            }
        }
        true
    }

    /// The one speed-write path: clamp, suppress the echo, set, update the
    /// readout, persist the record.
    fn set_media_rate(
        &mut self,
        doc: &mut Document,
        lifecycle: &mut LifecycleManager,
        ctx: &mut EngineCtx,
        media: NodeId,
        rate: f64,
    ) {
        let clamped = clamp_rate(rate);
        ctx.cooldown.restart(ctx.scheduler.now());
        if let Err(e) = doc.set_playback_rate(media, clamped) {
            log::warn!("Rate change failed on {}: {}", media, e);
            return;
        }
        let Some(controller) = lifecycle.registry.get(media) else {
            return;
        };
        let visual = controller.visual;
        let origin = controller.origin.clone();
        lifecycle.renderer.set_rate(doc, visual, clamped);
        if let Err(e) = ctx.speeds.record(ctx.store, &origin, clamped) {
            log::error!("Could not persist speed for {}: {:#}", origin, e);
        }
    }

    fn seek(
        &mut self,
        doc: &mut Document,
        ctx: &mut EngineCtx,
        media: NodeId,
        value: f64,
        value2: f64,
        direction: f64,
    ) {
        let duration = doc.media(media).map(|m| m.duration).unwrap_or(0.0);
        let cap = if value2 > 0.0 {
            value2
        } else {
            DEFAULT_SEEK_CAP_SECONDS
        };
        // Both ceilings bind: the absolute cap and the percent-of-duration
        // cap, whichever is smaller.
        let step = cap.min(value * duration / 100.0);
        let delta = step * direction;
        if ctx.strategy.handle_seek(doc, media, delta) {
            return;
        }
        let current = doc.media(media).map(|m| m.current_time).unwrap_or(0.0);
        if let Err(e) = doc.set_current_time(media, current + delta) {
            log::warn!("Seek failed on {}: {}", media, e);
        }
    }

    fn adjust_volume(&mut self, doc: &mut Document, media: NodeId, delta: f64) -> bool {
        let volume = match doc.media(media) {
            Ok(state) => state.volume,
            Err(_) => return false,
        };
        let next = (volume + delta).clamp(0.0, 1.0);
        match doc.set_volume(media, next) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Volume change failed on {}: {}", media, e);
                false
            }
        }
    }

    /// The scheduled end of a blink: re-hide, unless something already
    /// hid or removed the controller.
    pub fn finish_blink(
        &mut self,
        doc: &mut Document,
        lifecycle: &mut LifecycleManager,
        media: NodeId,
    ) {
        let Some(controller) = lifecycle.registry.get_mut(media) else {
            return;
        };
        if !controller.blinking {
            return;
        }
        controller.blinking = false;
        controller.hidden = true;
        let visual = controller.visual;
        lifecycle.renderer.set_hidden(doc, visual, true);
    }
}
