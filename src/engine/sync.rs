use crate::core::normalize_origin;
use crate::dom::{Document, MediaEvent, MediaEventKind, NodeId};
use crate::engine::lifecycle::{EngineCtx, LifecycleManager};

/// Drains the document's queued media events through the synchronizer.
/// Handlers may queue follow-up events (our own rate writes do); those
/// wait for the next drain, where the cooldown window identifies them.
pub fn drain_media_events(
    doc: &mut Document,
    lifecycle: &mut LifecycleManager,
    ctx: &mut EngineCtx,
) -> usize {
    let events = doc.take_media_events();
    for event in &events {
        apply_media_event(doc, event, lifecycle, ctx);
    }
    events.len()
}

/// Reconciles one native media event with controller state. Events for
/// unregistered elements are dropped, except `loadstart`, which is how a
/// sourceless element that finally got a source becomes a candidate.
pub fn apply_media_event(
    doc: &mut Document,
    event: &MediaEvent,
    lifecycle: &mut LifecycleManager,
    ctx: &mut EngineCtx,
) {
    let media = event.target;
    match event.kind {
        MediaEventKind::RateChange { rate } => on_rate_change(doc, media, rate, lifecycle, ctx),
        MediaEventKind::LoadStart => on_load_start(doc, media, lifecycle, ctx),
        MediaEventKind::Emptied => on_emptied(doc, media, lifecycle),
        MediaEventKind::TimeUpdate { time } => on_time_update(doc, media, time, lifecycle),
        MediaEventKind::IntersectionChange { .. } => on_visibility(doc, media, lifecycle),
        MediaEventKind::VolumeChange { .. } | MediaEventKind::Play | MediaEventKind::Pause => {}
    }
}

fn on_rate_change(
    doc: &mut Document,
    media: NodeId,
    rate: f64,
    lifecycle: &mut LifecycleManager,
    ctx: &mut EngineCtx,
) {
    let Some(controller) = lifecycle.registry.get(media) else {
        return;
    };
    let now = ctx.scheduler.now();
    if ctx.cooldown.active(now) {
        log::debug!("Rate echo on {} suppressed", controller.id);
        return;
    }
    let origin = controller.origin.clone();
    let visual = controller.visual;

    if ctx.settings.force_last_saved_speed {
        let stored = ctx
            .speeds
            .recall(ctx.store, &origin)
            .unwrap_or(ctx.speeds.last_speed());
        if (stored - rate).abs() > f64::EPSILON {
            log::debug!("Forcing {} back from {} to stored {}", media, rate, stored);
            ctx.cooldown.restart(now);
            if let Err(e) = doc.set_playback_rate(media, stored) {
                log::warn!("Could not restore stored rate on {}: {}", media, e);
            }
        }
        lifecycle.renderer.set_rate(doc, visual, stored);
        return;
    }

    // A rate the page set on its own becomes the new truth.
    lifecycle.renderer.set_rate(doc, visual, rate);
    if let Err(e) = ctx.speeds.record(ctx.store, &origin, rate) {
        log::error!("Could not persist speed for {}: {:#}", origin, e);
    }
}

/// A `loadstart` either promotes an unregistered element to a candidate
/// or re-keys an existing controller to the new source.
fn on_load_start(
    doc: &mut Document,
    media: NodeId,
    lifecycle: &mut LifecycleManager,
    ctx: &mut EngineCtx,
) {
    if !lifecycle.registry.contains(media) {
        let Some(parent) = doc.try_node(media).and_then(|n| n.parent) else {
            return;
        };
        lifecycle.add_resource(doc, media, parent, ctx);
        return;
    }

    let Some(source) = doc.media_source_url(media) else {
        return;
    };
    let origin = normalize_origin(&source);
    let rate = ctx
        .speeds
        .preferred_rate(ctx.store, &origin, ctx.settings.remember_speed);
    let segments = ctx.strategy.skip_segments(&source);

    let Some(controller) = lifecycle.registry.get_mut(media) else {
        return;
    };
    if controller.origin != origin {
        log::debug!("{} re-keyed from {} to {}", controller.id, controller.origin, origin);
        controller.origin = origin;
    }
    controller.skip_segments = segments;
    let visual = controller.visual;
    let show = controller.hidden && !controller.manual && doc.media_visible(media);
    if show {
        controller.hidden = false;
    }

    let current = doc.media(media).map(|m| m.playback_rate).unwrap_or(1.0);
    if (current - rate).abs() > f64::EPSILON {
        ctx.cooldown.restart(ctx.scheduler.now());
        if let Err(e) = doc.set_playback_rate(media, rate) {
            log::warn!("Could not apply stored rate to {}: {}", media, e);
        }
    }
    lifecycle.renderer.set_rate(doc, visual, rate);
    if show {
        lifecycle.renderer.set_hidden(doc, visual, false);
    }
}

/// Source detached. The controller goes dormant but stays registered, so
/// the next `loadstart` reuses it instead of minting a new overlay.
fn on_emptied(doc: &mut Document, media: NodeId, lifecycle: &mut LifecycleManager) {
    let Some(controller) = lifecycle.registry.get_mut(media) else {
        return;
    };
    if controller.hidden {
        return;
    }
    controller.hidden = true;
    let visual = controller.visual;
    log::debug!("{} emptied, hiding its overlay", controller.id);
    lifecycle.renderer.set_hidden(doc, visual, true);
}

fn on_time_update(doc: &mut Document, media: NodeId, time: f64, lifecycle: &mut LifecycleManager) {
    let Some(controller) = lifecycle.registry.get(media) else {
        return;
    };
    let Some(segment) = controller
        .skip_segments
        .iter()
        .find(|s| s.contains(time))
        .copied()
    else {
        return;
    };
    log::debug!(
        "Skipping segment {:.2}-{:.2} on {}",
        segment.start,
        segment.end,
        controller.id
    );
    if let Err(e) = doc.set_current_time(media, segment.end) {
        log::warn!("Segment skip failed on {}: {}", media, e);
    }
}

/// Viewport visibility drives the hidden flag, unless the user pinned the
/// overlay with the display toggle.
fn on_visibility(doc: &mut Document, media: NodeId, lifecycle: &mut LifecycleManager) {
    let Some(controller) = lifecycle.registry.get_mut(media) else {
        return;
    };
    if controller.manual {
        return;
    }
    let hidden = !doc.media_visible(media);
    if controller.hidden == hidden {
        return;
    }
    controller.hidden = hidden;
    let visual = controller.visual;
    lifecycle.renderer.set_hidden(doc, visual, hidden);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::Rig;
    use crate::overlay::DomRenderer;
    use crate::sites::TimeRange;

    fn attached(doc: &mut Document, rig: &mut Rig) -> (LifecycleManager, NodeId) {
        let body = doc.body();
        let media = doc.create_element("video");
        doc.append_child(body, media).unwrap();
        doc.set_media_source(media, Some("https://cdn.example.com/v.mp4".into()))
            .unwrap();
        doc.set_media_duration(media, 100.0).unwrap();
        let mut lifecycle = LifecycleManager::new(Box::new(DomRenderer::new()));
        assert!(lifecycle.add_resource(doc, media, body, &mut rig.ctx()));
        doc.take_media_events();
        (lifecycle, media)
    }

    #[test]
    fn test_external_rate_change_is_persisted() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);

        doc.set_playback_rate(media, 2.0).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());

        assert_eq!(
            rig.speeds.recall(&mut rig.store, "https://cdn.example.com"),
            Some(2.0)
        );
        let indicator = lifecycle.registry.get(media).unwrap().visual.indicator;
        assert_eq!(doc.node(indicator).attribute("text"), Some("2.00"));
    }

    #[test]
    fn test_rate_echo_within_cooldown_ignored() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);

        rig.cooldown.restart(rig.scheduler.now());
        doc.set_playback_rate(media, 3.0).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());

        assert_eq!(rig.speeds.recall(&mut rig.store, "https://cdn.example.com"), None);
        assert_eq!(rig.speeds.last_speed(), 1.0);
    }

    #[test]
    fn test_rate_change_on_unregistered_media_ignored() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let media = doc.create_element("video");
        doc.append_child(body, media).unwrap();
        let mut rig = Rig::new();
        let mut lifecycle = LifecycleManager::new(Box::new(DomRenderer::new()));

        doc.set_playback_rate(media, 2.5).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert_eq!(rig.speeds.last_speed(), 1.0);
    }

    #[test]
    fn test_forced_speed_overrides_page_rate() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        rig.settings.remember_speed = true;
        rig.settings.force_last_saved_speed = true;
        rig.speeds
            .record(&mut rig.store, "https://cdn.example.com", 1.5)
            .unwrap();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);
        assert_eq!(doc.media(media).unwrap().playback_rate, 1.5);

        // Past the attach-time suppression window, the page fights back.
        rig.scheduler.advance(2000);
        doc.set_playback_rate(media, 2.0).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert_eq!(doc.media(media).unwrap().playback_rate, 1.5);

        // The correction's own echo dies in the refreshed window.
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert_eq!(doc.media(media).unwrap().playback_rate, 1.5);
    }

    #[test]
    fn test_load_start_promotes_unregistered_candidate() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let media = doc.create_element("video");
        doc.append_child(body, media).unwrap();
        let mut rig = Rig::new();
        let mut lifecycle = LifecycleManager::new(Box::new(DomRenderer::new()));
        assert!(!lifecycle.add_resource(&mut doc, media, body, &mut rig.ctx()));

        doc.set_media_source(media, Some("https://cdn.example.com/late.mp4".into()))
            .unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert!(lifecycle.registry.contains(media));
    }

    #[test]
    fn test_load_start_rekeys_existing_controller() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);
        assert_eq!(doc.media(media).unwrap().playback_rate, 1.0);

        rig.settings.remember_speed = true;
        rig.speeds
            .record(&mut rig.store, "https://other.example", 1.75)
            .unwrap();
        doc.set_media_source(media, Some("https://other.example/next.mp4".into()))
            .unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());

        let controller = lifecycle.registry.get(media).unwrap();
        assert_eq!(controller.origin, "https://other.example");
        assert_eq!(doc.media(media).unwrap().playback_rate, 1.75);
    }

    #[test]
    fn test_emptied_hides_without_destroying() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);

        doc.set_media_source(media, None).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());

        let controller = lifecycle.registry.get(media).unwrap();
        assert!(controller.hidden);
        assert_eq!(doc.node(controller.visual.host).attribute("hidden"), Some("true"));
        assert!(doc.is_connected(controller.visual.host));
    }

    #[test]
    fn test_reload_after_emptied_reuses_controller() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);
        let host = lifecycle.registry.get(media).unwrap().visual.host;

        doc.set_media_source(media, None).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        doc.set_media_source(media, Some("https://cdn.example.com/again.mp4".into()))
            .unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());

        let controller = lifecycle.registry.get(media).unwrap();
        assert_eq!(controller.visual.host, host);
        assert!(!controller.hidden);
        assert_eq!(doc.node(host).attribute("hidden"), None);
    }

    #[test]
    fn test_time_update_skips_marked_segment() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);
        lifecycle.registry.get_mut(media).unwrap().skip_segments =
            vec![TimeRange { start: 10.0, end: 20.0 }];

        doc.set_current_time(media, 12.0).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert_eq!(doc.media(media).unwrap().current_time, 20.0);

        // The jump's own time update lands outside the segment.
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert_eq!(doc.media(media).unwrap().current_time, 20.0);
    }

    #[test]
    fn test_visibility_loss_hides_overlay() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);

        doc.set_intersecting(media, false).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        let controller = lifecycle.registry.get(media).unwrap();
        assert!(controller.hidden);

        doc.set_intersecting(media, true).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert!(!lifecycle.registry.get(media).unwrap().hidden);
    }

    #[test]
    fn test_manual_visibility_wins_over_intersection() {
        let mut doc = Document::new("https://example.com/");
        let mut rig = Rig::new();
        let (mut lifecycle, media) = attached(&mut doc, &mut rig);
        lifecycle.registry.get_mut(media).unwrap().manual = true;

        doc.set_intersecting(media, false).unwrap();
        drain_media_events(&mut doc, &mut lifecycle, &mut rig.ctx());
        assert!(!lifecycle.registry.get(media).unwrap().hidden);
    }
}
