use crate::core::{normalize_origin, KeyValueStore, Settings, SpeedMemory};
use crate::dom::{Document, NodeId};
use crate::engine::scheduler::{Cooldown, Scheduler, SlotKey};
use crate::overlay::{Controller, OverlayRenderer, Registry, RenderOptions};
use crate::sites::SiteStrategy;

/// The collaborators every engine call needs, borrowed from the session
/// for the duration of one operation. Keeps the call signatures flat and
/// the ownership with the session.
pub struct EngineCtx<'a> {
    pub settings: &'a Settings,
    pub store: &'a mut dyn KeyValueStore,
    pub speeds: &'a mut SpeedMemory,
    pub strategy: &'a mut dyn SiteStrategy,
    pub scheduler: &'a mut Scheduler,
    pub cooldown: &'a mut Cooldown,
}

/// Owns the registry and is the only component allowed to create or
/// destroy controllers. Everyone else submits candidates and trusts the
/// re-validation here.
pub struct LifecycleManager {
    pub registry: Registry,
    pub renderer: Box<dyn OverlayRenderer>,
}

impl LifecycleManager {
    pub fn new(renderer: Box<dyn OverlayRenderer>) -> Self {
        LifecycleManager {
            registry: Registry::new(),
            renderer,
        }
    }

    /// Candidate addition. No-op when the resource is already registered,
    /// fails eligibility, or is not (or no longer) part of the document.
    /// Returns whether a controller was created. A renderer failure is
    /// logged and reported as "not created"; the caller's batch goes on.
    pub fn add_resource(
        &mut self,
        doc: &mut Document,
        media: NodeId,
        parent: NodeId,
        ctx: &mut EngineCtx,
    ) -> bool {
        if self.registry.contains(media) {
            return false;
        }
        let Some(node) = doc.try_node(media) else {
            return false;
        };
        if !node.is_media() {
            return false;
        }
        if node.is_audio() && !ctx.settings.audio_enabled {
            return false;
        }
        if !doc.is_connected(media) {
            log::debug!("Candidate {} is detached, skipping", media);
            return false;
        }
        if ctx.strategy.should_ignore(doc, media) {
            log::debug!("Strategy {} ignores {}", ctx.strategy.name(), media);
            return false;
        }
        if !doc.has_media_source(media) {
            log::debug!("Candidate {} has no source, skipping", media);
            return false;
        }

        let source = doc.media_source_url(media).unwrap_or_default();
        let origin = normalize_origin(&source);
        let rate = ctx
            .speeds
            .preferred_rate(ctx.store, &origin, ctx.settings.remember_speed);

        let point = ctx.strategy.insertion_point(doc, media, parent);
        let start_hidden = ctx.settings.start_hidden || !doc.media_visible(media);
        let options = RenderOptions {
            opacity: ctx.settings.controller_opacity,
            start_hidden,
            initial_rate: rate,
        };
        let visual = match self.renderer.create(doc, media, point, &options) {
            Ok(visual) => visual,
            Err(e) => {
                log::error!("Controller creation failed for {}: {:#}", media, e);
                return false;
            }
        };

        let current = doc.media(media).map(|m| m.playback_rate).unwrap_or(1.0);
        if (current - rate).abs() > f64::EPSILON {
            // The rate-change event this fires is our own echo.
            ctx.cooldown.restart(ctx.scheduler.now());
            if let Err(e) = doc.set_playback_rate(media, rate) {
                log::warn!("Could not apply stored rate to {}: {}", media, e);
            }
        }

        let ordinal = self.registry.take_ordinal();
        let mut controller = Controller::new(media, visual, origin, ordinal);
        controller.hidden = start_hidden;
        controller.skip_segments = ctx.strategy.skip_segments(&source);
        log::info!("Attached {} to {} at rate {}", controller.id, media, rate);
        self.registry.insert(controller);
        true
    }

    /// Candidate removal. No-op when unregistered, or when the resource is
    /// still connected; removal records during reparenting name nodes
    /// that never actually left the document.
    pub fn remove_resource(
        &mut self,
        doc: &mut Document,
        media: NodeId,
        ctx: &mut EngineCtx,
    ) -> bool {
        if !self.registry.contains(media) {
            return false;
        }
        if doc.is_connected(media) {
            log::debug!("{} still connected, keeping its controller", media);
            return false;
        }
        self.destroy_entry(doc, media, ctx.scheduler);
        true
    }

    /// Teardown without the connectivity guard, for resources that became
    /// permanently ineligible or for full session teardown.
    pub fn force_remove(&mut self, doc: &mut Document, media: NodeId, scheduler: &mut Scheduler) -> bool {
        if !self.registry.contains(media) {
            return false;
        }
        self.destroy_entry(doc, media, scheduler);
        true
    }

    /// Sweeps out controllers whose eligibility a settings change revoked.
    /// Currently that is audio controllers after audio support is turned
    /// off.
    pub fn remove_ineligible(&mut self, doc: &mut Document, settings: &Settings, scheduler: &mut Scheduler) {
        if settings.audio_enabled {
            return;
        }
        let audio: Vec<NodeId> = self
            .registry
            .iter()
            .filter(|c| doc.try_node(c.media).is_some_and(|n| n.is_audio()))
            .map(|c| c.media)
            .collect();
        for media in audio {
            self.force_remove(doc, media, scheduler);
        }
    }

    /// Clears the registry entry-by-entry. Used on full page teardown.
    pub fn teardown_all(&mut self, doc: &mut Document, scheduler: &mut Scheduler) {
        for media in self.registry.media_ids() {
            self.force_remove(doc, media, scheduler);
        }
    }

    fn destroy_entry(&mut self, doc: &mut Document, media: NodeId, scheduler: &mut Scheduler) {
        let Some(controller) = self.registry.remove(media) else {
            return;
        };
        // Timers die with the controller; nothing else will cancel them.
        scheduler.cancel(SlotKey::BlinkHide(media));
        if let Err(e) = self.renderer.destroy(doc, controller.visual) {
            log::error!("Overlay teardown failed for {}: {:#}", controller.id, e);
        }
        log::info!("Detached {}", controller.id);
    }
}
