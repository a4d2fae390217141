use tokio::sync::broadcast;
use url::Url;

use crate::actions::{binding_for, is_editable, Dispatcher, DragCoordinator, KeyPress};
use crate::core::{is_excluded, KeyValueStore, Settings, SpeedMemory};
use crate::dom::{Document, NodeId, Rect, Scenario, ScenarioContext, Step};
use crate::engine::lifecycle::{EngineCtx, LifecycleManager};
use crate::engine::scanner::scan;
use crate::engine::scheduler::{Cooldown, Scheduler, SlotKey};
use crate::engine::sync::drain_media_events;
use crate::engine::watcher::MutationWatcher;
use crate::overlay::{OverlayRenderer, Registry};
use crate::sites::{resolve, SiteStrategy, SkipSegmentProvider};

/// What the session announces to whoever is listening. The driver prints
/// these; tests assert on them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The page URL matched the blacklist; the session will stay dormant.
    Blacklisted,
    ControllerCreated { media: NodeId },
    ControllerDestroyed { media: NodeId },
    SpeedPersisted { speed: f64 },
    Reinitialized,
}

/// One engine instance bound to one document lifetime. Owns every engine
/// component; the document itself belongs to the host and is passed into
/// each call, the way a page owns its DOM and scripts merely visit it.
pub struct PageSession {
    settings: Settings,
    store: Box<dyn KeyValueStore>,
    speeds: SpeedMemory,
    strategy: Box<dyn SiteStrategy>,
    scheduler: Scheduler,
    cooldown: Cooldown,
    watcher: MutationWatcher,
    lifecycle: LifecycleManager,
    dispatcher: Dispatcher,
    drag: DragCoordinator,
    /// False when disabled or blacklisted; a dormant session drains and
    /// discards page activity instead of reacting to it.
    active: bool,
    last_pointer: (f64, f64),
    last_reported_speed: f64,
    events: broadcast::Sender<SessionEvent>,
}

/// Split borrows of the session's components, so the lifecycle manager,
/// watcher and dispatcher can be handed an `EngineCtx` built from the
/// sibling fields without fighting the borrow checker.
struct Parts<'a> {
    ctx: EngineCtx<'a>,
    lifecycle: &'a mut LifecycleManager,
    watcher: &'a mut MutationWatcher,
    dispatcher: &'a mut Dispatcher,
    drag: &'a mut DragCoordinator,
}

impl PageSession {
    pub fn new(
        doc: &mut Document,
        settings: Settings,
        mut store: Box<dyn KeyValueStore>,
        renderer: Box<dyn OverlayRenderer>,
        segments: Box<dyn SkipSegmentProvider>,
    ) -> (Self, broadcast::Receiver<SessionEvent>) {
        let (events, event_receiver) = broadcast::channel(32);

        let hostname = Url::parse(doc.url())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let strategy = resolve(&hostname, segments);

        let mut speeds = SpeedMemory::new();
        speeds.load(store.as_mut());
        let last_reported_speed = speeds.last_speed();

        let excluded = is_excluded(doc.url(), &settings.blacklist);
        let active = settings.enabled && !excluded;
        let fast_speed = settings.fast_speed();

        let mut session = PageSession {
            settings,
            store,
            speeds,
            strategy,
            scheduler: Scheduler::new(),
            cooldown: Cooldown::new(),
            watcher: MutationWatcher::new(),
            lifecycle: LifecycleManager::new(renderer),
            dispatcher: Dispatcher::new(fast_speed),
            drag: DragCoordinator::new(),
            active,
            last_pointer: (0.0, 0.0),
            last_reported_speed,
            events,
        };

        if session.active {
            let before = session.lifecycle.registry.media_ids();
            session.scan_document(doc);
            session.emit_registry_diff(before);
        } else if excluded {
            log::info!("Page {} is blacklisted, session dormant", doc.url());
            session.emit(SessionEvent::Blacklisted);
        } else {
            log::info!("Engine disabled, session dormant");
        }

        (session, event_receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.lifecycle.registry
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// End of a page microtask turn: pending mutation records become a
    /// deferred drain, native media events are reconciled immediately.
    pub fn pump(&mut self, doc: &mut Document) {
        if !self.active {
            doc.take_records();
            doc.take_media_events();
            return;
        }
        if doc.has_pending_records() {
            self.scheduler.defer_idle(SlotKey::MutationDrain);
        }
        self.drain_events(doc);
    }

    /// Moves virtual time: playback progresses, due timers fire, and the
    /// fallout is reconciled.
    pub fn advance(&mut self, doc: &mut Document, ms: u64) {
        doc.advance_playback(ms);
        let fired = self.scheduler.advance(ms);
        if !self.active {
            doc.take_media_events();
            return;
        }
        for key in fired {
            self.run_slot(doc, key);
        }
        self.drain_events(doc);
    }

    /// The thread went idle: deferred work runs now instead of waiting
    /// out its deadline.
    pub fn run_idle(&mut self, doc: &mut Document) {
        if !self.active {
            return;
        }
        let fired = self.scheduler.go_idle();
        for key in fired {
            self.run_slot(doc, key);
        }
        self.drain_events(doc);
    }

    /// A key press from the page. Returns whether any controller acted on
    /// it; an unbound key or a dormant session leaves the event to the
    /// page.
    pub fn handle_key(&mut self, doc: &mut Document, press: KeyPress, target: Option<NodeId>) -> bool {
        if !self.active {
            return false;
        }
        let editable = target.is_some_and(|t| is_editable(doc, t));
        let Some(binding) = binding_for(&self.settings, &press, editable).cloned() else {
            return false;
        };
        log::debug!("Key {} -> {}", press.code, binding.action);
        self.route_action(doc, &binding.action, binding.value, binding.value2, None) > 0
    }

    /// A click on one overlay's action button. The click pins the action
    /// to that controller alone.
    pub fn handle_click(&mut self, doc: &mut Document, media: NodeId, action: &str) -> bool {
        if !self.active {
            return false;
        }
        let Some(controller) = self.lifecycle.registry.get(media) else {
            log::debug!("Click on unregistered media {}", media);
            return false;
        };
        let origin = controller.visual.host;
        let (value, value2) = self
            .settings
            .binding_for_action(action)
            .map(|b| (b.value, b.value2))
            .unwrap_or((0.0, 0.0));
        self.route_action(doc, action, value, value2, Some(origin)) > 0
    }

    pub fn handle_pointer_move(&mut self, doc: &mut Document, x: f64, y: f64) {
        self.last_pointer = (x, y);
        if !self.drag.is_active() {
            return;
        }
        let p = self.parts();
        p.drag.pointer_move(doc, p.lifecycle.renderer.as_mut(), (x, y));
    }

    pub fn handle_pointer_up(&mut self) {
        if let Some(session) = self.drag.end() {
            log::debug!(
                "Drag on {} finished at {:.0},{:.0}",
                session.media,
                session.last.0,
                session.last.1
            );
        }
    }

    /// System-triggered action with no originating event; targets every
    /// registered controller.
    pub fn dispatch(&mut self, doc: &mut Document, action: &str, value: f64, value2: f64) -> usize {
        if !self.active {
            return 0;
        }
        self.route_action(doc, action, value, value2, None)
    }

    /// Swaps in new settings mid-session and reconciles: disabling tears
    /// everything down, enabling rescans, revoked eligibility is swept.
    pub fn update_settings(&mut self, doc: &mut Document, settings: Settings) {
        let was_active = self.active;
        let audio_was = self.settings.audio_enabled;
        self.settings = settings;
        self.active = self.settings.enabled && !is_excluded(doc.url(), &self.settings.blacklist);

        let before = self.lifecycle.registry.media_ids();
        if was_active && !self.active {
            self.lifecycle.teardown_all(doc, &mut self.scheduler);
            self.drag = DragCoordinator::new();
        } else if self.active && !was_active {
            self.scan_document(doc);
        } else if self.active {
            if audio_was && !self.settings.audio_enabled {
                self.lifecycle
                    .remove_ineligible(doc, &self.settings, &mut self.scheduler);
            }
            if !audio_was && self.settings.audio_enabled {
                self.scan_document(doc);
            }
        }
        self.emit_registry_diff(before);
    }

    /// Full page teardown, controller by controller.
    pub fn teardown(&mut self, doc: &mut Document) {
        let before = self.lifecycle.registry.media_ids();
        self.lifecycle.teardown_all(doc, &mut self.scheduler);
        self.scheduler.cancel(SlotKey::MutationDrain);
        doc.clear_observers();
        self.drag = DragCoordinator::new();
        self.active = false;
        self.emit_registry_diff(before);
    }

    // ---- Internals -------------------------------------------------------

    fn parts(&mut self) -> Parts<'_> {
        Parts {
            ctx: EngineCtx {
                settings: &self.settings,
                store: self.store.as_mut(),
                speeds: &mut self.speeds,
                strategy: self.strategy.as_mut(),
                scheduler: &mut self.scheduler,
                cooldown: &mut self.cooldown,
            },
            lifecycle: &mut self.lifecycle,
            watcher: &mut self.watcher,
            dispatcher: &mut self.dispatcher,
            drag: &mut self.drag,
        }
    }

    /// Bootstrap or rescan: observe the document, walk it, submit every
    /// find as a candidate. Observation is idempotent, so rescans are
    /// cheap to issue.
    fn scan_document(&mut self, doc: &mut Document) {
        let document_node = doc.document_node();
        let root = doc.document_element();
        let mut p = self.parts();
        p.watcher.observe(doc, document_node);
        let outcome = scan(doc, root, None, p.ctx.settings.audio_enabled);
        for &shadow in &outcome.shadow_roots {
            p.watcher.observe(doc, shadow);
        }
        for &(media, parent) in &outcome.media {
            p.lifecycle.add_resource(doc, media, parent, &mut p.ctx);
        }
    }

    fn run_slot(&mut self, doc: &mut Document, key: SlotKey) {
        match key {
            SlotKey::MutationDrain => {
                if self.process_mutations(doc) {
                    self.reinitialize(doc);
                }
            }
            SlotKey::BlinkHide(media) => {
                let p = self.parts();
                p.dispatcher.finish_blink(doc, p.lifecycle, media);
            }
        }
    }

    /// Drains and processes the record backlog. Returns true when the
    /// batch signalled a document replacement, which supersedes the rest
    /// of it.
    fn process_mutations(&mut self, doc: &mut Document) -> bool {
        let records = doc.take_records();
        if records.is_empty() {
            return false;
        }
        let before = self.lifecycle.registry.media_ids();
        {
            let mut p = self.parts();
            let outcome = p.watcher.process_batch(doc, &records, p.ctx.settings.audio_enabled);
            if outcome.reinit {
                return true;
            }
            for &shadow in &outcome.shadow_roots {
                p.watcher.observe(doc, shadow);
            }
            for &(media, parent) in &outcome.added {
                p.lifecycle.add_resource(doc, media, parent, &mut p.ctx);
            }
            for &media in &outcome.removed {
                if p.lifecycle.remove_resource(doc, media, &mut p.ctx) {
                    p.drag.cancel_for(media);
                }
            }
        }
        self.emit_registry_diff(before);
        false
    }

    /// Document-replacement handling: every piece of per-document state is
    /// rebuilt. The strategy is retained, as an in-place rewrite cannot
    /// change the hostname; navigation builds a whole new session.
    fn reinitialize(&mut self, doc: &mut Document) {
        log::info!("Reinitializing session for {}", doc.url());
        let before = self.lifecycle.registry.media_ids();
        doc.clear_observers();
        self.watcher.reset();
        self.scheduler.cancel(SlotKey::MutationDrain);
        self.lifecycle.teardown_all(doc, &mut self.scheduler);
        self.drag = DragCoordinator::new();
        for &media in &before {
            self.emit(SessionEvent::ControllerDestroyed { media });
        }

        self.active = self.settings.enabled && !is_excluded(doc.url(), &self.settings.blacklist);
        if self.active {
            self.scan_document(doc);
            for media in self.lifecycle.registry.media_ids() {
                self.emit(SessionEvent::ControllerCreated { media });
            }
        }
        self.emit(SessionEvent::Reinitialized);
    }

    fn drain_events(&mut self, doc: &mut Document) {
        let before = self.lifecycle.registry.media_ids();
        {
            let mut p = self.parts();
            drain_media_events(doc, p.lifecycle, &mut p.ctx);
        }
        self.emit_registry_diff(before);
        self.emit_speed_if_changed();
    }

    fn route_action(
        &mut self,
        doc: &mut Document,
        action: &str,
        value: f64,
        value2: f64,
        origin: Option<NodeId>,
    ) -> usize {
        if action == "drag" {
            return self.begin_drag(doc, origin);
        }
        let applied = {
            let mut p = self.parts();
            p.dispatcher
                .dispatch(doc, p.lifecycle, &mut p.ctx, action, value, value2, origin)
        };
        self.emit_speed_if_changed();
        applied
    }

    fn begin_drag(&mut self, doc: &mut Document, origin: Option<NodeId>) -> usize {
        let Some(target) = origin else {
            log::debug!("Drag without a pointer origin ignored");
            return 0;
        };
        let Some(media) = self.lifecycle.registry.media_for_event_target(doc, target) else {
            return 0;
        };
        let Some(controller) = self.lifecycle.registry.get(media) else {
            return 0;
        };
        if controller.suspended {
            return 0;
        }
        let visual = controller.visual;
        self.drag.begin(doc, media, visual, self.last_pointer);
        1
    }

    fn emit_registry_diff(&self, before: Vec<NodeId>) {
        let after = self.lifecycle.registry.media_ids();
        for &media in before.iter().filter(|m| !after.contains(m)) {
            self.emit(SessionEvent::ControllerDestroyed { media });
        }
        for &media in after.iter().filter(|m| !before.contains(m)) {
            self.emit(SessionEvent::ControllerCreated { media });
        }
    }

    fn emit_speed_if_changed(&mut self) {
        let speed = self.speeds.last_speed();
        if (speed - self.last_reported_speed).abs() > f64::EPSILON {
            self.last_reported_speed = speed;
            self.emit(SessionEvent::SpeedPersisted { speed });
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event.clone()).is_err() {
            log::debug!("No subscribers for {:?}", event);
        }
    }
}

// ---- Scenario replay -----------------------------------------------------

impl PageSession {
    /// Replays a whole scripted session against the document.
    pub fn replay(
        &mut self,
        doc: &mut Document,
        scenario: &Scenario,
    ) -> anyhow::Result<()> {
        let mut labels = ScenarioContext::new();
        for (index, step) in scenario.steps.iter().enumerate() {
            self.replay_step(doc, &mut labels, step)
                .map_err(|e| anyhow::anyhow!("Step {} failed: {}", index, e))?;
        }
        Ok(())
    }

    /// Applies one scripted step: document steps mutate the tree the way
    /// page scripts would, engine steps call the host-facing surface.
    pub fn replay_step(
        &mut self,
        doc: &mut Document,
        labels: &mut ScenarioContext,
        step: &Step,
    ) -> anyhow::Result<()> {
        match step {
            Step::Create { label, tag, parent, attrs } => {
                let id = doc.create_element(tag);
                labels.bind(label, id);
                let mut names: Vec<&String> = attrs.keys().collect();
                names.sort();
                for name in names {
                    doc.set_attribute(id, name, &attrs[name])?;
                }
                if let Some(parent) = parent {
                    let parent = labels.resolve(doc, parent)?;
                    doc.append_child(parent, id)?;
                }
            }
            Step::Append { node, parent } => {
                let node = labels.resolve(doc, node)?;
                let parent = labels.resolve(doc, parent)?;
                doc.append_child(parent, node)?;
            }
            Step::Remove { node } => {
                let node = labels.resolve(doc, node)?;
                doc.remove(node)?;
            }
            Step::SetAttr { node, name, value } => {
                let node = labels.resolve(doc, node)?;
                doc.set_attribute(node, name, value)?;
            }
            Step::RemoveAttr { node, name } => {
                let node = labels.resolve(doc, node)?;
                doc.remove_attribute(node, name)?;
            }
            Step::AttachShadow { host, label } => {
                let host = labels.resolve(doc, host)?;
                let shadow = doc.attach_shadow(host)?;
                labels.bind(label, shadow);
            }
            Step::AttachContent { iframe, label, same_origin } => {
                let iframe = labels.resolve(doc, iframe)?;
                let content = doc.attach_content_document(iframe, *same_origin)?;
                labels.bind(label, content);
            }
            Step::Rewrite => {
                doc.replace_document_element();
            }
            Step::SetSource { node, url } => {
                let node = labels.resolve(doc, node)?;
                doc.set_media_source(node, url.clone())?;
            }
            Step::SetDuration { node, seconds } => {
                let node = labels.resolve(doc, node)?;
                doc.set_media_duration(node, *seconds)?;
            }
            Step::Play { node } => {
                let node = labels.resolve(doc, node)?;
                doc.play(node)?;
            }
            Step::Pause { node } => {
                let node = labels.resolve(doc, node)?;
                doc.pause(node)?;
            }
            Step::SetRate { node, rate } => {
                let node = labels.resolve(doc, node)?;
                doc.set_playback_rate(node, *rate)?;
            }
            Step::Seek { node, time } => {
                let node = labels.resolve(doc, node)?;
                doc.set_current_time(node, *time)?;
            }
            Step::SetIntersecting { node, value } => {
                let node = labels.resolve(doc, node)?;
                doc.set_intersecting(node, *value)?;
            }
            Step::SetRect { node, x, y, width, height } => {
                let node = labels.resolve(doc, node)?;
                doc.set_media_rect(node, Rect::new(*x, *y, *width, *height))?;
            }
            Step::Key { code, shift, ctrl, alt, target } => {
                let target = match target {
                    Some(label) => Some(labels.resolve(doc, label)?),
                    None => None,
                };
                let press = KeyPress {
                    code: code.clone(),
                    shift: *shift,
                    ctrl: *ctrl,
                    alt: *alt,
                };
                self.handle_key(doc, press, target);
            }
            Step::Click { media, action } => {
                let media = labels.resolve(doc, media)?;
                self.handle_click(doc, media, action);
            }
            Step::PointerMove { x, y } => {
                self.handle_pointer_move(doc, *x, *y);
            }
            Step::PointerUp => {
                self.handle_pointer_up();
            }
            Step::Dispatch { action, value, value2 } => {
                self.dispatch(doc, action, value.unwrap_or(0.0), value2.unwrap_or(0.0));
            }
            Step::Pump => {
                self.pump(doc);
            }
            Step::Idle => {
                self.run_idle(doc);
            }
            Step::Advance { ms } => {
                self.advance(doc, *ms);
            }
            Step::UpdateSettings {
                enabled,
                audio_enabled,
                remember_speed,
                force_last_saved_speed,
                start_hidden,
            } => {
                let mut next = self.settings.clone();
                if let Some(v) = enabled {
                    next.enabled = *v;
                }
                if let Some(v) = audio_enabled {
                    next.audio_enabled = *v;
                }
                if let Some(v) = remember_speed {
                    next.remember_speed = *v;
                }
                if let Some(v) = force_last_saved_speed {
                    next.force_last_saved_speed = *v;
                }
                if let Some(v) = start_hidden {
                    next.start_hidden = *v;
                }
                self.update_settings(doc, next);
            }
        }
        Ok(())
    }
}
