use crate::dom::{Document, NodeId};
use crate::overlay::{InsertMethod, InsertionPoint};
use crate::sites::segments::{NoSegments, SkipSegmentProvider};
use crate::sites::strategy::{ancestor_with_class, host_matches, SiteStrategy, TimeRange};

/// Fallback behavior: overlay before the media element, direct seeks,
/// nothing ignored.
pub struct DefaultStrategy;

impl SiteStrategy for DefaultStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn matches(&self, _hostname: &str) -> bool {
        false
    }
}

/// The player chrome lives in a positioned container; the overlay has to
/// sit inside it or it scrolls away from the video. Hover previews on
/// listing pages are not real playback surfaces and stay uncontrolled.
pub struct YouTubeStrategy {
    segments: Box<dyn SkipSegmentProvider>,
}

impl YouTubeStrategy {
    pub fn new() -> Self {
        YouTubeStrategy {
            segments: Box::new(NoSegments),
        }
    }
}

impl Default for YouTubeStrategy {
    fn default() -> Self {
        YouTubeStrategy::new()
    }
}

impl SiteStrategy for YouTubeStrategy {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, "youtube.com") || host_matches(hostname, "youtu.be")
    }

    fn insertion_point(&self, doc: &Document, media: NodeId, parent: NodeId) -> InsertionPoint {
        match ancestor_with_class(doc, media, "html5-video-player") {
            Some(container) => InsertionPoint {
                target: container,
                method: InsertMethod::FirstChild,
            },
            None => DefaultStrategy.insertion_point(doc, media, parent),
        }
    }

    fn should_ignore(&self, doc: &Document, media: NodeId) -> bool {
        ancestor_with_class(doc, media, "video-preview").is_some()
    }

    fn set_segment_provider(&mut self, provider: Box<dyn SkipSegmentProvider>) {
        self.segments = provider;
    }

    fn skip_segments(&mut self, source_url: &str) -> Vec<TimeRange> {
        match self.segments.segments_for(source_url) {
            Ok(segments) => segments,
            Err(e) => {
                log::warn!("Skip segment lookup failed for {}: {}", source_url, e);
                Vec::new()
            }
        }
    }
}

/// Seeking through currentTime desyncs this player; the seek goes through
/// the page's own player API instead, so the dispatcher must not also
/// assign the time.
pub struct NetflixStrategy;

impl SiteStrategy for NetflixStrategy {
    fn name(&self) -> &'static str {
        "netflix"
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, "netflix.com")
    }

    fn handle_seek(&self, doc: &mut Document, media: NodeId, delta: f64) -> bool {
        let Ok(state) = doc.media(media) else {
            return false;
        };
        let target = state.current_time + delta;
        if doc.set_current_time(media, target).is_err() {
            return false;
        }
        true
    }
}

/// Hover trailers on browse pages autoplay muted; controlling them just
/// produces flicker as they churn.
pub struct AmazonStrategy;

impl SiteStrategy for AmazonStrategy {
    fn name(&self) -> &'static str {
        "amazon"
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, "amazon.com") || host_matches(hostname, "primevideo.com")
    }

    fn should_ignore(&self, doc: &Document, media: NodeId) -> bool {
        ancestor_with_class(doc, media, "preview").is_some()
    }
}

/// The player stacks absolutely positioned layers; first-child placement
/// keeps the overlay above the scrub surface.
pub struct AppleTvStrategy;

impl SiteStrategy for AppleTvStrategy {
    fn name(&self) -> &'static str {
        "appletv"
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, "tv.apple.com")
    }

    fn insertion_point(&self, _doc: &Document, _media: NodeId, parent: NodeId) -> InsertionPoint {
        InsertionPoint {
            target: parent,
            method: InsertMethod::FirstChild,
        }
    }
}

/// The immediate parent clips overflow, which would crop the overlay; one
/// level up renders fine.
pub struct FacebookStrategy;

impl SiteStrategy for FacebookStrategy {
    fn name(&self) -> &'static str {
        "facebook"
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, "facebook.com")
    }

    fn insertion_point(&self, doc: &Document, media: NodeId, parent: NodeId) -> InsertionPoint {
        match doc.node(parent).parent {
            Some(grandparent) => InsertionPoint {
                target: grandparent,
                method: InsertMethod::Append,
            },
            None => DefaultStrategy.insertion_point(doc, media, parent),
        }
    }
}

/// Ordered lookup: first strategy whose host predicate matches wins, and
/// the default is always the fallback. Resolution happens once per
/// session; a document's hostname never changes in place, so the result
/// holds for the session's whole lifetime.
pub fn resolve(hostname: &str, segments: Box<dyn SkipSegmentProvider>) -> Box<dyn SiteStrategy> {
    let strategies: Vec<Box<dyn SiteStrategy>> = vec![
        Box::new(YouTubeStrategy::new()),
        Box::new(NetflixStrategy),
        Box::new(AmazonStrategy),
        Box::new(AppleTvStrategy),
        Box::new(FacebookStrategy),
    ];
    let mut segments = Some(segments);
    for mut strategy in strategies {
        if strategy.matches(hostname) {
            if let Some(provider) = segments.take() {
                strategy.set_segment_provider(provider);
            }
            log::debug!("Strategy {} selected for {}", strategy.name(), hostname);
            return strategy;
        }
    }
    log::debug!("No site strategy for {}, using default", hostname);
    Box::new(DefaultStrategy)
}
