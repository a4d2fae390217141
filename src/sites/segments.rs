use std::collections::HashMap;

use crate::sites::strategy::TimeRange;

/// External lookup of skippable spans for a media source. Real providers
/// go over the network; callers must treat a failure as "no segments".
pub trait SkipSegmentProvider {
    fn segments_for(&mut self, source_url: &str) -> anyhow::Result<Vec<TimeRange>>;
}

/// Provider that knows nothing. The default wiring.
pub struct NoSegments;

impl SkipSegmentProvider for NoSegments {
    fn segments_for(&mut self, _source_url: &str) -> anyhow::Result<Vec<TimeRange>> {
        Ok(Vec::new())
    }
}

/// Fixed answers keyed by source URL, for scripted sessions and tests.
#[derive(Default)]
pub struct StaticSegments {
    entries: HashMap<String, Vec<TimeRange>>,
}

impl StaticSegments {
    pub fn new() -> Self {
        StaticSegments::default()
    }

    pub fn insert(&mut self, source_url: &str, segments: Vec<TimeRange>) {
        self.entries.insert(source_url.to_string(), segments);
    }
}

impl SkipSegmentProvider for StaticSegments {
    fn segments_for(&mut self, source_url: &str) -> anyhow::Result<Vec<TimeRange>> {
        Ok(self.entries.get(source_url).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
pub struct FailingSegments;

#[cfg(test)]
impl SkipSegmentProvider for FailingSegments {
    fn segments_for(&mut self, _source_url: &str) -> anyhow::Result<Vec<TimeRange>> {
        anyhow::bail!("segment service unreachable")
    }
}
