use std::collections::BTreeMap;

/// Per-frame statistics of the terrain pipeline.
///
/// Counters and the per-level tile histogram reset at every
/// [`Metrics::begin_frame`]; gauges hold their last value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    frame: u64,
    counters: BTreeMap<&'static str, u64>,
    gauges: BTreeMap<&'static str, i64>,
    levels: Vec<u64>,
}

/// Sorted copy of a [`Metrics`] for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frame: u64,
    pub counters: Vec<(&'static str, u64)>,
    pub gauges: Vec<(&'static str, i64)>,
    /// Tiles recorded per level, index = level.
    pub levels: Vec<u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.counters.clear();
        self.levels.clear();
    }

    /// Frames begun so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc_counter(&mut self, name: &'static str, by: u64) {
        *self.counters.entry(name).or_insert(0) += by;
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).copied()
    }

    pub fn set_gauge(&mut self, name: &'static str, value: i64) {
        self.gauges.insert(name, value);
    }

    pub fn record_level(&mut self, level: u32) {
        let idx = level as usize;
        if self.levels.len() <= idx {
            self.levels.resize(idx + 1, 0);
        }
        self.levels[idx] += 1;
    }

    pub fn level_counts(&self) -> &[u64] {
        &self.levels
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frame: self.frame,
            counters: self.counters.iter().map(|(k, v)| (*k, *v)).collect(),
            gauges: self.gauges.iter().map(|(k, v)| (*k, *v)).collect(),
            levels: self.levels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Metrics;

    #[test]
    fn frame_resets_counters_and_levels_only() {
        let mut m = Metrics::new();
        m.begin_frame();
        m.inc_counter("tiles.visited", 4);
        m.inc_counter("tiles.visited", 1);
        m.set_gauge("geometry.bytes", 1024);
        m.record_level(2);
        m.record_level(2);
        assert_eq!(m.counter("tiles.visited"), 5);
        assert_eq!(m.level_counts(), &[0, 0, 2]);

        m.begin_frame();
        assert_eq!(m.frame(), 2);
        assert_eq!(m.counter("tiles.visited"), 0);
        assert!(m.level_counts().is_empty());
        assert_eq!(m.gauge("geometry.bytes"), Some(1024));
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let mut m = Metrics::new();
        m.inc_counter("tiles.visited", 1);
        m.inc_counter("geometry.rebuilt", 2);
        m.set_gauge("mesh.tiles", 3);
        let snap = m.snapshot();
        assert_eq!(snap.counters, vec![("geometry.rebuilt", 2), ("tiles.visited", 1)]);
        assert_eq!(snap.gauges, vec![("mesh.tiles", 3)]);
    }
}
