//! Section timing.
//!
//! Every section starts a measurement when it begins and stops it when it
//! ends. Measurements are keyed by the section identifier's joined form, so
//! nested sections with the same parts accumulate into one entry.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use grist_common::SectionId;
use parking_lot::Mutex;

/// Accumulated timing for one section name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureResult {
    /// Joined section identifier.
    pub name: String,
    /// Number of completed measurements.
    pub count: u32,
    /// Total elapsed time across all measurements.
    pub total: Duration,
}

/// Receives section start and end events.
pub trait TimeMeasure: Send + Sync {
    /// Starts timing `id`.
    fn start(&self, id: &SectionId);
    /// Stops the most recent timing of `id`.
    fn end(&self, id: &SectionId);
    /// Returns accumulated results ordered by name.
    fn results(&self) -> Vec<MeasureResult>;
}

/// A measure that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMeasure;

impl TimeMeasure for NullMeasure {
    fn start(&self, _id: &SectionId) {}
    fn end(&self, _id: &SectionId) {}
    fn results(&self) -> Vec<MeasureResult> {
        Vec::new()
    }
}

#[derive(Default)]
struct MeasureState {
    open: HashMap<String, Vec<Instant>>,
    totals: BTreeMap<String, (u32, Duration)>,
}

/// Thread-safe accumulator of section timings.
#[derive(Default)]
pub struct RecordingMeasure {
    state: Mutex<MeasureState>,
}

impl RecordingMeasure {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed measurements for the exact name.
    pub fn count(&self, name: &str) -> u32 {
        self.state
            .lock()
            .totals
            .get(name)
            .map(|(count, _)| *count)
            .unwrap_or(0)
    }

    /// Number of completed measurements whose name contains `fragment` as a
    /// whole `.`-separated part sequence.
    pub fn count_matching(&self, fragment: &str) -> u32 {
        let state = self.state.lock();
        state
            .totals
            .iter()
            .filter(|(name, _)| contains_parts(name, fragment))
            .map(|(_, (count, _))| *count)
            .sum()
    }

    /// Clears all recorded measurements.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.open.clear();
        state.totals.clear();
    }
}

fn contains_parts(name: &str, fragment: &str) -> bool {
    let name_parts: Vec<&str> = name.split('.').collect();
    let fragment_parts: Vec<&str> = fragment.split('.').collect();
    name_parts
        .windows(fragment_parts.len())
        .any(|w| w == fragment_parts.as_slice())
}

impl TimeMeasure for RecordingMeasure {
    fn start(&self, id: &SectionId) {
        self.state
            .lock()
            .open
            .entry(id.to_string())
            .or_default()
            .push(Instant::now());
    }

    fn end(&self, id: &SectionId) {
        let name = id.to_string();
        let mut state = self.state.lock();
        let Some(started) = state.open.get_mut(&name).and_then(Vec::pop) else {
            return;
        };
        let entry = state.totals.entry(name).or_insert((0, Duration::ZERO));
        entry.0 += 1;
        entry.1 += started.elapsed();
    }

    fn results(&self) -> Vec<MeasureResult> {
        self.state
            .lock()
            .totals
            .iter()
            .map(|(name, (count, total))| MeasureResult {
                name: name.clone(),
                count: *count,
                total: *total,
            })
            .collect()
    }
}
