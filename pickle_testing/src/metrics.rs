//! Capture of metrics emitted through the `metrics` facade.
//!
//! `DebuggingRecorder` drains its counters on every snapshot, so take one
//! [`CounterValues`] per test and read every counter from it.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Creates a debugging recorder and the snapshotter that reads it.
#[must_use]
pub fn debugging_recorder() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Counters captured by a single snapshot.
#[derive(Clone, Debug, Default)]
pub struct CounterValues {
    counters: Vec<(String, Vec<(String, String)>, u64)>,
}

impl CounterValues {
    /// Take a snapshot and keep every counter it holds.
    #[must_use]
    pub fn capture(snapshotter: &Snapshotter) -> Self {
        let counters = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(c) => {
                    let labels = key
                        .key()
                        .labels()
                        .map(|l| (l.key().to_owned(), l.value().to_owned()))
                        .collect();
                    Some((key.key().name().to_owned(), labels, c))
                }
                _ => None,
            })
            .collect();
        Self { counters }
    }

    /// Sum of every counter named `name` whose labels include all of
    /// `labels`.
    #[must_use]
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .iter()
            .filter(|(counter, counter_labels, _)| {
                counter == name
                    && labels.iter().all(|(k, v)| {
                        counter_labels
                            .iter()
                            .any(|(lk, lv)| lk == k && lv == v)
                    })
            })
            .map(|(_, _, value)| value)
            .sum()
    }
}
