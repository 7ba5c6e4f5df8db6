//! Probe statistics.
//!
//! With the `stats` feature every [`HashTable`](crate::hash_table::HashTable)
//! carries its own counters: lookups, collisions along probe sequences,
//! rehashes, reinsertions during rehash and removals. Counters live in
//! [`Cell`](core::cell::Cell)s so that shared lookups can record, which makes
//! tables `!Sync` while the feature is on. Without the feature the recorder
//! is a zero-sized type whose hooks compile to nothing.

/// Number of bins in the collision histogram. Probe sequences longer than
/// this are counted in the last bin.
pub const COLLISION_GRAPH_LEN: usize = 64;

cfg_if::cfg_if! {
    if #[cfg(feature = "stats")] {
        use alloc::vec::Vec;
        use core::cell::Cell;

        #[derive(Debug)]
        pub(crate) struct StatsRecorder {
            accesses: Cell<u64>,
            collisions: Cell<u64>,
            max_collisions: Cell<u64>,
            rehashes: Cell<u64>,
            reinserts: Cell<u64>,
            removes: Cell<u64>,
            collision_graph: [Cell<u64>; COLLISION_GRAPH_LEN],
        }

        impl StatsRecorder {
            pub(crate) const fn new() -> Self {
                Self {
                    accesses: Cell::new(0),
                    collisions: Cell::new(0),
                    max_collisions: Cell::new(0),
                    rehashes: Cell::new(0),
                    reinserts: Cell::new(0),
                    removes: Cell::new(0),
                    collision_graph: [const { Cell::new(0) }; COLLISION_GRAPH_LEN],
                }
            }
        }

        #[inline(always)]
        fn bump(cell: &Cell<u64>) {
            cell.set(cell.get() + 1);
        }

        impl StatsRecorder {
            #[inline(always)]
            pub(crate) fn record_access(&self) {
                bump(&self.accesses);
            }

            /// `count` is the number of slots probed so far for the current
            /// access, starting at 1 for the first collision.
            #[inline(always)]
            pub(crate) fn record_collision(&self, count: usize) {
                let count = count as u64;
                bump(&self.collisions);
                if count > self.max_collisions.get() {
                    self.max_collisions.set(count);
                }
                let bin = (count as usize).min(COLLISION_GRAPH_LEN - 1);
                bump(&self.collision_graph[bin]);
            }

            #[inline(always)]
            pub(crate) fn record_rehash(&self) {
                bump(&self.rehashes);
            }

            #[inline(always)]
            pub(crate) fn record_reinsert(&self) {
                bump(&self.reinserts);
            }

            #[inline(always)]
            pub(crate) fn record_remove(&self) {
                bump(&self.removes);
            }

            pub(crate) fn snapshot(&self) -> TableStats {
                TableStats {
                    accesses: self.accesses.get(),
                    collisions: self.collisions.get(),
                    max_collisions: self.max_collisions.get(),
                    rehashes: self.rehashes.get(),
                    reinserts: self.reinserts.get(),
                    removes: self.removes.get(),
                    collision_graph: core::array::from_fn(|i| self.collision_graph[i].get()),
                }
            }
        }

        /// A snapshot of a table's counters, returned by
        /// [`HashTable::stats`](crate::hash_table::HashTable::stats).
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct TableStats {
            /// Number of lookups, including the lookups made by inserts and
            /// removals.
            pub accesses: u64,
            /// Total number of extra slots probed across all lookups.
            pub collisions: u64,
            /// Longest probe sequence observed.
            pub max_collisions: u64,
            /// Number of rehashes, in place or resizing.
            pub rehashes: u64,
            /// Number of values moved during rehashes.
            pub reinserts: u64,
            /// Number of removals.
            pub removes: u64,
            /// `collision_graph[n]` counts how many times a lookup probed its
            /// `n`th extra slot.
            pub collision_graph: [u64; COLLISION_GRAPH_LEN],
        }

        impl TableStats {
            /// Average number of extra slots probed per access.
            pub fn collisions_per_access(&self) -> f64 {
                if self.accesses == 0 {
                    0.0
                } else {
                    self.collisions as f64 / self.accesses as f64
                }
            }

            /// Pretty-print the counters to stdout.
            #[cfg(feature = "std")]
            pub fn print(&self) {
                println!("=== Hash Table Statistics ===");
                println!("{} accesses", self.accesses);
                println!(
                    "{} total collisions, average {:.2} probes per access",
                    self.collisions,
                    self.collisions_per_access()
                );
                println!("longest collision chain: {}", self.max_collisions);
                for (length, count) in self.collision_graph.iter().enumerate().skip(1) {
                    if *count != 0 {
                        println!("  {count} lookups with exactly {length} collisions");
                    }
                }
                println!(
                    "{} rehashes, {} reinserts, {} removes",
                    self.rehashes, self.reinserts, self.removes
                );
            }
        }

        /// Distribution of the current probe length of every live value,
        /// returned by
        /// [`HashTable::probe_histogram`](crate::hash_table::HashTable::probe_histogram).
        ///
        /// `counts[n]` is the number of values found after `n` collisions.
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct ProbeHistogram {
            /// Values per probe length.
            pub counts: Vec<usize>,
        }

        impl ProbeHistogram {
            pub(crate) fn record(&mut self, probe_length: usize) {
                if self.counts.len() <= probe_length {
                    self.counts.resize(probe_length + 1, 0);
                }
                self.counts[probe_length] += 1;
            }

            /// Number of values counted.
            pub fn total(&self) -> usize {
                self.counts.iter().sum()
            }

            /// Longest probe length of any value, or `None` for an empty table.
            pub fn max_probe_length(&self) -> Option<usize> {
                self.counts.iter().rposition(|&count| count != 0)
            }

            /// Pretty-prints the histogram as a horizontal bar chart.
            #[cfg(feature = "std")]
            pub fn print(&self) {
                let max = self.counts.iter().copied().max().unwrap_or(0);
                if max == 0 {
                    println!("probe histogram: empty");
                    return;
                }

                let max_bar = 60usize;
                println!("probe histogram ({} entries):", self.total());
                for (length, &count) in self.counts.iter().enumerate() {
                    let width = (count * max_bar).div_ceil(max);
                    println!("{length:>3} | {} ({count})", "█".repeat(width));
                }
            }
        }
    } else {
        #[derive(Debug)]
        pub(crate) struct StatsRecorder;

        impl StatsRecorder {
            pub(crate) const fn new() -> Self {
                Self
            }

            #[inline(always)]
            pub(crate) fn record_access(&self) {}

            #[inline(always)]
            pub(crate) fn record_collision(&self, _count: usize) {}

            #[inline(always)]
            pub(crate) fn record_rehash(&self) {}

            #[inline(always)]
            pub(crate) fn record_reinsert(&self) {}

            #[inline(always)]
            pub(crate) fn record_remove(&self) {}
        }
    }
}

#[cfg(all(test, feature = "stats"))]
mod tests {
    use super::*;

    #[test]
    fn recorder_tracks_collision_chains() {
        let recorder = StatsRecorder::new();
        recorder.record_access();
        recorder.record_collision(1);
        recorder.record_collision(2);
        recorder.record_access();
        recorder.record_collision(1);
        recorder.record_collision(COLLISION_GRAPH_LEN + 10);

        let stats = recorder.snapshot();
        assert_eq!(stats.accesses, 2);
        assert_eq!(stats.collisions, 4);
        assert_eq!(stats.max_collisions, COLLISION_GRAPH_LEN as u64 + 10);
        assert_eq!(stats.collision_graph[1], 2);
        assert_eq!(stats.collision_graph[2], 1);
        assert_eq!(stats.collision_graph[COLLISION_GRAPH_LEN - 1], 1);
        assert_eq!(stats.collisions_per_access(), 2.0);
    }

    #[test]
    fn histogram_grows_to_longest_probe() {
        let mut histogram = ProbeHistogram::default();
        assert_eq!(histogram.max_probe_length(), None);

        histogram.record(0);
        histogram.record(0);
        histogram.record(3);
        assert_eq!(histogram.counts, [2, 0, 0, 1]);
        assert_eq!(histogram.total(), 3);
        assert_eq!(histogram.max_probe_length(), Some(3));
    }
}
