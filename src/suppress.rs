//! Key-sequence suppression.
//!
//! Registered sequences are compiled into a prefix trie of key tables. The
//! capture path keeps a cursor pointing at the table for the current position
//! in a sequence, so deciding whether a key is suppressed is one lookup in that
//! table plus one in the root, however many sequences exist.

use crate::error::{Error, Result};
use crate::event::{Direction, Event, KeyCode};
use crate::hook::{GrabHandler, Propagation};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Table = HashMap<KeyCode, Node>;

#[derive(Debug, Default)]
struct Node {
    /// Longest timeout of any sequence through this node, in seconds.
    timeout: f64,
    children: Arc<Table>,
}

fn seconds(timeout: Option<Duration>) -> f64 {
    match timeout {
        Some(t) if !t.is_zero() => t.as_secs_f64(),
        _ => f64::INFINITY,
    }
}

fn build(sequences: &[(Vec<KeyCode>, f64)]) -> Table {
    let mut root = Table::new();
    for (keys, timeout) in sequences {
        insert(&mut root, keys, *timeout);
    }
    root
}

fn insert(table: &mut Table, keys: &[KeyCode], timeout: f64) {
    let Some((first, rest)) = keys.split_first() else {
        return;
    };
    let node = table.entry(*first).or_default();
    node.timeout = node.timeout.max(timeout);
    if !rest.is_empty() {
        // Freshly built tables are never shared yet.
        if let Some(children) = Arc::get_mut(&mut node.children) {
            insert(children, rest, timeout);
        }
    }
}

struct Cursor {
    root: Arc<Table>,
    table: Arc<Table>,
    last_time: f64,
    depth: usize,
}

impl Cursor {
    fn reset(&mut self) {
        self.table = Arc::clone(&self.root);
        self.depth = 0;
    }
}

/// Prefix trie of suppressed key sequences.
pub struct SuppressionTable {
    sequences: Mutex<Vec<(Vec<KeyCode>, f64)>>,
    cursor: Mutex<Cursor>,
    /// Held keys and whether their press was suppressed.
    held: Mutex<HashMap<KeyCode, bool>>,
    #[cfg(test)]
    probes: AtomicUsize,
}

impl Default for SuppressionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SuppressionTable {
    /// Create an empty table; nothing is suppressed.
    pub fn new() -> Self {
        let root = Arc::new(Table::new());
        Self {
            sequences: Mutex::new(Vec::new()),
            cursor: Mutex::new(Cursor {
                table: Arc::clone(&root),
                root,
                last_time: 0.0,
                depth: 0,
            }),
            held: Mutex::new(HashMap::new()),
            #[cfg(test)]
            probes: AtomicUsize::new(0),
        }
    }

    /// Suppress `keys` typed in order, each within `timeout` of the previous.
    pub fn suppress_sequence(&self, keys: &[KeyCode], timeout: Option<Duration>) -> Result<()> {
        if keys.is_empty() {
            return Err(Error::InvalidSpec("empty suppression sequence".into()));
        }
        let mut sequences = self.sequences.lock();
        sequences.push((keys.to_vec(), seconds(timeout)));
        self.publish(build(&sequences));
        debug!("suppressing sequence {keys:?}");
        Ok(())
    }

    /// Remove one registration of `keys`.
    ///
    /// The trie is rebuilt from the remaining registrations, so shared
    /// prefixes keep their nodes and timeouts shrink back where possible.
    pub fn unsuppress_sequence(&self, keys: &[KeyCode]) -> Result<()> {
        let mut sequences = self.sequences.lock();
        let Some(index) = sequences.iter().position(|(existing, _)| existing == keys) else {
            return Err(Error::NotFound(format!("suppressed sequence {keys:?}")));
        };
        sequences.remove(index);
        self.publish(build(&sequences));
        debug!("unsuppressed sequence {keys:?}");
        Ok(())
    }

    /// Drop every sequence.
    pub fn suppress_none(&self) {
        let mut sequences = self.sequences.lock();
        sequences.clear();
        self.publish(Table::new());
    }

    /// Number of registered sequences.
    pub fn len(&self) -> usize {
        self.sequences.lock().len()
    }

    /// Check if no sequence is registered.
    pub fn is_empty(&self) -> bool {
        self.sequences.lock().is_empty()
    }

    fn publish(&self, root: Table) {
        let root = Arc::new(root);
        let mut cursor = self.cursor.lock();
        cursor.root = root;
        cursor.reset();
    }

    /// Decide whether `key` at `time` may pass.
    ///
    /// A key is suppressed when it continues the sequence in progress within
    /// the node's timeout, or when it starts any registered sequence. With
    /// `advance`, the cursor then moves into the matched node's children, or
    /// back to the root when the key did not continue the sequence or
    /// completed it.
    pub fn is_allowed(&self, key: KeyCode, time: f64, advance: bool) -> bool {
        let mut cursor = self.cursor.lock();
        let elapsed = if cursor.depth == 0 {
            0.0
        } else {
            time - cursor.last_time
        };

        let node = self.lookup(&cursor.table, key);
        let in_sequence = node.is_some_and(|node| elapsed < node.timeout);
        let suppressed = in_sequence || self.lookup(&cursor.root, key).is_some();

        if advance {
            match node {
                Some(node) if in_sequence && !node.children.is_empty() => {
                    let children = Arc::clone(&node.children);
                    cursor.table = children;
                    cursor.last_time = time;
                    cursor.depth += 1;
                }
                _ => cursor.reset(),
            }
        }
        !suppressed
    }

    fn lookup<'t>(&self, table: &'t Table, key: KeyCode) -> Option<&'t Node> {
        #[cfg(test)]
        self.probes.fetch_add(1, Ordering::Relaxed);
        table.get(&key)
    }

    #[cfg(test)]
    fn probes(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

/// The first press of a key advances the cursor; auto-repeat presses get the
/// same verdict without advancing. A release is suppressed exactly when its
/// press was, so overlapping keys never end up stuck down.
impl GrabHandler for SuppressionTable {
    fn handle_event(&self, event: &Event) -> Propagation {
        let Event::Key(key) = event else {
            return Propagation::Pass;
        };
        let mut held = self.held.lock();
        let suppressed = match key.direction {
            Direction::Down => match held.get(&key.code) {
                Some(suppressed) => *suppressed,
                None => {
                    let suppressed = !self.is_allowed(key.code, key.time, true);
                    held.insert(key.code, suppressed);
                    suppressed
                }
            },
            Direction::Up => held.remove(&key.code).unwrap_or(false),
        };
        Propagation::from(suppressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: KeyCode = KeyCode(1);
    const B: KeyCode = KeyCode(2);
    const C: KeyCode = KeyCode(3);
    const D: KeyCode = KeyCode(4);
    const X: KeyCode = KeyCode(9);

    fn secs(s: u64) -> Option<Duration> {
        Some(Duration::from_secs(s))
    }

    #[test]
    fn test_empty_table_allows_everything() {
        let table = SuppressionTable::new();
        assert!(table.is_allowed(A, 0.0, true));
        assert!(table.is_empty());
    }

    #[test]
    fn test_sequence_is_suppressed() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B], secs(1)).unwrap();

        assert!(!table.is_allowed(A, 0.0, true));
        assert!(!table.is_allowed(B, 0.5, true));
        // Completed: back at the root, B alone is not an entry point.
        assert!(table.is_allowed(B, 0.6, true));
        assert!(table.is_allowed(X, 0.7, true));
    }

    #[test]
    fn test_mismatch_resets_to_root() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B], secs(1)).unwrap();

        assert!(!table.is_allowed(A, 0.0, true));
        assert!(table.is_allowed(X, 0.1, true));
        assert!(table.is_allowed(B, 0.2, true));
    }

    #[test]
    fn test_check_without_advance_keeps_cursor() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B, C], None).unwrap();

        assert!(!table.is_allowed(A, 0.0, true));
        assert!(table.is_allowed(X, 0.1, false));
        assert!(!table.is_allowed(B, 0.2, true));
        assert!(!table.is_allowed(C, 0.3, true));
    }

    #[test]
    fn test_timeout_expires_sequence() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B], secs(1)).unwrap();

        assert!(!table.is_allowed(A, 0.0, true));
        assert!(table.is_allowed(B, 2.0, true));
    }

    #[test]
    fn test_heterogeneous_timeouts_along_shared_prefix() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B, C], secs(1)).unwrap();
        table.suppress_sequence(&[A, D], secs(5)).unwrap();

        // The slow branch keeps its own budget.
        assert!(!table.is_allowed(A, 0.0, true));
        assert!(!table.is_allowed(D, 3.0, true));

        // The fast branch does not inherit it.
        assert!(!table.is_allowed(A, 10.0, true));
        assert!(table.is_allowed(B, 13.0, true));

        // Each step is measured from the previous one, not from the start.
        assert!(!table.is_allowed(A, 20.0, true));
        assert!(!table.is_allowed(B, 20.9, true));
        assert!(!table.is_allowed(C, 21.8, true));
    }

    #[test]
    fn test_unsuppress_recomputes_timeouts() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B], secs(1)).unwrap();
        table.suppress_sequence(&[A, B, C], secs(10)).unwrap();
        table.unsuppress_sequence(&[A, B, C]).unwrap();

        assert!(!table.is_allowed(A, 0.0, true));
        assert!(table.is_allowed(B, 5.0, true));
        assert!(matches!(
            table.unsuppress_sequence(&[A, B, C]),
            Err(Error::NotFound(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_suppress_none() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A], None).unwrap();
        table.suppress_none();
        assert!(table.is_allowed(A, 0.0, true));
    }

    #[test]
    fn test_empty_sequence_is_invalid() {
        let table = SuppressionTable::new();
        assert!(matches!(
            table.suppress_sequence(&[], None),
            Err(Error::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_lookup_cost_is_independent_of_size() {
        let small = SuppressionTable::new();
        small.suppress_sequence(&[A, B], None).unwrap();

        let large = SuppressionTable::new();
        for i in 0..500u32 {
            let keys: Vec<KeyCode> = (0..4).map(|j| KeyCode(100 + i * 4 + j)).collect();
            large.suppress_sequence(&keys, None).unwrap();
        }
        large.suppress_sequence(&[A, B], None).unwrap();

        for table in [&small, &large] {
            assert!(!table.is_allowed(A, 0.0, true));
            assert!(!table.is_allowed(B, 0.1, true));
            assert!(table.is_allowed(X, 0.2, true));
        }
        assert_eq!(small.probes(), large.probes());
        // One lookup in the cursor's table and one in the root per key.
        assert_eq!(small.probes(), 6);

        // Deep inside a long sequence the cost stays the same.
        let deep = SuppressionTable::new();
        let keys: Vec<KeyCode> = (0..64).map(|j| KeyCode(1000 + j)).collect();
        deep.suppress_sequence(&keys, None).unwrap();
        for (i, key) in keys.iter().enumerate() {
            assert!(!deep.is_allowed(*key, i as f64, true));
        }
        assert_eq!(deep.probes(), 2 * keys.len());
    }

    fn down(code: KeyCode) -> Event {
        Event::Key(crate::event::KeyEvent::new(Direction::Down, code, "k", 0.0))
    }

    fn up(code: KeyCode) -> Event {
        Event::Key(crate::event::KeyEvent::new(Direction::Up, code, "k", 0.0))
    }

    #[test]
    fn test_handler_ignores_auto_repeat() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B], None).unwrap();

        assert_eq!(table.handle_event(&down(A)), Propagation::Suppress);
        assert_eq!(table.handle_event(&down(A)), Propagation::Suppress);
        assert_eq!(table.handle_event(&up(A)), Propagation::Suppress);
        assert_eq!(table.handle_event(&down(B)), Propagation::Suppress);
        assert_eq!(table.handle_event(&up(B)), Propagation::Suppress);
        assert_eq!(table.handle_event(&down(B)), Propagation::Pass);
        assert_eq!(table.handle_event(&up(B)), Propagation::Pass);
    }

    #[test]
    fn test_handler_rollover_keeps_press_and_release_paired() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A, B], None).unwrap();

        // Second key pressed before the first is released.
        assert_eq!(table.handle_event(&down(A)), Propagation::Suppress);
        assert_eq!(table.handle_event(&down(B)), Propagation::Suppress);
        assert_eq!(table.handle_event(&up(A)), Propagation::Suppress);
        assert_eq!(table.handle_event(&up(B)), Propagation::Suppress);

        // A key that got through is released through, even mid-sequence.
        assert_eq!(table.handle_event(&down(X)), Propagation::Pass);
        assert_eq!(table.handle_event(&down(A)), Propagation::Suppress);
        assert_eq!(table.handle_event(&up(X)), Propagation::Pass);
        assert_eq!(table.handle_event(&up(A)), Propagation::Suppress);
    }

    #[test]
    fn test_release_after_suppress_none_stays_suppressed() {
        let table = SuppressionTable::new();
        table.suppress_sequence(&[A], None).unwrap();
        assert_eq!(table.handle_event(&down(A)), Propagation::Suppress);
        table.suppress_none();
        assert_eq!(table.handle_event(&up(A)), Propagation::Suppress);
        assert_eq!(table.handle_event(&down(A)), Propagation::Pass);
    }
}
