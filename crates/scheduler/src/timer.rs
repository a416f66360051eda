use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    generation: u64,
    interval: Duration,
}

/// A slot that came due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    pub rule_id: String,
    pub fire_at: Instant,
    pub interval: Duration,
}

/// Min-heap of next-fire times, one entry per scheduled rule.
///
/// Cancelling or rescheduling never touches the heap; it bumps the entry's
/// generation and stale heap items are discarded when they surface. Rules
/// whose poll is still running are tracked separately so a cancelled rule
/// that is re-added keeps its in-flight mark.
#[derive(Default)]
pub struct FireSchedule {
    heap: BinaryHeap<Reverse<(Instant, u64, String)>>,
    entries: HashMap<String, Entry>,
    in_flight: HashSet<String>,
    next_generation: u64,
}

impl FireSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.entries.contains_key(rule_id)
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Schedule (or move) a rule's next fire.
    pub fn schedule(&mut self, rule_id: &str, interval: Duration, fire_at: Instant) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries
            .insert(rule_id.to_string(), Entry { generation, interval });
        self.heap
            .push(Reverse((fire_at, generation, rule_id.to_string())));
    }

    pub fn cancel(&mut self, rule_id: &str) -> bool {
        self.entries.remove(rule_id).is_some()
    }

    /// Cancel every rule the predicate rejects; returns the cancelled ids.
    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut keep: F) -> Vec<String> {
        let dropped: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !keep(id.as_str()))
            .cloned()
            .collect();
        for id in &dropped {
            self.entries.remove(id);
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.heap.clear();
    }

    /// Earliest live fire time.
    pub fn next_due(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Removes and returns the earliest live slot if it is due at `now`.
    ///
    /// The rule stays scheduled in the sense of `contains`, but has no fire
    /// time until `schedule` is called again.
    pub fn pop_due(&mut self, now: Instant) -> Option<DueEntry> {
        self.discard_stale();
        let Reverse((fire_at, _, _)) = self.heap.peek()?;
        if *fire_at > now {
            return None;
        }
        let Reverse((fire_at, _, rule_id)) = self.heap.pop()?;
        let interval = self.entries.get(&rule_id)?.interval;
        Some(DueEntry { rule_id, fire_at, interval })
    }

    pub fn mark_in_flight(&mut self, rule_id: &str) {
        self.in_flight.insert(rule_id.to_string());
    }

    pub fn finish(&mut self, rule_id: &str) {
        self.in_flight.remove(rule_id);
    }

    pub fn is_in_flight(&self, rule_id: &str) -> bool {
        self.in_flight.contains(rule_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn discard_stale(&mut self) {
        loop {
            let stale = match self.heap.peek() {
                Some(Reverse((_, generation, rule_id))) => self
                    .entries
                    .get(rule_id)
                    .map_or(true, |entry| entry.generation != *generation),
                None => false,
            };
            if !stale {
                break;
            }
            self.heap.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_pops_in_fire_order() {
        let base = Instant::now();
        let mut schedule = FireSchedule::new();
        schedule.schedule("late", SEC, base + 3 * SEC);
        schedule.schedule("early", SEC, base + SEC);
        schedule.schedule("mid", SEC, base + 2 * SEC);

        assert_eq!(schedule.next_due(), Some(base + SEC));
        assert!(schedule.pop_due(base).is_none());

        let later = base + 10 * SEC;
        let order: Vec<String> = std::iter::from_fn(|| schedule.pop_due(later))
            .map(|d| d.rule_id)
            .collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
        assert_eq!(schedule.next_due(), None);
        // Popped rules are still known until cancelled
        assert_eq!(schedule.len(), 3);
    }

    #[test]
    fn test_cancel_is_lazy() {
        let base = Instant::now();
        let mut schedule = FireSchedule::new();
        schedule.schedule("a", SEC, base);
        schedule.schedule("b", SEC, base + SEC);

        assert!(schedule.cancel("a"));
        assert!(!schedule.cancel("a"));
        assert_eq!(schedule.next_due(), Some(base + SEC));
        assert_eq!(schedule.pop_due(base + SEC).unwrap().rule_id, "b");
    }

    #[test]
    fn test_reschedule_supersedes_old_slot() {
        let base = Instant::now();
        let mut schedule = FireSchedule::new();
        schedule.schedule("a", SEC, base);
        schedule.schedule("a", 2 * SEC, base + 5 * SEC);

        assert!(schedule.pop_due(base + SEC).is_none());
        let due = schedule.pop_due(base + 5 * SEC).unwrap();
        assert_eq!(due.interval, 2 * SEC);
        assert_eq!(due.fire_at, base + 5 * SEC);
    }

    #[test]
    fn test_retain_and_in_flight() {
        let base = Instant::now();
        let mut schedule = FireSchedule::new();
        schedule.schedule("keep", SEC, base);
        schedule.schedule("drop", SEC, base);
        schedule.mark_in_flight("drop");

        let dropped = schedule.retain(|id| id == "keep");
        assert_eq!(dropped, vec!["drop".to_string()]);
        assert!(!schedule.contains("drop"));
        // In-flight state outlives cancellation until the poll finishes
        assert!(schedule.is_in_flight("drop"));
        schedule.finish("drop");
        assert_eq!(schedule.in_flight_count(), 0);
        assert_eq!(schedule.rule_ids().collect::<Vec<_>>(), vec!["keep"]);
    }
}
