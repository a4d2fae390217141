use crate::dom::NodeId;

pub type Millis = u64;

/// How long a deferred batch may wait for an idle moment before it is
/// forced anyway.
pub const IDLE_TIMEOUT_MS: Millis = 1000;

/// One pending piece of scheduled work. Keys double as single-slot timer
/// identities: scheduling a key that is already pending either replaces
/// it (debounce) or leaves the original (defer), depending on the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKey {
    /// Drain and process the accumulated mutation records.
    MutationDrain,
    /// Re-hide an overlay that a blink made visible.
    BlinkHide(NodeId),
}

#[derive(Debug)]
struct Entry {
    key: SlotKey,
    due: Millis,
    seq: u64,
    /// Idle entries also fire the moment the thread goes idle, ahead of
    /// their deadline.
    idle: bool,
}

/// Cooperative single-threaded scheduler over a virtual clock. There is no
/// preemption anywhere in the engine, so "timers" are entries that fire
/// when the session pumps the clock past their deadline, in deadline then
/// FIFO order.
#[derive(Default)]
pub struct Scheduler {
    now: Millis,
    seq: u64,
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn pending(&self, key: SlotKey) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Schedules idle-priority work with the bounded deadline. A no-op if
    /// the key is already pending: new records do not push an existing
    /// drain further out, or a busy page could starve it forever.
    pub fn defer_idle(&mut self, key: SlotKey) {
        if self.pending(key) {
            return;
        }
        let due = self.now + IDLE_TIMEOUT_MS;
        self.push(key, due, true);
    }

    /// Single-slot timer with restart semantics: an already-pending entry
    /// for the key is cancelled before the new one is installed.
    pub fn debounce(&mut self, key: SlotKey, delay: Millis) {
        self.cancel(key);
        let due = self.now + delay;
        self.push(key, due, false);
    }

    pub fn cancel(&mut self, key: SlotKey) {
        self.entries.retain(|e| e.key != key);
    }

    /// Moves the clock forward and returns everything that came due, in
    /// (deadline, scheduling order).
    pub fn advance(&mut self, ms: Millis) -> Vec<SlotKey> {
        self.now += ms;
        self.take_due()
    }

    /// Entries due at the current clock, without moving it.
    pub fn take_due(&mut self) -> Vec<SlotKey> {
        let now = self.now;
        self.take_sorted(|e| e.due <= now)
    }

    /// The thread went idle: fire idle-priority entries immediately,
    /// plus anything already past due.
    pub fn go_idle(&mut self) -> Vec<SlotKey> {
        let now = self.now;
        self.take_sorted(|e| e.idle || e.due <= now)
    }

    fn push(&mut self, key: SlotKey, due: Millis, idle: bool) {
        let seq = self.seq;
        self.seq += 1;
        self.entries.push(Entry {
            key,
            due,
            seq,
            idle,
        });
    }

    fn take_sorted<F: Fn(&Entry) -> bool>(&mut self, select: F) -> Vec<SlotKey> {
        let mut fired: Vec<Entry> = Vec::new();
        let mut remaining: Vec<Entry> = Vec::new();
        for entry in self.entries.drain(..) {
            if select(&entry) {
                fired.push(entry);
            } else {
                remaining.push(entry);
            }
        }
        self.entries = remaining;
        fired.sort_by_key(|e| (e.due, e.seq));
        fired.into_iter().map(|e| e.key).collect()
    }
}

/// Single-slot suppression window for the rate-change feedback channel.
/// Restart-on-set; nothing ever blocks behind it.
#[derive(Debug, Default)]
pub struct Cooldown {
    until: Millis,
}

pub const RATE_EVENT_COOLDOWN_MS: Millis = 1000;

impl Cooldown {
    pub fn new() -> Self {
        Cooldown::default()
    }

    pub fn restart(&mut self, now: Millis) {
        self.until = now + RATE_EVENT_COOLDOWN_MS;
    }

    pub fn active(&self, now: Millis) -> bool {
        now < self.until
    }
}
