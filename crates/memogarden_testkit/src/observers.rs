//! Transaction observers for tests.
//!
//! Stores accept one observer; [`Observers`] fans out to several so a test
//! can record call order and inject faults at the same time.

use memogarden_storage::{StorageError, StorageResult, StoreKind, TxnEvent, TxnObserver};
use parking_lot::Mutex;
use std::sync::Arc;

/// One lifecycle statement a store completed or attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    /// Store the statement ran against.
    pub store: StoreKind,
    /// The statement.
    pub event: TxnEvent,
    /// Whether it succeeded.
    pub succeeded: bool,
}

/// Records every begin, commit and rollback, in order, across stores.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns everything recorded so far.
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    /// Returns the successful statements as `(store, event)` pairs.
    pub fn completed(&self) -> Vec<(StoreKind, TxnEvent)> {
        self.events
            .lock()
            .iter()
            .filter(|r| r.succeeded)
            .map(|r| (r.store, r.event))
            .collect()
    }

    /// Returns the position of the first successful `event` on `store`.
    pub fn position(&self, store: StoreKind, event: TxnEvent) -> Option<usize> {
        self.completed()
            .iter()
            .position(|&(s, e)| s == store && e == event)
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TxnObserver for RecordingObserver {
    fn after(&self, store: StoreKind, event: TxnEvent, succeeded: bool) {
        self.events.lock().push(Recorded {
            store,
            event,
            succeeded,
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    store: StoreKind,
    event: TxnEvent,
    remaining: Option<u32>,
}

/// Vetoes chosen lifecycle statements with [`StorageError::Injected`].
///
/// A vetoed commit behaves like a failed SQLite `COMMIT`, which is how the
/// integration tests simulate a crash between the two stores' commits.
#[derive(Debug, Default)]
pub struct FaultInjector {
    rules: Mutex<Vec<Rule>>,
    injected: Mutex<u32>,
}

impl FaultInjector {
    /// Creates an injector with no faults armed.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fails the next `event` on `store`.
    pub fn fail_once(&self, store: StoreKind, event: TxnEvent) {
        self.fail_times(store, event, 1);
    }

    /// Fails the next `times` occurrences of `event` on `store`.
    pub fn fail_times(&self, store: StoreKind, event: TxnEvent, times: u32) {
        if times == 0 {
            return;
        }
        self.rules.lock().push(Rule {
            store,
            event,
            remaining: Some(times),
        });
    }

    /// Fails every `event` on `store` until [`FaultInjector::clear`].
    pub fn fail_always(&self, store: StoreKind, event: TxnEvent) {
        self.rules.lock().push(Rule {
            store,
            event,
            remaining: None,
        });
    }

    /// Disarms every fault.
    pub fn clear(&self) {
        self.rules.lock().clear();
    }

    /// Returns how many statements were vetoed.
    pub fn injected(&self) -> u32 {
        *self.injected.lock()
    }
}

impl TxnObserver for FaultInjector {
    fn before(&self, store: StoreKind, event: TxnEvent) -> StorageResult<()> {
        let mut rules = self.rules.lock();
        let Some(index) = rules
            .iter()
            .position(|r| r.store == store && r.event == event)
        else {
            return Ok(());
        };
        if let Some(remaining) = rules[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                rules.remove(index);
            }
        }
        *self.injected.lock() += 1;
        Err(StorageError::Injected { store, event })
    }
}

/// Notifies several observers in order.
///
/// `before` stops at the first veto.
#[derive(Default, Clone)]
pub struct Observers(Vec<Arc<dyn TxnObserver>>);

impl Observers {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn TxnObserver>) -> Self {
        self.0.push(observer);
        self
    }
}

impl TxnObserver for Observers {
    fn before(&self, store: StoreKind, event: TxnEvent) -> StorageResult<()> {
        self.0.iter().try_for_each(|o| o.before(store, event))
    }

    fn after(&self, store: StoreKind, event: TxnEvent, succeeded: bool) {
        for observer in &self.0 {
            observer.after(store, event, succeeded);
        }
    }
}
