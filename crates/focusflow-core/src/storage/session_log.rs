//! Append-only session log with observable queries.
//!
//! `SessionStore` is the persistence seam; `SessionLog` wraps a store and
//! keeps every query result on a `watch` channel, so views can hold a
//! receiver instead of polling. The store is read once up front; after that
//! each insert is folded into the cached results.

use std::sync::Arc;
use tokio::sync::watch;

use crate::error::Result;
use crate::session::SessionRecord;

/// Persistence backend for finished/aborted sessions.
pub trait SessionStore: Send + Sync {
    /// Append a record, returning its id.
    fn insert(&self, record: &SessionRecord) -> Result<i64>;
    /// Every record, newest start time first.
    fn all(&self) -> Result<Vec<SessionRecord>>;
    /// Records with `phase = FOCUS` and `completed`, newest first.
    fn completed_focus(&self) -> Result<Vec<SessionRecord>>;
    fn count_completed_focus(&self) -> Result<u64>;
    /// `None` when no completed focus session exists.
    fn sum_completed_focus_minutes(&self) -> Result<Option<u64>>;
}

struct Views {
    all: watch::Sender<Vec<SessionRecord>>,
    completed_focus: watch::Sender<Vec<SessionRecord>>,
    count: watch::Sender<u64>,
    sum: watch::Sender<Option<u64>>,
}

/// Observable view over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionLog {
    store: Arc<dyn SessionStore>,
    views: Arc<Views>,
}

impl SessionLog {
    /// Wrap `store`, loading the initial query results.
    ///
    /// # Errors
    /// Returns an error if the initial queries fail.
    pub fn new(store: Arc<dyn SessionStore>) -> Result<Self> {
        let views = Views {
            all: watch::channel(store.all()?).0,
            completed_focus: watch::channel(store.completed_focus()?).0,
            count: watch::channel(store.count_completed_focus()?).0,
            sum: watch::channel(store.sum_completed_focus_minutes()?).0,
        };
        Ok(Self {
            store,
            views: Arc::new(views),
        })
    }

    /// Append a record and publish it to the views it belongs to.
    ///
    /// # Errors
    /// Returns the store's error when the insert fails; views are left as they
    /// were.
    pub fn insert(&self, record: &SessionRecord) -> Result<i64> {
        let id = self.store.insert(record)?;
        let stored = SessionRecord {
            id: Some(id),
            ..record.clone()
        };
        self.fold(&stored);
        tracing::trace!(id, focus = stored.is_completed_focus(), "session views updated");
        Ok(id)
    }

    /// Merge one stored record into the cached results, newest start first.
    /// Aborted and break records leave the focus views untouched.
    fn fold(&self, stored: &SessionRecord) {
        let key = (stored.started_at, stored.id);
        let place = |rows: &mut Vec<SessionRecord>| {
            let at = rows.partition_point(|r| (r.started_at, r.id) > key);
            rows.insert(at, stored.clone());
        };

        self.views.all.send_modify(place);
        if stored.is_completed_focus() {
            self.views.completed_focus.send_modify(place);
            self.views.count.send_modify(|n| *n += 1);
            let minutes = u64::from(stored.duration_min);
            self.views
                .sum
                .send_modify(|sum| *sum = Some(sum.unwrap_or(0) + minutes));
        }
    }

    pub fn query_all(&self) -> watch::Receiver<Vec<SessionRecord>> {
        self.views.all.subscribe()
    }

    pub fn query_completed_focus(&self) -> watch::Receiver<Vec<SessionRecord>> {
        self.views.completed_focus.subscribe()
    }

    pub fn count_completed_focus(&self) -> watch::Receiver<u64> {
        self.views.count.subscribe()
    }

    pub fn sum_completed_focus_minutes(&self) -> watch::Receiver<Option<u64>> {
        self.views.sum.subscribe()
    }
}
