use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dao::{Accessor, ResourceContext};
use crate::error::Result;
use crate::model::{EventKind, HeaderRow, NamespaceScope, ResourceKind, Row, RowEvent, TableData};
use crate::render::Renderer;

pub const DEFAULT_FLASH_WINDOW: Duration = Duration::from_millis(1500);

/// Diffs `rows` against `previous`. Rows deleted last time are forgotten;
/// rows missing now are reported as deleted exactly once.
pub fn reconcile(
    previous: Option<&TableData>,
    scope: &NamespaceScope,
    header: HeaderRow,
    rows: Vec<Row>,
) -> TableData {
    let previous = previous.filter(|table| table.namespace == *scope);
    let mut live: HashMap<&str, &Row> = previous
        .map(|table| {
            table
                .row_events
                .values()
                .filter(|event| event.kind != EventKind::Delete)
                .map(|event| (event.row.id.as_str(), &event.row))
                .collect()
        })
        .unwrap_or_default();

    let mut table = TableData::new(scope.clone(), header);
    for row in rows {
        let kind = match live.remove(row.id.as_str()) {
            Some(old) if old.fields == row.fields => EventKind::Unchanged,
            Some(_) => EventKind::Update,
            None => EventKind::Add,
        };
        table
            .row_events
            .insert(row.id.clone(), RowEvent::new(kind, row));
    }
    for (id, row) in live {
        table
            .row_events
            .insert(id.to_string(), RowEvent::new(EventKind::Delete, row.clone()));
    }
    table
}

pub struct Reconciler {
    kind: ResourceKind,
    scope: NamespaceScope,
    accessor: Arc<dyn Accessor>,
    renderer: Arc<dyn Renderer>,
    previous: Option<Arc<TableData>>,
}

impl Reconciler {
    pub fn new(
        kind: ResourceKind,
        scope: NamespaceScope,
        accessor: Arc<dyn Accessor>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let scope = kind.effective_scope(&scope);
        Self {
            kind,
            scope,
            accessor,
            renderer,
            previous: None,
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    pub fn snapshot(&self) -> Option<Arc<TableData>> {
        self.previous.clone()
    }

    pub fn set_scope(&mut self, scope: &NamespaceScope) {
        let scope = self.kind.effective_scope(scope);
        if scope != self.scope {
            self.scope = scope;
            self.previous = None;
        }
    }

    /// Fetches, renders and diffs once. On failure the previous snapshot is
    /// left untouched.
    pub async fn poll(&mut self, ctx: &ResourceContext) -> Result<Arc<TableData>> {
        let objects = self.accessor.list(ctx, &self.scope).await?;
        self.renderer.prepare(&objects);
        let header = self.renderer.header(&self.scope);
        let rows = objects
            .iter()
            .map(|object| self.renderer.render(object, &self.scope))
            .collect::<Result<Vec<_>>>()?;

        let table = Arc::new(reconcile(
            self.previous.as_deref(),
            &self.scope,
            header,
            rows,
        ));
        debug!(
            "{} in {}: {} rows",
            self.kind.title(),
            self.scope,
            table.len()
        );
        self.previous = Some(table.clone());
        Ok(table)
    }
}

/// Keeps fresh rows emphasized for a fixed duration after they show up,
/// across however many polls land inside that duration.
#[derive(Debug, Clone)]
pub struct FlashWindow {
    window: Duration,
    marks: HashMap<String, (EventKind, Instant)>,
}

impl Default for FlashWindow {
    fn default() -> Self {
        Self::new(DEFAULT_FLASH_WINDOW)
    }
}

impl FlashWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            marks: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn observe(&mut self, table: &TableData, now: Instant) {
        self.marks.retain(|id, _| {
            table
                .row_events
                .get(id)
                .is_some_and(|event| event.kind != EventKind::Delete)
        });
        for (id, event) in &table.row_events {
            if event.kind.is_fresh() {
                self.marks.insert(id.clone(), (event.kind, now));
            }
        }
    }

    /// Kind to present for `event`: a marked row keeps its fresh kind until
    /// the window has passed, deletions are shown as they are.
    pub fn presented(&self, event: &RowEvent, now: Instant) -> EventKind {
        if event.kind == EventKind::Delete {
            return event.kind;
        }
        match self.marks.get(&event.row.id) {
            Some((kind, mark)) if now.saturating_duration_since(*mark) < self.window => *kind,
            Some(_) => EventKind::Unchanged,
            None => event.kind,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PollFailure {
    pub title: String,
    pub message: String,
}

pub struct Poller {
    reconciler: Arc<Mutex<Reconciler>>,
    snapshots: watch::Receiver<Option<Arc<TableData>>>,
    period: watch::Sender<Duration>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

fn ticker(every: Duration) -> Interval {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl Poller {
    /// Polls `reconciler` every `every` until cancelled. A tick that fires
    /// while a poll is still running is skipped.
    pub fn spawn(
        reconciler: Reconciler,
        ctx: ResourceContext,
        every: Duration,
        failures: mpsc::UnboundedSender<PollFailure>,
    ) -> Self {
        let (tx, snapshots) = watch::channel(reconciler.snapshot());
        let reconciler = Arc::new(Mutex::new(reconciler));
        let cancel = ctx.cancel.child_token();
        let in_flight = Arc::new(AtomicBool::new(false));
        let (period, mut periods) = watch::channel(every);

        let task = {
            let reconciler = reconciler.clone();
            let cancel = cancel.clone();
            let ctx = ResourceContext {
                cancel: cancel.clone(),
                ..ctx
            };
            let tx = Arc::new(tx);
            tokio::spawn(async move {
                let mut ticks = ticker(every);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        changed = periods.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let every = *periods.borrow_and_update();
                            debug!("poll period now {every:?}");
                            ticks = ticker(every);
                            continue;
                        }
                        _ = ticks.tick() => {}
                    }
                    if in_flight.swap(true, Ordering::SeqCst) {
                        debug!("poll still in flight, skipping tick");
                        continue;
                    }

                    let reconciler = reconciler.clone();
                    let ctx = ctx.clone();
                    let tx = tx.clone();
                    let failures = failures.clone();
                    let in_flight = in_flight.clone();
                    tokio::spawn(async move {
                        let mut reconciler = reconciler.lock().await;
                        match reconciler.poll(&ctx).await {
                            Ok(table) => {
                                tx.send_replace(Some(table));
                            }
                            Err(error) => {
                                let title = reconciler.kind().title().to_string();
                                warn!("{title} poll failed: {error}");
                                let _ = failures.send(PollFailure {
                                    title,
                                    message: error.to_string(),
                                });
                            }
                        }
                        in_flight.store(false, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            reconciler,
            snapshots,
            period,
            cancel,
            task,
        }
    }

    pub fn set_period(&self, every: Duration) {
        self.period.send_if_modified(|current| {
            let changed = *current != every;
            *current = every;
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<TableData>>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Option<Arc<TableData>> {
        self.snapshots.borrow().clone()
    }

    pub fn reconciler(&self) -> &Arc<Mutex<Reconciler>> {
        &self.reconciler
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
