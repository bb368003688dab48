use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use skiff::app::{App, AppCommand, ClusterHeader};
use skiff::cli::CliArgs;
use skiff::client::{Connection, KubeGateway, LogOptions};
use skiff::cluster::ClusterInfo;
use skiff::config::{RuntimeConfigWatcher, Settings};
use skiff::dao::{Accessor, ResourceContext, accessor_for};
use skiff::forward::{ForwardExit, ForwardSpec, Forwarders, KubectlForwarder, PortSpec};
use skiff::model::{NamespaceScope, TableData};
use skiff::reconcile::{PollFailure, Poller, Reconciler};
use skiff::render::{Object, renderer_for};
use skiff::{export, input, ui};

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
type Snapshots = watch::Receiver<Option<Arc<TableData>>>;

const UI_TICK: Duration = Duration::from_millis(250);
const CLUSTER_METRICS_EVERY: u32 = 40;
const FORWARD_ADDRESS: &str = "localhost";
const LOG_TAIL_LINES: i64 = 200;
const LOG_BUFFER: usize = 256;

struct Subscription {
    accessor: Arc<dyn Accessor>,
    ctx: ResourceContext,
    poller: Poller,
    snapshots: Snapshots,
}

struct LogTail {
    cancel: CancellationToken,
    lines: mpsc::Receiver<String>,
}

impl Drop for LogTail {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let mut watcher = RuntimeConfigWatcher::discover();
    let config = watcher.load_current()?;
    let settings = Settings::resolve(args.refresh_ms, args.flash_ms, &config);

    let gateway = KubeGateway::new(args.context.clone()).await?;
    let conn: Arc<dyn Connection> = Arc::new(gateway);
    let info = ClusterInfo::new(conn.clone());

    if args.all_namespaces && args.namespace.is_some() {
        warn!("both --all-namespaces and --namespace were provided, using all namespaces");
    }
    let scope = resolve_namespace_scope(&args, conn.as_ref());
    let kind = config
        .resolve_kind(&args.kind)
        .with_context(|| format!("unknown resource kind '{}'", args.kind))?;

    let header = ClusterHeader {
        context: info.context_name(),
        cluster: info.cluster_name(),
        user: info.user_name(),
        version: info.version().await,
    };
    let mut app = App::new(header, scope, kind);
    app.set_config(config, settings.flash);

    run(&mut app, conn, &info, &mut watcher, &args, settings).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder.with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }

    Ok(())
}

fn resolve_namespace_scope(args: &CliArgs, conn: &dyn Connection) -> NamespaceScope {
    if args.all_namespaces {
        NamespaceScope::All
    } else if let Some(namespace) = &args.namespace {
        NamespaceScope::Named(namespace.clone())
    } else {
        conn.current_namespace()
            .map(NamespaceScope::Named)
            .unwrap_or(NamespaceScope::Named("default".to_string()))
    }
}

async fn run(
    app: &mut App,
    conn: Arc<dyn Connection>,
    info: &ClusterInfo,
    watcher: &mut RuntimeConfigWatcher,
    args: &CliArgs,
    settings: Settings,
) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, conn, info, watcher, args, settings).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

fn subscribe(
    app: &mut App,
    conn: &Arc<dyn Connection>,
    root: &CancellationToken,
    refresh: Duration,
    failures: &mpsc::UnboundedSender<PollFailure>,
) -> Result<Subscription> {
    let kind = app.kind().clone();
    let accessor = accessor_for(&kind, conn.clone())
        .with_context(|| format!("no accessor for {}", kind.title()))?;
    let renderer = renderer_for(&kind);
    app.set_colorer(renderer.colorer());

    let mut ctx = ResourceContext::new(root.child_token());
    if let Some(dir) = &app.config().benchmark_dir {
        ctx = ctx.with_dir(dir.clone());
    }
    let reconciler = Reconciler::new(kind, app.scope().clone(), accessor.clone(), renderer);
    let poller = Poller::spawn(reconciler, ctx.clone(), refresh, failures.clone());
    let snapshots = poller.subscribe();
    Ok(Subscription {
        accessor,
        ctx,
        poller,
        snapshots,
    })
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    conn: Arc<dyn Connection>,
    info: &ClusterInfo,
    watcher: &mut RuntimeConfigWatcher,
    args: &CliArgs,
    mut settings: Settings,
) -> Result<()> {
    let root = CancellationToken::new();
    let forwarders = Forwarders::new();
    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<PollFailure>();
    let (pf_tx, mut pf_rx) = mpsc::unbounded_channel::<ForwardExit>();

    let mut subscription = subscribe(app, &conn, &root, settings.refresh, &failure_tx)?;
    app.set_cluster_metrics(info.metrics().await);

    let mut reader = EventStream::new();
    let mut ticker = interval(UI_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0u32;
    let mut log_tail: Option<LogTail> = None;

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            if command == AppCommand::Subscribe {
                                subscription = subscribe(app, &conn, &root, settings.refresh, &failure_tx)?;
                            } else {
                                execute_app_command(
                                    app,
                                    &subscription,
                                    &forwarders,
                                    command,
                                    &pf_tx,
                                    &mut log_tail,
                                )
                                .await;
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            Ok(()) = subscription.snapshots.changed() => {
                let latest = subscription.snapshots.borrow_and_update().clone();
                if let Some(table) = latest {
                    app.set_table(table, Instant::now());
                }
            }
            line = next_log_line(&mut log_tail) => match line {
                Some(line) => app.push_detail_line(line),
                None => log_tail = None,
            },
            Some(failure) = failure_rx.recv() => {
                if failure.title == app.kind().title() {
                    app.set_status(format!("{} refresh failed: {}", failure.title, failure.message));
                }
            }
            Some(exit) = pf_rx.recv() => {
                let finished = forwarders
                    .get(&exit.key)
                    .is_some_and(|forwarder| !forwarder.active());
                let removed = finished && forwarders.stop(&exit.key);
                app.set_forwards(forwarders.len());
                match exit.result {
                    Ok(status) if status.success() => {
                        if removed {
                            app.set_status(format!("Port-forward closed: {}", exit.key));
                        }
                    }
                    Ok(status) => {
                        app.set_status(format!("Port-forward exited ({status}) for {}", exit.key));
                    }
                    Err(error) => {
                        app.set_status(format!("Port-forward failed for {}: {error}", exit.key));
                    }
                }
            }
            _ = ticker.tick() => {
                ticks = ticks.wrapping_add(1);
                if ticks % CLUSTER_METRICS_EVERY == 0 {
                    app.set_cluster_metrics(info.metrics().await);
                    reload_config(app, &subscription, watcher, args, &mut settings);
                }
            }
        }
    }

    subscription.poller.stop();
    root.cancel();
    let stopped = forwarders.delete_all();
    debug!("stopped {stopped} port-forwards on exit");
    Ok(())
}

fn reload_config(
    app: &mut App,
    subscription: &Subscription,
    watcher: &mut RuntimeConfigWatcher,
    args: &CliArgs,
    settings: &mut Settings,
) {
    match watcher.reload_if_changed() {
        Ok(Some(config)) => {
            *settings = Settings::resolve(args.refresh_ms, args.flash_ms, &config);
            subscription.poller.set_period(settings.refresh);
            let source = config.source.clone().unwrap_or_else(|| "defaults".to_string());
            app.set_config(config, settings.flash);
            app.set_status(format!("Runtime config reloaded from {source}"));
        }
        Ok(None) => {}
        Err(error) => {
            app.set_status(format!("Config reload failed: {}", compact_error(&error)));
        }
    }
}

async fn execute_app_command(
    app: &mut App,
    subscription: &Subscription,
    forwarders: &Forwarders,
    command: AppCommand,
    pf_tx: &mpsc::UnboundedSender<ForwardExit>,
    log_tail: &mut Option<LogTail>,
) {
    match command {
        AppCommand::None | AppCommand::Subscribe => {}
        AppCommand::Describe { path } => show_detail(app, subscription, &path, false).await,
        AppCommand::ShowYaml { path } => show_detail(app, subscription, &path, true).await,
        AppCommand::TailLogs { path } => {
            if subscription.accessor.as_loggable().is_none() {
                app.set_status(format!("{} have no logs", app.kind().title()));
                return;
            }
            app.open_detail(format!("Logs {path}"), "");
            *log_tail = Some(spawn_log_tail(subscription, path));
        }
        AppCommand::CloseDetail => {
            *log_tail = None;
        }
        AppCommand::Export => {
            let Some(table) = app.table().cloned() else {
                return;
            };
            let cluster = app.header().cluster.clone();
            let dump_dir = app.config().dump_dir();
            match export::save_table(&dump_dir, &cluster, app.kind().title(), "", &table) {
                Ok(path) => app.set_status(format!("Saved {}", path.display())),
                Err(error) => app.set_status(format!("Export failed: {error}")),
            }
        }
        AppCommand::PortForward { path } => {
            match start_port_forward(subscription, forwarders, &path, pf_tx).await {
                Ok(key) => app.set_status(format!("Port-forward started: {key}")),
                Err(error) => app.set_status(format!(
                    "Port-forward failed for {path}: {}",
                    compact_error(&error)
                )),
            }
            app.set_forwards(forwarders.len());
        }
        AppCommand::KillForwards { path } => {
            let stopped = forwarders.kill(&path);
            app.set_forwards(forwarders.len());
            app.set_status(format!("Stopped {stopped} port-forward(s) for {path}"));
        }
        AppCommand::DeleteSelected { kind, path } => {
            let Some(nuker) = subscription.accessor.as_nuker() else {
                app.set_status(format!("{} cannot be deleted", kind.title()));
                return;
            };
            match nuker.delete(&path, false, false).await {
                Ok(()) => app.set_status(format!("Deleted {} {path}", kind.title())),
                Err(error) => app.set_status(format!(
                    "Delete failed for {} {path}: {error}",
                    kind.title()
                )),
            }
        }
    }
}

async fn show_detail(app: &mut App, subscription: &Subscription, path: &str, yaml: bool) {
    let Some(describer) = subscription.accessor.as_describer() else {
        app.set_status(format!("{} cannot be described", app.kind().title()));
        return;
    };
    let (title, result) = if yaml {
        (format!("YAML {path}"), describer.to_yaml(path).await)
    } else {
        (format!("Describe {path}"), describer.describe(path).await)
    };
    match result {
        Ok(text) => app.open_detail(title, &text),
        Err(error) => app.set_status(format!("{title} failed: {error}")),
    }
}

fn spawn_log_tail(subscription: &Subscription, path: String) -> LogTail {
    let accessor = subscription.accessor.clone();
    let cancel = subscription.ctx.cancel.child_token();
    let ctx = ResourceContext::new(cancel.clone());
    let (tx, lines) = mpsc::channel(LOG_BUFFER);
    tokio::spawn(async move {
        let Some(loggable) = accessor.as_loggable() else {
            return;
        };
        let opts = LogOptions {
            path,
            tail_lines: Some(LOG_TAIL_LINES),
            follow: true,
            ..LogOptions::default()
        };
        if let Err(error) = loggable.tail_logs(&ctx, tx.clone(), opts).await {
            let _ = tx.send(format!("log stream failed: {error}")).await;
        }
    });
    LogTail { cancel, lines }
}

async fn next_log_line(tail: &mut Option<LogTail>) -> Option<String> {
    match tail {
        Some(tail) => tail.lines.recv().await,
        None => std::future::pending().await,
    }
}

/// Forwards the first declared port of the pod's first container to the
/// same local port.
async fn start_port_forward(
    subscription: &Subscription,
    forwarders: &Forwarders,
    path: &str,
    pf_tx: &mpsc::UnboundedSender<ForwardExit>,
) -> Result<String> {
    let object = subscription.accessor.get(&subscription.ctx, path).await?;
    let raw = match &object {
        Object::Pod(pod) => &pod.raw,
        other => anyhow::bail!("expected a pod, got {}", other.type_name()),
    };
    let container = raw
        .pointer("/spec/containers/0")
        .context("pod declares no containers")?;
    let port = container
        .pointer("/ports/0/containerPort")
        .and_then(Value::as_u64)
        .and_then(|port| u16::try_from(port).ok())
        .context("first container exposes no port")?;

    let spec = ForwardSpec {
        path: path.to_string(),
        container: container
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        address: FORWARD_ADDRESS.to_string(),
        ports: vec![PortSpec {
            local: port,
            remote: port,
        }],
    };
    let forwarder = KubectlForwarder::spawn(spec, pf_tx.clone())?;
    Ok(forwarders.start(Arc::new(forwarder)))
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}
