use crate::config::RuntimeConfigSnapshot;
use crate::input::Action;
use crate::metrics::ClusterMetrics;
use crate::model::{EventKind, HeaderRow, NamespaceScope, ResourceKind, RowEvent, TableData};
use crate::reconcile::FlashWindow;
use crate::render::{ColorerFn, default_colorer};
use chrono::Local;
use ratatui::style::Color;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    Subscribe,
    Export,
    PortForward { path: String },
    KillForwards { path: String },
    DeleteSelected { kind: ResourceKind, path: String },
    Describe { path: String },
    ShowYaml { path: String },
    TailLogs { path: String },
    CloseDetail,
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    prompt: String,
    command: AppCommand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub id: String,
    pub kind: EventKind,
    pub color: Color,
    pub cells: Vec<String>,
}

/// Scrollable text shown over the table: describe output, YAML or logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPane {
    pub title: String,
    pub lines: Vec<String>,
    pub scroll: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterHeader {
    pub context: String,
    pub cluster: String,
    pub user: String,
    pub version: String,
}

pub struct App {
    header: ClusterHeader,
    cluster_metrics: Option<ClusterMetrics>,
    scope: NamespaceScope,
    kind: ResourceKind,
    colorer: ColorerFn,
    table: Option<Arc<TableData>>,
    flash: FlashWindow,
    selected: usize,
    mode: InputMode,
    input: String,
    status: String,
    running: bool,
    pending_confirmation: Option<PendingConfirmation>,
    config: RuntimeConfigSnapshot,
    forwards: usize,
    detail: Option<DetailPane>,
}

impl App {
    pub fn new(header: ClusterHeader, scope: NamespaceScope, kind: ResourceKind) -> Self {
        let scope = kind.effective_scope(&scope);
        Self {
            header,
            cluster_metrics: None,
            scope,
            kind,
            colorer: default_colorer,
            table: None,
            flash: FlashWindow::default(),
            selected: 0,
            mode: InputMode::Normal,
            input: String::new(),
            status: "Ready".to_string(),
            running: true,
            pending_confirmation: None,
            config: RuntimeConfigSnapshot::default(),
            forwards: 0,
            detail: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn header(&self) -> &ClusterHeader {
        &self.header
    }

    pub fn set_header(&mut self, header: ClusterHeader) {
        self.header = header;
    }

    pub fn cluster_metrics(&self) -> Option<&ClusterMetrics> {
        self.cluster_metrics.as_ref()
    }

    pub fn set_cluster_metrics(&mut self, metrics: Option<ClusterMetrics>) {
        self.cluster_metrics = metrics;
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn config(&self) -> &RuntimeConfigSnapshot {
        &self.config
    }

    /// Installs a (re)loaded config. `flash` is the already resolved window;
    /// rows currently flashing keep their marks.
    pub fn set_config(&mut self, config: RuntimeConfigSnapshot, flash: Duration) {
        self.flash.set_window(flash);
        self.config = config;
    }

    pub fn set_colorer(&mut self, colorer: ColorerFn) {
        self.colorer = colorer;
    }

    pub fn forwards(&self) -> usize {
        self.forwards
    }

    pub fn set_forwards(&mut self, count: usize) {
        self.forwards = count;
    }

    pub fn detail(&self) -> Option<&DetailPane> {
        self.detail.as_ref()
    }

    pub fn open_detail(&mut self, title: impl Into<String>, text: &str) {
        self.detail = Some(DetailPane {
            title: title.into(),
            lines: text.lines().map(str::to_string).collect(),
            scroll: 0,
        });
    }

    /// Appends a streamed line. A pane scrolled to its last line follows.
    pub fn push_detail_line(&mut self, line: String) {
        let Some(detail) = self.detail.as_mut() else {
            return;
        };
        let following = detail.scroll + 1 >= detail.lines.len();
        detail.lines.push(line);
        if following {
            detail.scroll = detail.lines.len() - 1;
        }
    }

    pub fn table(&self) -> Option<&Arc<TableData>> {
        self.table.as_ref()
    }

    pub fn set_table(&mut self, table: Arc<TableData>, now: Instant) {
        self.flash.observe(&table, now);
        self.table = Some(table);
        self.clamp_selection();
        self.status = format!(
            "{} refreshed at {}",
            self.kind.title(),
            Local::now().format("%H:%M:%S")
        );
    }

    pub fn table_header(&self) -> HeaderRow {
        self.table
            .as_ref()
            .map(|table| table.header.clone())
            .unwrap_or_default()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.table
            .as_ref()
            .filter(|table| !table.is_empty())
            .map(|_| self.selected)
    }

    pub fn selected_id(&self) -> Option<String> {
        let table = self.table.as_ref()?;
        table
            .sorted_events()
            .get(self.selected)
            .map(|event| event.row.id.clone())
    }

    pub fn display_rows(&self, now: Instant) -> Vec<DisplayRow> {
        let Some(table) = self.table.as_ref() else {
            return Vec::new();
        };
        table
            .sorted_events()
            .into_iter()
            .map(|event| {
                let kind = self.flash.presented(event, now);
                let presented = RowEvent::new(kind, event.row.clone());
                let cells = event
                    .row
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(index, value)| match table.header.0.get(index) {
                        Some(header) => header.display(value),
                        None => value.clone(),
                    })
                    .collect();
                DisplayRow {
                    id: event.row.id.clone(),
                    kind,
                    color: (self.colorer)(&table.namespace, &presented),
                    cells,
                }
            })
            .collect()
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if let Some(pending) = self.pending_confirmation.take() {
            match action {
                Action::ConfirmYes => {
                    self.status = format!("Confirmed: {}", pending.prompt);
                    return pending.command;
                }
                Action::ConfirmNo | Action::CancelInput => {
                    self.status = "Action cancelled".to_string();
                    return AppCommand::None;
                }
                _ => {
                    self.pending_confirmation = Some(pending);
                    self.status =
                        "Pending confirmation: press y to confirm or n to cancel".to_string();
                    return AppCommand::None;
                }
            }
        }

        if self.detail.is_some() && action != Action::Quit {
            return self.apply_detail_action(action);
        }

        match action {
            Action::Quit => {
                self.running = false;
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            Action::Down => {
                self.move_selection(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_selection(-1);
                AppCommand::None
            }
            Action::Top => {
                self.selected = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.selected = self.row_count().saturating_sub(1);
                AppCommand::None
            }
            Action::StartCommand => {
                self.mode = InputMode::Command;
                self.input.clear();
                AppCommand::None
            }
            Action::AllNamespaces => self.switch_scope(NamespaceScope::All),
            Action::Export => {
                if self.table.is_none() {
                    self.status = "Nothing to export yet".to_string();
                    return AppCommand::None;
                }
                AppCommand::Export
            }
            Action::PortForward => {
                if self.kind != ResourceKind::Pods {
                    self.status = "Port-forward is only available for pods".to_string();
                    return AppCommand::None;
                }
                match self.selected_id() {
                    Some(path) => AppCommand::PortForward { path },
                    None => {
                        self.status = "No pod selected".to_string();
                        AppCommand::None
                    }
                }
            }
            Action::KillForwards => match self.selected_id() {
                Some(path) => AppCommand::KillForwards { path },
                None => AppCommand::None,
            },
            Action::DeleteSelected => self.request_delete(),
            Action::Describe => self.selected_path().map_or(AppCommand::None, |path| {
                AppCommand::Describe { path }
            }),
            Action::ShowYaml => self.selected_path().map_or(AppCommand::None, |path| {
                AppCommand::ShowYaml { path }
            }),
            Action::Logs => {
                if self.kind != ResourceKind::Pods {
                    self.status = "Logs are only available for pods".to_string();
                    return AppCommand::None;
                }
                self.selected_path()
                    .map_or(AppCommand::None, |path| AppCommand::TailLogs { path })
            }
            Action::SubmitInput => self.submit_input(),
            Action::CancelInput => {
                self.mode = InputMode::Normal;
                self.input.clear();
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                AppCommand::None
            }
            Action::InputChar(c) => {
                self.input.push(c);
                AppCommand::None
            }
            Action::ConfirmYes | Action::ConfirmNo => AppCommand::None,
        }
    }

    pub fn pending_confirmation_prompt(&self) -> Option<&str> {
        self.pending_confirmation
            .as_ref()
            .map(|pending| pending.prompt.as_str())
    }

    fn apply_detail_action(&mut self, action: Action) -> AppCommand {
        let Some(detail) = self.detail.as_mut() else {
            return AppCommand::None;
        };
        let last = detail.lines.len().saturating_sub(1);
        match action {
            Action::Down => detail.scroll = (detail.scroll + 1).min(last),
            Action::Up => detail.scroll = detail.scroll.saturating_sub(1),
            Action::Top => detail.scroll = 0,
            Action::Bottom => detail.scroll = last,
            Action::ConfirmNo | Action::CancelInput => {
                self.detail = None;
                return AppCommand::CloseDetail;
            }
            _ => {}
        }
        AppCommand::None
    }

    fn selected_path(&mut self) -> Option<String> {
        let path = self.selected_id();
        if path.is_none() {
            self.status = "Nothing selected".to_string();
        }
        path
    }

    fn request_delete(&mut self) -> AppCommand {
        let Some(path) = self.selected_path() else {
            return AppCommand::None;
        };
        let prompt = format!("Delete {} {}", self.kind.title(), path);
        self.pending_confirmation = Some(PendingConfirmation {
            prompt: prompt.clone(),
            command: AppCommand::DeleteSelected {
                kind: self.kind.clone(),
                path,
            },
        });
        self.status = format!("{prompt}? (y/n)");
        AppCommand::None
    }

    fn submit_input(&mut self) -> AppCommand {
        let line = self.input.trim().to_string();
        self.mode = InputMode::Normal;
        self.input.clear();
        self.execute_command_line(&line)
    }

    fn execute_command_line(&mut self, line: &str) -> AppCommand {
        let mut parts = line.split_whitespace();
        let Some(token) = parts.next() else {
            self.status = "No command entered".to_string();
            return AppCommand::None;
        };

        match (token, parts.next()) {
            ("q" | "quit" | "exit", _) => {
                self.running = false;
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            ("ns" | "namespace", Some(namespace)) => {
                self.switch_scope(NamespaceScope::Named(namespace.to_string()))
            }
            (token, _) => match self.config.resolve_kind(token) {
                Some(kind) => self.switch_kind(kind),
                None => {
                    self.status = format!("Unknown resource '{token}'");
                    AppCommand::None
                }
            },
        }
    }

    fn switch_kind(&mut self, kind: ResourceKind) -> AppCommand {
        self.scope = match (&self.scope, kind.is_namespaced()) {
            (NamespaceScope::Cluster, true) => NamespaceScope::All,
            (scope, _) => kind.effective_scope(scope),
        };
        self.kind = kind;
        self.reset_table();
        self.status = format!("Viewing {} in {}", self.kind.title(), self.scope);
        AppCommand::Subscribe
    }

    fn switch_scope(&mut self, scope: NamespaceScope) -> AppCommand {
        if !self.kind.is_namespaced() {
            self.status = format!("{} are cluster scoped", self.kind.title());
            return AppCommand::None;
        }
        if scope == self.scope {
            return AppCommand::None;
        }
        self.scope = scope;
        self.reset_table();
        self.status = format!("Viewing {} in {}", self.kind.title(), self.scope);
        AppCommand::Subscribe
    }

    fn reset_table(&mut self) {
        self.table = None;
        self.selected = 0;
    }

    fn row_count(&self) -> usize {
        self.table.as_ref().map(|table| table.len()).unwrap_or(0)
    }

    fn move_selection(&mut self, offset: isize) {
        let count = self.row_count();
        if count == 0 {
            self.selected = 0;
            return;
        }
        self.selected = self
            .selected
            .saturating_add_signed(offset)
            .min(count.saturating_sub(1));
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.row_count().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppCommand, ClusterHeader, InputMode};
    use crate::input::Action;
    use crate::model::{
        EventKind, Header, HeaderRow, NamespaceScope, ResourceKind, Row, RowEvent, TableData,
    };
    use crate::config::RuntimeConfigSnapshot;
    use crate::render::{ADD_COLOR, STD_COLOR, default_colorer};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn app() -> App {
        App::new(
            ClusterHeader::default(),
            NamespaceScope::Named("default".to_string()),
            ResourceKind::Pods,
        )
    }

    fn table(ids: &[&str]) -> Arc<TableData> {
        let mut table = TableData::new(
            NamespaceScope::Named("default".to_string()),
            HeaderRow(vec![Header::new("NAME")]),
        );
        for id in ids {
            table.row_events.insert(
                id.to_string(),
                RowEvent::new(EventKind::Add, Row::new(*id, vec![id.to_string()])),
            );
        }
        Arc::new(table)
    }

    fn type_command(app: &mut App, line: &str) -> AppCommand {
        app.apply_action(Action::StartCommand);
        assert_eq!(app.mode(), InputMode::Command);
        for c in line.chars() {
            app.apply_action(Action::InputChar(c));
        }
        app.apply_action(Action::SubmitInput)
    }

    #[test]
    fn kind_token_switches_subscription() {
        let mut app = app();
        let cmd = type_command(&mut app, "dp");
        assert_eq!(cmd, AppCommand::Subscribe);
        assert_eq!(app.kind(), &ResourceKind::Deployments);
        assert_eq!(app.scope(), &NamespaceScope::Named("default".to_string()));

        let cmd = type_command(&mut app, "no");
        assert_eq!(cmd, AppCommand::Subscribe);
        assert_eq!(app.scope(), &NamespaceScope::Cluster);

        let cmd = type_command(&mut app, "po");
        assert_eq!(cmd, AppCommand::Subscribe);
        assert_eq!(app.scope(), &NamespaceScope::All);
    }

    #[test]
    fn unknown_token_reports_status() {
        let mut app = app();
        assert_eq!(type_command(&mut app, "bogus"), AppCommand::None);
        assert!(app.status().contains("Unknown resource"));
    }

    #[test]
    fn zero_selects_all_namespaces_once() {
        let mut app = app();
        assert_eq!(app.apply_action(Action::AllNamespaces), AppCommand::Subscribe);
        assert_eq!(app.scope(), &NamespaceScope::All);
        assert_eq!(app.apply_action(Action::AllNamespaces), AppCommand::None);
    }

    #[test]
    fn delete_requires_confirmation() {
        let mut app = app();
        app.set_table(table(&["default/a", "default/b"]), Instant::now());
        app.apply_action(Action::Down);

        assert_eq!(app.apply_action(Action::DeleteSelected), AppCommand::None);
        assert_eq!(
            app.pending_confirmation_prompt(),
            Some("Delete Pods default/b")
        );
        assert_eq!(
            app.apply_action(Action::ConfirmYes),
            AppCommand::DeleteSelected {
                kind: ResourceKind::Pods,
                path: "default/b".to_string()
            }
        );

        app.apply_action(Action::DeleteSelected);
        assert_eq!(app.apply_action(Action::ConfirmNo), AppCommand::None);
        assert_eq!(app.pending_confirmation_prompt(), None);
    }

    #[test]
    fn port_forward_only_targets_pods() {
        let mut app = app();
        app.set_table(table(&["default/web"]), Instant::now());
        assert_eq!(
            app.apply_action(Action::PortForward),
            AppCommand::PortForward {
                path: "default/web".to_string()
            }
        );

        type_command(&mut app, "svc");
        app.set_table(table(&["default/web"]), Instant::now());
        assert_eq!(app.apply_action(Action::PortForward), AppCommand::None);
        assert_eq!(
            app.apply_action(Action::KillForwards),
            AppCommand::KillForwards {
                path: "default/web".to_string()
            }
        );
    }

    #[test]
    fn selection_is_clamped_to_new_snapshots() {
        let mut app = app();
        app.set_table(table(&["default/a", "default/b", "default/c"]), Instant::now());
        app.apply_action(Action::Bottom);
        assert_eq!(app.selected_id(), Some("default/c".to_string()));
        app.set_table(table(&["default/a"]), Instant::now());
        assert_eq!(app.selected_index(), Some(0));
    }

    #[test]
    fn display_rows_fade_after_flash_window() {
        let mut app = app();
        app.set_colorer(default_colorer);
        let start = Instant::now();
        app.set_table(table(&["default/a"]), start);

        let fresh = app.display_rows(start);
        assert_eq!(fresh[0].kind, EventKind::Add);
        assert_eq!(fresh[0].color, ADD_COLOR);

        let later = app.display_rows(start + Duration::from_secs(2));
        assert_eq!(later[0].kind, EventKind::Unchanged);
        assert_eq!(later[0].color, STD_COLOR);
        assert_eq!(later[0].cells, vec!["default/a".to_string()]);
    }

    #[test]
    fn resolved_flash_window_replaces_config_value() {
        let mut app = app();
        let start = Instant::now();
        app.set_table(table(&["default/a"]), start);
        let config = RuntimeConfigSnapshot {
            flash_window: Some(Duration::from_secs(5)),
            ..RuntimeConfigSnapshot::default()
        };
        app.set_config(config, Duration::from_millis(100));

        let rows = app.display_rows(start + Duration::from_millis(50));
        assert_eq!(rows[0].kind, EventKind::Add);
        let rows = app.display_rows(start + Duration::from_millis(200));
        assert_eq!(rows[0].kind, EventKind::Unchanged);
    }

    #[test]
    fn detail_pane_scrolls_and_closes() {
        let mut app = app();
        app.set_table(table(&["default/a", "default/b"]), Instant::now());
        app.apply_action(Action::Down);
        assert_eq!(
            app.apply_action(Action::Describe),
            AppCommand::Describe {
                path: "default/b".to_string()
            }
        );

        app.open_detail("Describe default/b", "one\ntwo\nthree");
        app.apply_action(Action::Bottom);
        app.apply_action(Action::Down);
        assert_eq!(app.detail().map(|detail| detail.scroll), Some(2));
        app.apply_action(Action::Up);
        assert_eq!(app.detail().map(|detail| detail.scroll), Some(1));
        // table selection is untouched while the pane is open
        assert_eq!(app.selected_id(), Some("default/b".to_string()));

        assert_eq!(app.apply_action(Action::ConfirmNo), AppCommand::CloseDetail);
        assert!(app.detail().is_none());
    }

    #[test]
    fn streamed_lines_follow_the_tail() {
        let mut app = app();
        app.set_table(table(&["default/web"]), Instant::now());
        assert_eq!(
            app.apply_action(Action::Logs),
            AppCommand::TailLogs {
                path: "default/web".to_string()
            }
        );

        app.open_detail("Logs default/web", "");
        app.push_detail_line("first".to_string());
        app.push_detail_line("second".to_string());
        assert_eq!(app.detail().map(|detail| detail.scroll), Some(1));

        app.apply_action(Action::Top);
        app.push_detail_line("third".to_string());
        let detail = app.detail().cloned();
        assert_eq!(detail.as_ref().map(|detail| detail.scroll), Some(0));
        assert_eq!(detail.map(|detail| detail.lines.len()), Some(3));
    }
}
