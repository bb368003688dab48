use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use std::time::Instant;

use crate::app::{App, DetailPane, InputMode};
use crate::model::{Alignment, EventKind};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const WARN: Color = Color::Rgb(251, 191, 36);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);
const SEPARATOR: &str = "\u{e0b0}";
const SEPARATOR_RTL: &str = "\u{e0b2}";

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    match app.detail() {
        Some(detail) => render_detail(frame, root[1], detail),
        None => render_table(frame, root[1], app),
    }
    render_footer(frame, root[2], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if right_width == 0 || right_width >= area.width / 2 {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let header = app.header();
    let mut spans = Vec::new();
    push_powerline_segment(
        &mut spans,
        format!(" ctx {} ", header.context),
        Color::White,
        PL_A,
        PL_B,
    );
    push_powerline_segment(
        &mut spans,
        format!(" cluster {} ", header.cluster),
        Color::White,
        PL_B,
        PL_C,
    );
    push_powerline_segment(
        &mut spans,
        format!(" user {} ", header.user),
        Color::White,
        PL_C,
        PL_D,
    );
    push_powerline_segment(
        &mut spans,
        format!(" k8s {} ", header.version),
        Color::White,
        PL_D,
        BG,
    );
    spans.push(Span::styled(
        format!(" {} @ {}", app.kind().title(), app.scope()),
        Style::default().fg(ACCENT).bg(BG).add_modifier(Modifier::BOLD),
    ));
    Line::from(spans)
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    if let Some(load) = app.cluster_metrics() {
        push_powerline_segment_rtl(
            &mut spans,
            format!(" cpu {}% mem {}% ", load.perc_cpu, load.perc_mem),
            Color::White,
            PL_C,
            BG,
        );
    }
    if app.forwards() > 0 {
        let next_bg = if spans.is_empty() { BG } else { PL_C };
        push_powerline_segment_rtl(
            &mut spans,
            format!(" pf {} ", app.forwards()),
            Color::Black,
            ACCENT,
            next_bg,
        );
    }
    Line::from(spans)
}

fn render_table(frame: &mut Frame, area: Rect, app: &App) {
    let header = app.table_header();
    let rows = app.display_rows(Instant::now());

    let header_row = Row::new(header.iter().map(|column| {
        Cell::from(column.name.clone()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let body = rows.iter().map(|row| {
        let mut style = Style::default().fg(row.color);
        if row.kind.is_fresh() {
            style = style.add_modifier(Modifier::BOLD);
        }
        if row.kind == EventKind::Delete {
            style = style.add_modifier(Modifier::DIM | Modifier::CROSSED_OUT);
        }
        Row::new(row.cells.iter().enumerate().map(|(index, value)| {
            let right = header
                .0
                .get(index)
                .is_some_and(|column| column.align == Alignment::Right);
            let cell = if right {
                Line::from(value.clone()).right_aligned()
            } else {
                Line::from(value.clone())
            };
            Cell::from(cell)
        }))
        .style(style)
    });

    let title = match app.table() {
        Some(_) => format!("{}({}) [{}]", app.kind().title(), app.scope(), rows.len()),
        None => format!("{}({}) loading", app.kind().title(), app.scope()),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    let table = Table::new(body, column_constraints(header.len()))
        .header(header_row)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::REVERSED),
        )
        .highlight_symbol("> ");

    let mut state = TableState::default();
    state.select(app.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_detail(frame: &mut Frame, area: Rect, detail: &DetailPane) {
    let lines = detail
        .lines
        .iter()
        .skip(detail.scroll)
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    let block = Block::default()
        .title(format!(
            "{} [{}/{}]",
            detail.title,
            (detail.scroll + 1).min(detail.lines.len()),
            detail.lines.len()
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));
    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .style(Style::default().fg(Color::White)),
        area,
    );
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let line = match app.mode() {
        InputMode::Command => Line::from(vec![
            Span::styled(
                " : ",
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" {}", app.input()),
                Style::default().fg(Color::White).bg(BG),
            ),
        ]),
        InputMode::Normal => {
            let (text, bg, fg) = match app.pending_confirmation_prompt() {
                Some(prompt) => (format!(" {prompt}? (y/n) "), WARN, Color::Black),
                None => (format!(" {} ", app.status()), PL_B, Color::White),
            };
            let mut spans = Vec::new();
            push_powerline_segment(&mut spans, text, fg, bg, BG);
            Line::from(spans)
        }
    };
    frame.render_widget(Paragraph::new(line).style(Style::default().bg(BG)), area);
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled(SEPARATOR, Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(SEPARATOR_RTL, Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::render;
    use crate::app::{App, ClusterHeader};
    use crate::metrics::ClusterMetrics;
    use crate::model::{
        EventKind, Header, HeaderRow, NamespaceScope, ResourceKind, Row, RowEvent, TableData,
    };
    use crate::input::Action;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;
    use std::time::Instant;

    fn screen(app: &App, width: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, 8)).expect("terminal");
        terminal.draw(|frame| render(frame, app)).expect("draw");
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn pods_app() -> App {
        App::new(
            ClusterHeader::default(),
            NamespaceScope::Named("default".to_string()),
            ResourceKind::Pods,
        )
    }

    #[test]
    fn draws_load_and_forward_segments_together() {
        let mut app = pods_app();
        app.set_cluster_metrics(Some(ClusterMetrics {
            perc_cpu: 42,
            perc_mem: 17,
        }));
        app.set_forwards(2);

        let text = screen(&app, 160);
        assert!(text.contains("cpu 42% mem 17%"));
        assert!(text.contains("pf 2"));
    }

    #[test]
    fn detail_pane_replaces_the_table() {
        let mut app = pods_app();
        app.open_detail("Describe default/web", "Name: web\nStatus: Running\nIP: 10.0.0.7");
        app.apply_action(Action::Down);

        let text = screen(&app, 80);
        assert!(text.contains("Describe default/web [2/3]"));
        assert!(text.contains("Status: Running"));
        assert!(!text.contains("Name: web"));
        assert!(!text.contains("Pods(default)"));
    }

    #[test]
    fn draws_header_and_rows() {
        let mut app = App::new(
            ClusterHeader {
                context: "kind-dev".to_string(),
                cluster: "dev".to_string(),
                user: "admin".to_string(),
                version: "v1.31.0".to_string(),
            },
            NamespaceScope::Named("default".to_string()),
            ResourceKind::Pods,
        );
        let mut table = TableData::new(
            NamespaceScope::Named("default".to_string()),
            HeaderRow(vec![Header::new("NAME"), Header::new("STATUS")]),
        );
        table.row_events.insert(
            "default/web".to_string(),
            RowEvent::new(
                EventKind::Add,
                Row::new("default/web", vec!["web".to_string(), "Running".to_string()]),
            ),
        );
        app.set_table(Arc::new(table), Instant::now());

        let mut terminal = Terminal::new(TestBackend::new(120, 8)).expect("terminal");
        terminal.draw(|frame| render(frame, &app)).expect("draw");

        let buffer = terminal.backend().buffer();
        let text = buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>();
        assert!(text.contains("kind-dev"));
        assert!(text.contains("Pods(default)"));
        assert!(text.contains("Running"));
    }
}
