use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Tabs};
use ratatui::Frame;

use cwt_agents::AgentStatus;
use cwt_vt::{CellFlags, Rgb, ScreenSnapshot, StyledCell};

use crate::app::{App, InputMode};

const BAR_STYLE: Style = Style::new().fg(Color::White).bg(Color::DarkGray);

const HELP: &str = " ^B Prev │ ^F Next │ ^N New │ ^G Merge │ ^W Close │ ^Q Quit";

pub fn render(app: &App, frame: &mut Frame) {
    let [tabs, pane, status] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_tabs(app, frame, tabs);
    render_pane(app, frame, pane);
    render_status(app, frame, status);
}

fn render_tabs(app: &App, frame: &mut Frame, area: Rect) {
    let titles: Vec<Line> = app
        .tabs
        .iter()
        .map(|tab| match &tab.agent {
            None => Line::from(format!("● {}", tab.title)),
            Some(agent) => {
                let mut spans = vec![Span::raw(tab.title.clone())];
                if agent.status != AgentStatus::Running {
                    spans.push(Span::styled(
                        format!(" [{}]", agent.status),
                        Style::new().fg(status_color(agent.status)),
                    ));
                }
                Line::from(spans)
            }
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.active)
        .style(BAR_STYLE)
        .highlight_style(
            Style::new()
                .fg(Color::White)
                .bg(Color::Blue)
                .add_modifier(Modifier::BOLD),
        )
        .divider("|");
    frame.render_widget(tabs, area);
}

fn render_pane(app: &App, frame: &mut Frame, area: Rect) {
    let Some(session) = app.registry().get(&app.active_tab().id) else {
        return;
    };
    let snapshot = session.snapshot();
    draw_snapshot(&snapshot, area, frame.buffer_mut());

    let cursor = &snapshot.cursor;
    if cursor.visible && cursor.row < area.height && cursor.col < area.width {
        frame.set_cursor_position(Position::new(area.x + cursor.col, area.y + cursor.row));
    }
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let line = match &app.input {
        InputMode::Task { buffer } => Line::from(vec![
            Span::styled(" Task: ", BAR_STYLE.add_modifier(Modifier::BOLD)),
            Span::raw(format!("{buffer}█")),
        ]),
        InputMode::Normal => {
            let mut spans = Vec::new();
            if let Some(agent) = &app.active_tab().agent {
                spans.push(Span::raw(format!(" {} ", agent.branch)));
                if let Some(stat) = app.active_stat() {
                    spans.push(Span::styled(
                        format!("+{}", stat.insertions),
                        Style::new().fg(Color::Green),
                    ));
                    spans.push(Span::raw(" "));
                    spans.push(Span::styled(
                        format!("-{}", stat.deletions),
                        Style::new().fg(Color::Red),
                    ));
                    spans.push(Span::raw(format!(" ({} files) │", stat.files_changed)));
                }
            }
            match &app.message {
                Some(message) => spans.push(Span::raw(format!(" {message}"))),
                None => spans.push(Span::raw(HELP)),
            }
            Line::from(spans)
        }
    };
    frame.render_widget(Paragraph::new(line).style(BAR_STYLE), area);
}

/// Copy the emulated screen into the frame buffer, clipped to `area`.
pub fn draw_snapshot(snapshot: &ScreenSnapshot, area: Rect, buf: &mut Buffer) {
    for (row, cells) in snapshot.rows.iter().enumerate().take(area.height as usize) {
        let y = area.y + row as u16;
        for (col, cell) in cells.iter().enumerate().take(area.width as usize) {
            if cell.width == 0 {
                continue;
            }
            let x = area.x + col as u16;
            if let Some(target) = buf.cell_mut((x, y)) {
                target.set_char(cell.ch).set_style(cell_style(cell));
            }
        }
    }
}

pub fn cell_style(cell: &StyledCell) -> Style {
    let mut style = Style::new()
        .fg(term_color(cell.fg, Rgb::WHITE))
        .bg(term_color(cell.bg, Rgb::BLACK));

    const MODIFIERS: [(CellFlags, Modifier); 7] = [
        (CellFlags::BOLD, Modifier::BOLD),
        (CellFlags::ITALIC, Modifier::ITALIC),
        (CellFlags::UNDERLINE, Modifier::UNDERLINED),
        (CellFlags::STRIKETHROUGH, Modifier::CROSSED_OUT),
        (CellFlags::INVERSE, Modifier::REVERSED),
        (CellFlags::DIM, Modifier::DIM),
        (CellFlags::HIDDEN, Modifier::HIDDEN),
    ];
    for (flag, modifier) in MODIFIERS {
        if cell.flags.contains(flag) {
            style = style.add_modifier(modifier);
        }
    }
    style
}

/// The emulator's default colors map to the host terminal's own defaults.
fn term_color(rgb: Rgb, default: Rgb) -> Color {
    if rgb == default {
        Color::Reset
    } else {
        Color::Rgb(rgb.r, rgb.g, rgb.b)
    }
}

fn status_color(status: AgentStatus) -> Color {
    match status {
        AgentStatus::Completed | AgentStatus::Merged => Color::Green,
        AgentStatus::Merging | AgentStatus::Pending => Color::Yellow,
        AgentStatus::Failed => Color::Red,
        AgentStatus::Running => Color::White,
    }
}
