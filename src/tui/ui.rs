use super::app::App;
use crate::service::ServiceState;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table, TableState},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let [table_area, log_area, footer_area] = Layout::vertical([
        Constraint::Min(5),
        Constraint::Length(8),
        Constraint::Length(1),
    ])
    .areas(f.area());

    draw_services(f, app, table_area);
    draw_log(f, app, log_area);
    draw_footer(f, app, footer_area);
}

fn state_style(state: ServiceState) -> Style {
    match state {
        ServiceState::Running => Style::default().fg(Color::Green),
        ServiceState::Failed => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ServiceState::DepWait => Style::default().fg(Color::Yellow),
        ServiceState::Disabled => Style::default().fg(Color::DarkGray),
    }
}

fn draw_services(f: &mut Frame, app: &App, area: Rect) {
    let rows: Vec<Row> = app
        .services
        .iter()
        .map(|info| {
            let state = info.state();
            Row::new(vec![
                info.name.clone(),
                state.to_string(),
                info.status.clone(),
                info.description.clone(),
            ])
            .style(state_style(state))
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(9),
            Constraint::Min(24),
            Constraint::Min(16),
        ],
    )
    .header(
        Row::new(vec!["NAME", "STATE", "STATUS", "DESCRIPTION"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .block(Block::default().borders(Borders::ALL).title("services"));

    let mut state = TableState::default();
    state.select(Some(app.selected));
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    let visible = (area.height as usize).saturating_sub(2);
    let lines: Vec<Line> = app
        .log
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|rec| {
            Line::from(vec![
                Span::styled(
                    rec.time
                        .with_timezone(&chrono::Local)
                        .format("%H:%M:%S ")
                        .to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(rec.text.clone()),
            ])
        })
        .collect();

    let title = app
        .services
        .get(app.selected)
        .map(|s| format!("log: {}", s.name))
        .unwrap_or_else(|| "log".to_string());
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let text = match &app.message {
        Some(msg) => Line::from(Span::styled(
            msg.clone(),
            Style::default().fg(Color::Red),
        )),
        None => Line::from(
            " q quit   j/k select   e enable   d disable   r restart   c clear",
        ),
    };
    f.render_widget(Paragraph::new(text), area);
}
