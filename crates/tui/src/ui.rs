use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use seeker_core::search::SearchPhase;
use seeker_core::state::{RunSnapshot, RunStatus};
use seeker_core::types::Detection;
use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    // -- Left panel: status --

    let (banner_label, banner_bg) = match app.status() {
        RunStatus::Running => ("RUNNING (P to pause, S to stop)", Color::Green),
        RunStatus::Paused => ("PAUSED (P to resume, S to stop)", Color::Yellow),
        RunStatus::Stopped => ("STOPPED (Q to quit)", Color::Red),
    };

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(vec![
        Span::styled(" p", Style::default().fg(Color::Yellow)),
        Span::raw(" pause, "),
        Span::styled("s", Style::default().fg(Color::Yellow)),
        Span::raw(" stop, "),
        Span::styled("d", Style::default().fg(Color::Yellow)),
        Span::raw(" detections, "),
        Span::styled("l", Style::default().fg(Color::Yellow)),
        Span::raw(" logs, "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ]));
    lines.push(Line::from(""));

    match &app.snapshot {
        Some(snap) => {
            lines.extend(stat_lines(snap));
            if app.show_detections {
                lines.push(Line::from(""));
                lines.extend(detection_lines(&snap.detections));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "  waiting for first cycle...",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    // Full-width centered banner
    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let status = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(status, left_chunks[1]);

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end]
            .iter()
            .map(|m| parse_log_line(m))
            .collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Logs ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }
}

fn stat_lines(snap: &RunSnapshot) -> Vec<Line<'static>> {
    let label = |s: &str| Span::styled(format!("  {:<12}", s), Style::default().fg(Color::DarkGray));
    let value = |s: String| Span::styled(s, Style::default().fg(Color::White).add_modifier(Modifier::BOLD));
    let stats = &snap.stats;

    let search = match snap.search_phase {
        SearchPhase::Idle => Span::styled("idle", Style::default().fg(Color::DarkGray)),
        SearchPhase::Searching => Span::styled(
            format!(
                "searching {} (move {})",
                if snap.search_direction > 0 { "right" } else { "left" },
                snap.search_moves
            ),
            Style::default().fg(Color::Magenta),
        ),
    };

    vec![
        Line::from(vec![label("runtime"), value(format_elapsed(snap.elapsed))]),
        Line::from(vec![
            label("fps"),
            value(snap.fps.to_string()),
            Span::raw("   "),
            label("detect"),
            value(format!("{:.1}ms", snap.avg_latency.as_secs_f64() * 1000.0)),
        ]),
        Line::from(vec![label("detections"), value(stats.detections.to_string())]),
        Line::from(vec![
            label("actions"),
            value(stats.actions_performed.to_string()),
            Span::styled(
                format!(
                    "  attack {} / pickup {} / interact {}",
                    stats.attacks, stats.pickups, stats.interactions
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(vec![label("search"), search]),
        Line::from(vec![
            label("searches"),
            value(stats.searches_performed.to_string()),
            Span::styled(
                format!("  total {:.1}s", stats.search_time_total.as_secs_f64()),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    ]
}

fn detection_lines(detections: &[Detection]) -> Vec<Line<'static>> {
    if detections.is_empty() {
        return vec![Line::from(Span::styled("  no detections", Style::default().fg(Color::DarkGray)))];
    }
    detections
        .iter()
        .map(|d| {
            Line::from(vec![
                Span::styled(format!("  {:<10}", d.class_name), Style::default().fg(class_color(&d.class_name))),
                Span::raw(format!(" {:.2} ", d.confidence)),
                Span::styled(
                    format!("({}, {}) {:.0}px", d.center.0, d.center.1, d.distance),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect()
}

fn class_color(class: &str) -> Color {
    match class {
        "mob" => Color::Red,
        "item" => Color::Green,
        "npc" => Color::Blue,
        _ => Color::Gray,
    }
}

fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line for TUI rendering.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        // Fallback for unstructured messages
        return Line::from(raw);
    }

    let level = parts[0];
    let prefix = parts[1];
    let color_idx: u8 = parts[2].parse().unwrap_or(0);
    let timestamp = parts[3];
    let message = parts[4];

    let prefix_color = match color_idx {
        1 => Color::DarkGray,     // COLOR_GRAY
        2 => Color::LightBlue,    // COLOR_BLUE
        3 => Color::LightGreen,   // COLOR_GREEN
        4 => Color::LightMagenta, // COLOR_MAGENTA
        _ => Color::White,
    };

    let mut spans = Vec::new();

    spans.push(Span::styled(timestamp, Style::default().fg(Color::DarkGray)));
    spans.push(Span::raw(" "));

    // Level tag only for warn/error
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }

    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(prefix_color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }

    spans.push(Span::styled(message, Style::default().fg(prefix_color)));

    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_hours_minutes_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "01:02:03");
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
    }

    #[test]
    fn structured_log_lines_are_split() {
        let line = parse_log_line("WARN\x1fengine\x1f3\x1f10:00:00\x1fcycle skipped");
        let text: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, vec!["10:00:00", " ", "warn ", "engine", " ", "cycle skipped"]);
    }

    #[test]
    fn plain_log_lines_pass_through() {
        let line = parse_log_line("hello");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "hello");
    }
}
