use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Sparkline};

use vc_audio::transport::{PlaybackState, SessionKind};
use vc_predict::pipeline::NEUTRAL_PREDICTION;

use crate::runtime::EngineSnapshot;

/// Everything the draw pass needs for one frame.
pub struct DrawContext<'a> {
    pub snapshot: &'a EngineSnapshot,
    pub source_name: Option<&'a str>,
}

/// Score thresholds for coloring, matching the classifier's neutral band.
const HIGH_BAND: f32 = 0.62;
const LOW_BAND: f32 = 0.38;

/// Draw the full UI: score gauge, history sparkline, transport, status.
pub fn draw(frame: &mut Frame, ctx: &DrawContext) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .split(frame.area());

    draw_score(frame, chunks[0], ctx.snapshot);
    draw_history(frame, chunks[1], ctx.snapshot);
    draw_transport(frame, chunks[2], ctx.snapshot);
    draw_status(frame, chunks[3], ctx);
}

fn score_color(prediction: f32) -> Color {
    if prediction > HIGH_BAND {
        Color::Magenta
    } else if prediction < LOW_BAND {
        Color::Blue
    } else {
        Color::White
    }
}

fn draw_score(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
    let prediction = snapshot.prediction.clamp(0.0, 1.0);
    let label = if snapshot.classifier_ready {
        if (prediction - NEUTRAL_PREDICTION).abs() < f32::EPSILON {
            "listening...".to_string()
        } else {
            format!("{:.1}%", f64::from(prediction) * 100.0)
        }
    } else {
        "no model loaded".to_string()
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Voice score "))
        .gauge_style(Style::default().fg(score_color(prediction)))
        .ratio(f64::from(prediction))
        .label(label);
    frame.render_widget(gauge, area);
}

fn draw_history(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
    let data: Vec<u64> = snapshot
        .history
        .iter()
        .map(|&v| (v * 100.0).clamp(0.0, 100.0) as u64)
        .collect();

    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" History ({}) ", data.len())),
        )
        .data(&data)
        .max(100)
        .style(Style::default().fg(Color::Cyan));
    frame.render_widget(sparkline, area);
}

fn format_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn draw_transport(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
    let (ratio, label) = match (snapshot.session_kind, snapshot.duration_secs) {
        (Some(SessionKind::DecodedFile), Some(duration)) if duration > 0.0 => (
            (snapshot.elapsed_secs / duration).clamp(0.0, 1.0),
            format!(
                "{} / {}",
                format_time(snapshot.elapsed_secs),
                format_time(duration)
            ),
        ),
        (Some(SessionKind::LiveStream), _) => (1.0, "live".to_string()),
        _ => (0.0, "no source".to_string()),
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Transport "))
        .gauge_style(Style::default().fg(Color::Gray))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, area);
}

fn state_name(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Idle => "idle",
        PlaybackState::Loaded => "loaded",
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
        PlaybackState::Scrubbing => "scrubbing",
    }
}

fn draw_status(frame: &mut Frame, area: Rect, ctx: &DrawContext) {
    let snapshot = ctx.snapshot;
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", state_name(snapshot.state)),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(ctx.source_name.map_or(String::new(), |n| format!("{n}  "))),
        Span::raw(format!(
            "window {}/{}  ",
            snapshot.window_len, snapshot.window_capacity
        )),
        Span::raw(format!("loudness {:5.1}  ", snapshot.loudness)),
        Span::raw(if snapshot.broker_active {
            "analyzing  "
        } else {
            "analyzer off  "
        }),
        Span::styled(
            "space:play/pause  \u{2190}/\u{2192}:scrub  c:clear  x:purge  q:quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let status = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, area);
}
