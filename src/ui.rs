use crate::simulation::PathEnsemble;
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

const PATH_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Blue,
    Color::Green,
    Color::Magenta,
    Color::LightBlue,
    Color::LightGreen,
];

/// Chart-ready view of an ensemble: a subset of paths plus the mean path.
#[derive(Clone, Debug, PartialEq)]
pub struct PathPlot {
    pub paths: Vec<Vec<(f64, f64)>>,
    pub mean: Option<Vec<(f64, f64)>>,
    pub total_paths: usize,
    pub x_max: f64,
    pub y_bounds: [f64; 2],
}

fn to_points(values: &[f64]) -> Vec<(f64, f64)> {
    values.iter().enumerate().map(|(t, v)| (t as f64, *v)).collect()
}

impl PathPlot {
    /// `None` for an empty ensemble. The mean runs over every path, not just the drawn ones.
    pub fn from_ensemble(ensemble: &PathEnsemble, max_drawn: usize, show_mean: bool) -> Option<Self> {
        let days = ensemble.days()?;

        let paths: Vec<Vec<(f64, f64)>> = ensemble
            .paths()
            .iter()
            .take(max_drawn)
            .map(|p| to_points(p))
            .collect();
        let mean = show_mean.then(|| to_points(&ensemble.mean_path()));

        let (min_v, max_v) = paths
            .iter()
            .flatten()
            .chain(mean.iter().flatten())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));

        Some(Self {
            paths,
            mean,
            total_paths: ensemble.len(),
            x_max: days as f64,
            y_bounds: [min_v * 0.98, max_v * 1.02],
        })
    }
}

pub fn render(f: &mut Frame, plot: &PathPlot) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    render_chart(f, plot, layout[0]);
    render_footer(f, plot, layout[1]);
}

fn render_chart(f: &mut Frame, plot: &PathPlot, area: Rect) {
    let mut datasets: Vec<Dataset> = plot
        .paths
        .iter()
        .enumerate()
        .map(|(i, points)| {
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(PATH_COLORS[i % PATH_COLORS.len()]))
                .data(points)
        })
        .collect();

    if let Some(mean) = &plot.mean {
        datasets.push(
            Dataset::default()
                .name("Mean")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
                .data(mean),
        );
    }

    let [y_min, y_max] = plot.y_bounds;
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    " Portfolio Monte Carlo simulation ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("Simulated days")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, plot.x_max])
                .labels(vec![
                    Span::raw("0"),
                    Span::raw(format!("{:.0}", plot.x_max)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("Portfolio value")
                .style(Style::default().fg(Color::Gray))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::styled(format!("{:.1}", y_min), Style::default().fg(Color::Gray)),
                    Span::styled(format!("{:.1}", y_max), Style::default().fg(Color::Gray)),
                ]),
        );

    f.render_widget(chart, area);
}

fn render_footer(f: &mut Frame, plot: &PathPlot, area: Rect) {
    let footer = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" {} of {} paths shown ", plot.paths.len(), plot.total_paths),
            Style::default().fg(Color::White),
        ),
        Span::raw(" | "),
        Span::styled("any key: close", Style::default().fg(Color::Gray)),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(footer, area);
}

/// Draws the plot full-screen until a key is pressed.
pub fn show(plot: &PathPlot) -> Result<()> {
    let mut terminal = crate::tui::init()?;
    let res = (|| -> Result<()> {
        loop {
            terminal.draw(|f| render(f, plot))?;
            if event::poll(std::time::Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        return Ok(());
                    }
                }
            }
        }
    })();
    crate::tui::restore()?;
    res
}
