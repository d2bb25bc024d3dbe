use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use cnae_icms::aggregate::{DimensionTotal, MonthlySeries};
use cnae_icms::fmt::{format_metric, truncate};
use cnae_icms::hierarchy::{active_filter_label, display_name, ALL_LABEL};
use cnae_icms::snapshot::LoadReport;
use cnae_icms::{Dashboard, DescriptionLookup, Level, RangeFilter};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Dataset, GraphType, List,
        ListItem, Paragraph, Row, Table, TableState,
    },
    Frame, Terminal,
};
use std::io;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Overview,
    Detail,
    Dataframe,
    Filters,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Overview => Page::Detail,
            Page::Detail => Page::Dataframe,
            Page::Dataframe => Page::Filters,
            Page::Filters => Page::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Overview => Page::Filters,
            Page::Detail => Page::Overview,
            Page::Dataframe => Page::Detail,
            Page::Filters => Page::Dataframe,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Overview => "Visão Geral",
            Page::Detail => "Visão Detalhada",
            Page::Dataframe => "Dataframe",
            Page::Filters => "Filtros",
        }
    }
}

const PAGES: [Page; 4] = [Page::Overview, Page::Detail, Page::Dataframe, Page::Filters];

/// Fixed colors per commerce type; anything else is gray.
fn commerce_color(commerce: &str) -> Color {
    match commerce {
        "Comércio" => Color::Blue,
        "Indústria" => Color::Rgb(255, 127, 14),
        "Serviço" => Color::Green,
        "Agropecuária e Pesca" => Color::Red,
        "Meio Ambiente" => Color::Magenta,
        _ => Color::Gray,
    }
}

// ============================================================================
// Filter form
// ============================================================================

/// Pending form values. Nothing reaches the dashboard until `submit`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterForm {
    pub start: String,
    pub end: String,
    pub commerces: Vec<(String, bool)>,
    /// 0 = start date, 1 = end date, 2.. = commerce toggles
    pub cursor: usize,
    pub message: Option<Result<String, String>>,
}

impl FilterForm {
    pub fn from_filter(filter: &RangeFilter, options: &[String]) -> Self {
        let commerces = options
            .iter()
            .map(|c| {
                let checked = filter.commerces.is_empty() || filter.commerces.contains(c);
                (c.clone(), checked)
            })
            .collect();

        Self {
            start: filter.start.format("%Y-%m-%d").to_string(),
            end: filter.end.format("%Y-%m-%d").to_string(),
            commerces,
            cursor: 0,
            message: None,
        }
    }

    fn field_count(&self) -> usize {
        2 + self.commerces.len()
    }

    pub fn next_field(&mut self) {
        self.cursor = (self.cursor + 1) % self.field_count();
    }

    pub fn previous_field(&mut self) {
        self.cursor = (self.cursor + self.field_count() - 1) % self.field_count();
    }

    fn focused_date(&mut self) -> Option<&mut String> {
        match self.cursor {
            0 => Some(&mut self.start),
            1 => Some(&mut self.end),
            _ => None,
        }
    }

    pub fn type_char(&mut self, c: char) {
        if c.is_ascii_digit() || c == '-' {
            if let Some(field) = self.focused_date() {
                if field.len() < 10 {
                    field.push(c);
                }
            }
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.focused_date() {
            field.pop();
        }
    }

    pub fn toggle(&mut self) {
        if let Some(entry) = self.cursor.checked_sub(2).and_then(|i| self.commerces.get_mut(i)) {
            entry.1 = !entry.1;
        }
    }

    pub fn submit(&self) -> Result<RangeFilter, String> {
        let parse = |label: &str, raw: &str| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| format!("{} inválida: {:?} (use AAAA-MM-DD)", label, raw))
        };
        let start = parse("Data de início", &self.start)?;
        let end = parse("Data de término", &self.end)?;

        let selected = self
            .commerces
            .iter()
            .filter(|(_, checked)| *checked)
            .map(|(name, _)| name.clone());
        Ok(RangeFilter::new(start, end).with_commerces(selected))
    }
}

// ============================================================================
// App state
// ============================================================================

pub struct App {
    pub dashboard: Dashboard,
    lookup: Box<dyn DescriptionLookup>,
    prefix: String,
    report: LoadReport,
    pub current_page: Page,
    pub state: TableState,
    /// Hierarchy level whose selector has focus on the detail page
    pub focus: Level,
    pub form: FilterForm,
}

impl App {
    pub fn new(
        dashboard: Dashboard,
        lookup: Box<dyn DescriptionLookup>,
        prefix: &str,
        report: LoadReport,
    ) -> Self {
        let mut state = TableState::default();
        if !dashboard.filtered().is_empty() {
            state.select(Some(0));
        }
        let form = FilterForm::from_filter(dashboard.filter(), dashboard.commerce_options());

        Self {
            dashboard,
            lookup,
            prefix: prefix.to_string(),
            report,
            current_page: Page::Overview,
            state,
            focus: Level::Section,
            form,
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    fn metric(&self, value: f64) -> String {
        format_metric(value, &self.prefix)
    }

    pub fn focus_next_level(&mut self) {
        self.focus = self.focus.child().unwrap_or(Level::Section);
    }

    pub fn focus_previous_level(&mut self) {
        self.focus = self.focus.parent().unwrap_or(Level::Subclass);
    }

    /// Step the focused selector through "All" followed by its options.
    pub fn cycle_selection(&mut self, forward: bool) {
        let level = self.focus;
        let view = self.dashboard.view();
        if !view.is_enabled(level) {
            return;
        }

        let options = view.options(level);
        let slots = options.len() + 1;
        let current = self
            .dashboard
            .selection()
            .get(level)
            .and_then(|code| options.iter().position(|o| o == code))
            .map(|i| i + 1)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % slots
        } else {
            (current + slots - 1) % slots
        };
        let code = next.checked_sub(1).map(|i| options[i].clone());

        debug!(level = level.name(), code = ?code, "hierarchy selection changed");
        self.dashboard.select(level, code);
    }

    pub fn clear_selection(&mut self) {
        self.dashboard.select(self.focus, None);
    }

    pub fn submit_form(&mut self) {
        match self.form.submit() {
            Ok(filter) => {
                info!(start = %filter.start, end = %filter.end, commerces = filter.commerces.len(), "filters applied");
                self.dashboard.apply_filter(filter);
                self.focus = Level::Section;
                self.state
                    .select(if self.dashboard.filtered().is_empty() { None } else { Some(0) });
                self.form.message = Some(Ok(format!(
                    "Filtros aplicados: {} registros",
                    self.dashboard.filtered().len()
                )));
            }
            Err(message) => self.form.message = Some(Err(message)),
        }
    }

    pub fn next_row(&mut self, step: usize) {
        let len = self.dashboard.filtered().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if step == 1 && i >= len - 1 => 0,
            Some(i) => (i + step).min(len - 1),
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous_row(&mut self, step: usize) {
        let len = self.dashboard.filtered().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) if step == 1 => len - 1,
            Some(i) => i.saturating_sub(step),
            None => 0,
        };
        self.state.select(Some(i));
    }
}

// ============================================================================
// Event loop
// ============================================================================

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => app.previous_page(),
            KeyCode::Tab => app.next_page(),
            KeyCode::BackTab => app.previous_page(),
            _ => match app.current_page {
                Page::Overview => {}
                Page::Detail => match key.code {
                    KeyCode::Down | KeyCode::Char('j') => app.focus_next_level(),
                    KeyCode::Up | KeyCode::Char('k') => app.focus_previous_level(),
                    KeyCode::Right | KeyCode::Char('l') => app.cycle_selection(true),
                    KeyCode::Left | KeyCode::Char('h') => app.cycle_selection(false),
                    KeyCode::Backspace | KeyCode::Delete => app.clear_selection(),
                    _ => {}
                },
                Page::Dataframe => match key.code {
                    KeyCode::Down | KeyCode::Char('j') => app.next_row(1),
                    KeyCode::Up | KeyCode::Char('k') => app.previous_row(1),
                    KeyCode::PageDown => app.next_row(20),
                    KeyCode::PageUp => app.previous_row(20),
                    KeyCode::Home => app.state.select(Some(0)),
                    KeyCode::End => {
                        if !app.dashboard.filtered().is_empty() {
                            app.state.select(Some(app.dashboard.filtered().len() - 1));
                        }
                    }
                    _ => {}
                },
                Page::Filters => match key.code {
                    KeyCode::Down => app.form.next_field(),
                    KeyCode::Up => app.form.previous_field(),
                    KeyCode::Char(' ') => app.form.toggle(),
                    KeyCode::Char(c) => app.form.type_char(c),
                    KeyCode::Backspace => app.form.backspace(),
                    KeyCode::Enter => app.submit_form(),
                    _ => {}
                },
            },
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Overview => render_overview(f, chunks[1], app),
        Page::Detail => render_detail(f, chunks[1], app),
        Page::Dataframe => render_table(f, chunks[1], app),
        Page::Filters => render_filters(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![Span::styled(
        "📊 CNAE-ICMS Analytics  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];

    for (i, page) in PAGES.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let filter = app.dashboard.filter();
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!(
            "{} → {}",
            filter.start.format("%d/%m/%Y"),
            filter.end.format("%d/%m/%Y")
        ),
        Style::default().fg(Color::White),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn metric_box<'a>(title: &'a str, value: String) -> Paragraph<'a> {
    Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(
            value,
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" {} ", title)),
    )
}

// ============================================================================
// Visão Geral
// ============================================================================

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let overview = app.dashboard.overview();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(area);

    let metrics = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4])
        .split(rows[0]);

    let summary = &overview.summary;
    f.render_widget(metric_box("Total Arrecadado", app.metric(summary.total)), metrics[0]);
    f.render_widget(
        metric_box(
            "Média de Arrecadação",
            summary.mean.map(|m| app.metric(m)).unwrap_or_else(|| "-".to_string()),
        ),
        metrics[1],
    );
    f.render_widget(
        metric_box(
            "Maior Arrecadação Mensal",
            summary.best_month.map(|m| app.metric(m)).unwrap_or_else(|| "-".to_string()),
        ),
        metrics[2],
    );
    f.render_widget(
        metric_box("Quantidade de Arrecadações", summary.count.to_string()),
        metrics[3],
    );

    let charts = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    // Bar chart by commerce type
    let n = overview.by_commerce.len().max(1) as u16;
    let bar_width = (charts[0].width.saturating_sub(2) / n).saturating_sub(1).clamp(3, 24);
    let bars: Vec<Bar> = overview
        .by_commerce
        .iter()
        .map(|entry| {
            Bar::default()
                .value(bar_value(entry.total))
                .label(Line::from(truncate(&entry.label, bar_width as usize)))
                .text_value(truncate(&app.metric(entry.total), bar_width as usize))
                .style(Style::default().fg(commerce_color(&entry.label)))
        })
        .collect();

    let bar_chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Arrecadação por Comércio "),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1)
        .value_style(Style::default().fg(Color::Black).bg(Color::White));
    f.render_widget(bar_chart, charts[0]);

    render_history(f, charts[1], app, &overview.history);
}

fn bar_value(amount: f64) -> u64 {
    if amount.is_finite() && amount > 0.0 {
        amount.round() as u64
    } else {
        0
    }
}

/// Months since year 0, so consecutive months are one unit apart on the x axis.
fn month_index(date: NaiveDate) -> f64 {
    (date.year() * 12 + date.month0() as i32) as f64
}

fn render_history(f: &mut Frame, area: Rect, app: &App, history: &[MonthlySeries]) {
    let points: Vec<Vec<(f64, f64)>> = history
        .iter()
        .map(|series| {
            series
                .points
                .iter()
                .map(|p| (month_index(p.month_end), p.total))
                .collect()
        })
        .collect();

    let datasets: Vec<Dataset> = history
        .iter()
        .zip(points.iter())
        .map(|(series, data)| {
            Dataset::default()
                .name(series.label.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(commerce_color(&series.label)))
                .data(data)
        })
        .collect();

    let all_points = history.iter().flat_map(|s| s.points.iter());
    let first = all_points.clone().map(|p| p.month_end).min();
    let last = all_points.clone().map(|p| p.month_end).max();
    let max_total = all_points.map(|p| p.total).fold(0.0_f64, f64::max);

    let (x_bounds, x_labels) = match (first, last) {
        (Some(first), Some(last)) => (
            [month_index(first), month_index(last).max(month_index(first) + 1.0)],
            vec![
                Span::raw(first.format("%m/%Y").to_string()),
                Span::raw(last.format("%m/%Y").to_string()),
            ],
        ),
        _ => ([0.0, 1.0], vec![]),
    };
    let y_top = if max_total > 0.0 { max_total * 1.1 } else { 1.0 };

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Histórico de Arrecadação por Comércio "),
        )
        .x_axis(
            Axis::default()
                .title("Data")
                .style(Style::default().fg(Color::Gray))
                .bounds(x_bounds)
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title("Valor Arrecadado")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, y_top])
                .labels(vec![Span::raw("0"), Span::raw(app.metric(y_top))]),
        );

    f.render_widget(chart, area);
}

// ============================================================================
// Visão Detalhada
// ============================================================================

fn render_detail(f: &mut Frame, area: Rect, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(12), Constraint::Min(0)])
        .split(columns[0]);

    let detail = app.dashboard.detail();
    render_selectors(f, left[0], app);
    render_options(f, left[1], app, detail.breakdown.as_ref());

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Length(3), Constraint::Min(0)])
        .split(columns[1]);

    let metrics = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(right[0]);
    f.render_widget(metric_box("Total Arrecadado", app.metric(detail.summary.total)), metrics[0]);
    f.render_widget(
        metric_box("Quantidade de Arrecadações", detail.summary.count.to_string()),
        metrics[1],
    );

    let active = app
        .dashboard
        .view()
        .active
        .as_ref()
        .map(|(level, code)| (*level, code.as_str()));
    let label = Paragraph::new(Line::from(Span::styled(
        active_filter_label(active, app.lookup.as_ref()),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(label, right[1]);

    // Daily bars: keep the most recent days that fit
    let chart_area = right[2];
    let bar_width: u16 = 9;
    let fit = (chart_area.width.saturating_sub(2) / (bar_width + 1)).max(1) as usize;
    let shown = &detail.daily[detail.daily.len().saturating_sub(fit)..];
    let bars: Vec<Bar> = shown
        .iter()
        .map(|day| {
            Bar::default()
                .value(bar_value(day.total))
                .label(Line::from(day.date.format("%d/%m/%y").to_string()))
                .text_value(truncate(&app.metric(day.total), bar_width as usize))
        })
        .collect();

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" Arrecadação diária ({} de {} dias) ", shown.len(), detail.daily.len())),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    f.render_widget(chart, chart_area);
}

fn render_selectors(f: &mut Frame, area: Rect, app: &App) {
    let view = app.dashboard.view();
    let selection = app.dashboard.selection();

    let mut lines = vec![Line::from("")];
    for level in Level::ALL {
        let enabled = view.is_enabled(level);
        let focused = level == app.focus;
        let value = match selection.get(level) {
            Some(code) => truncate(&display_name(app.lookup.as_ref(), level, code), 40),
            None => ALL_LABEL.to_string(),
        };

        let label_style = if focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        let value_style = if !enabled {
            Style::default().fg(Color::DarkGray)
        } else if focused {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };

        lines.push(Line::from(vec![
            Span::styled(if focused { "→ " } else { "  " }, label_style),
            Span::styled(format!("{:<10}", level.name()), label_style),
            Span::styled(if focused && enabled { "◀ " } else { "  " }, value_style),
            Span::styled(value, value_style),
            Span::styled(if focused && enabled { " ▶" } else { "" }, value_style),
        ]));
    }

    let selectors = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Filtros Específicos "),
    );
    f.render_widget(selectors, area);
}

/// Option list of the focused level. When the breakdown covers that level,
/// each option also shows its total.
fn render_options(
    f: &mut Frame,
    area: Rect,
    app: &App,
    breakdown: Option<&(Level, Vec<DimensionTotal>)>,
) {
    let view = app.dashboard.view();
    let level = app.focus;
    let selected = app.dashboard.selection().get(level);
    let totals = breakdown
        .filter(|(grouped, _)| *grouped == level)
        .map(|(_, totals)| totals.as_slice())
        .unwrap_or(&[]);

    let items: Vec<ListItem> = if view.is_enabled(level) {
        std::iter::once(ListItem::new(ALL_LABEL.to_string()).style(if selected.is_none() {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        }))
        .chain(view.options(level).iter().map(|code| {
            let mut text = format!("{}  {}", code, display_name(app.lookup.as_ref(), level, code));
            if let Some(total) = totals.iter().find(|t| &t.label == code) {
                text = format!("{}  ({})", text, app.metric(total.total));
            }
            let style = if Some(code.as_str()) == selected {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            ListItem::new(text).style(style)
        }))
        .collect()
    } else {
        vec![ListItem::new(ALL_LABEL.to_string()).style(Style::default().fg(Color::DarkGray))]
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Opções: {} ", level.name())),
    );
    f.render_widget(list, area);
}

// ============================================================================
// Dataframe
// ============================================================================

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = [
        "Id", "Data", "Valor", "Seção", "Divisão", "Grupo", "Classe", "Subclasse", "Setor", "Comércio",
    ]
    .iter()
    .map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.dashboard.filtered().iter().map(|record| {
        let cells = vec![
            Cell::from(record.id.to_string()),
            Cell::from(record.date.format("%Y-%m-%d").to_string()),
            Cell::from(format!("{:.2}", record.amount)),
            Cell::from(record.section.clone()),
            Cell::from(record.division.clone()),
            Cell::from(record.group.clone()),
            Cell::from(record.class.clone()),
            Cell::from(record.subclass.clone()),
            Cell::from(truncate(&record.sector, 16)),
            Cell::from(truncate(&record.commerce, 22))
                .style(Style::default().fg(commerce_color(&record.commerce))),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(16),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(17),
            Constraint::Length(23),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Arrecadações ({}) ", app.dashboard.filtered().len())),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

// ============================================================================
// Filtros
// ============================================================================

fn render_filters(f: &mut Frame, area: Rect, app: &App) {
    let form = &app.form;
    let field_style = |index: usize| {
        if form.cursor == index {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        }
    };
    let marker = |index: usize| if form.cursor == index { "→ " } else { "  " };

    let mut content = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw(marker(0)),
            Span::styled("Data de início:  ", Style::default().fg(Color::Cyan)),
            Span::styled(format!("[{:<10}]", form.start), field_style(0)),
        ]),
        Line::from(vec![
            Span::raw(marker(1)),
            Span::styled("Data de término: ", Style::default().fg(Color::Cyan)),
            Span::styled(format!("[{:<10}]", form.end), field_style(1)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  Selecione os Comércios",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
    ];

    for (i, (name, checked)) in form.commerces.iter().enumerate() {
        let index = i + 2;
        content.push(Line::from(vec![
            Span::raw(marker(index)),
            Span::styled(if *checked { "[x] " } else { "[ ] " }, field_style(index)),
            Span::styled(name.clone(), field_style(index).fg(commerce_color(name))),
        ]));
    }

    content.push(Line::from(""));
    match &form.message {
        Some(Ok(message)) => content.push(Line::from(Span::styled(
            format!("  ✓ {}", message),
            Style::default().fg(Color::Green),
        ))),
        Some(Err(message)) => content.push(Line::from(Span::styled(
            format!("  ✗ {}", message),
            Style::default().fg(Color::Red),
        ))),
        None => {}
    }
    content.push(Line::from(Span::styled(
        "  Enter aplica os filtros; a seleção da Visão Detalhada é reiniciada.",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Filtros "),
    );

    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![Span::styled(
        format!(
            " Registros: {}/{} ",
            app.dashboard.filtered().len(),
            app.dashboard.snapshot().len()
        ),
        Style::default().fg(Color::Cyan),
    )];

    if !app.report.dropped.is_empty() {
        status_spans.push(Span::raw("| "));
        status_spans.push(Span::styled(
            format!("Descartados: {} ", app.report.dropped.len()),
            Style::default().fg(Color::Red),
        ));
    }

    let hints: &[(&str, &str)] = match app.current_page {
        Page::Overview => &[],
        Page::Detail => &[("↑/↓", "Nível"), ("←/→", "Opção"), ("Backspace", "Todas")],
        Page::Dataframe => &[("↑/↓", "Nav"), ("PgUp/PgDn", "Rápido")],
        Page::Filters => &[("↑/↓", "Campo"), ("Espaço", "Marcar"), ("Enter", "Aplicar")],
    };

    status_spans.push(Span::raw("| "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Página | "));
    for (key, action) in hints {
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(format!(" {} | ", action)));
    }
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Sair"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}
