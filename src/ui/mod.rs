use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

use regex::Regex;

use crate::app::state::{AppState, FacetKind, LoadState, OverlayState};
use crate::highlight::build_query_regex;
use crate::store::SeedRecord;

pub fn draw_app(frame: &mut Frame, state: &mut AppState, list_state: &mut ListState) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(frame.size());

    // While a load is in flight or failed, only the indicator is drawn;
    // neither the list nor the preview shows records from a prior load.
    if state.is_loading() || state.load_error().is_some() {
        list_state.select(None);
        draw_load_placeholder(frame, state, vertical[0]);
        let status = build_status_line(state, None);
        let status_paragraph = Paragraph::new(status).style(Style::default().fg(Color::Gray));
        frame.render_widget(status_paragraph, vertical[1]);
        render_overlay(frame, state);
        return;
    }

    let preview_lines = state.preview_lines;
    // Recompute through the cache and clamp the selection, then read the
    // result through a shared borrow for the rest of the frame.
    state.projection();
    let projection = state.cached_projection();

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(vertical[0]);

    let highlight_regex = build_query_regex(&state.filters.query);
    let highlight_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);

    let mut items = Vec::with_capacity(projection.seeds.len());
    for seed in &projection.seeds {
        items.push(seed_list_item(
            seed,
            preview_lines,
            highlight_regex.as_ref(),
            highlight_style,
        ));
    }
    if items.is_empty() {
        list_state.select(None);
        items.push(ListItem::new(Span::styled(
            state.empty_message().unwrap_or("").to_string(),
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    } else {
        list_state.select(Some(state.selected));
    }

    let count_label = projection.count_label();
    let list_title = format!("Seeds \u{2014} {count_label}");
    let list = List::new(items)
        .block(
            Block::default()
                .title(list_title)
                .borders(Borders::ALL)
                .border_style(list_border_style(&state.load)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("\u{25b8} ");
    frame.render_stateful_widget(list, columns[0], list_state);

    let preview_text = projection
        .seeds
        .get(state.selected)
        .map(|seed| seed_preview_text(seed, highlight_regex.as_ref(), highlight_style))
        .unwrap_or_else(|| Text::from("Select a seed to see its contents."));

    let detail = Paragraph::new(preview_text)
        .block(Block::default().title("Preview").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, columns[1]);
    frame.render_widget(detail, columns[1]);

    let status = build_status_line(state, Some(&count_label));
    let status_paragraph = Paragraph::new(status).style(Style::default().fg(Color::Gray));
    frame.render_widget(status_paragraph, vertical[1]);

    render_overlay(frame, state);
}

fn draw_load_placeholder(frame: &mut Frame, state: &AppState, area: Rect) {
    let lines = if let Some(message) = state.load_error() {
        vec![
            Line::from(Span::styled(
                format!("Could not load seeds: {message}"),
                Style::default().fg(Color::Red),
            )),
            Line::from(Span::styled(
                "Press Ctrl-r to retry.",
                Style::default().fg(Color::Gray),
            )),
        ]
    } else {
        vec![Line::from(Span::styled(
            "Loading seeds\u{2026}",
            Style::default().fg(Color::Yellow),
        ))]
    };
    let placeholder = Paragraph::new(lines)
        .block(
            Block::default()
                .title("Seeds")
                .borders(Borders::ALL)
                .border_style(list_border_style(&state.load)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(placeholder, area);
}

fn list_border_style(load: &LoadState) -> Style {
    match load {
        LoadState::Loading => Style::default().fg(Color::Yellow),
        LoadState::Failed { .. } => Style::default().fg(Color::Red),
        LoadState::Ready => Style::default(),
    }
}

fn seed_list_item(
    seed: &SeedRecord,
    preview_lines: usize,
    regex: Option<&Regex>,
    highlight_style: Style,
) -> ListItem<'static> {
    let mut lines = Vec::new();
    let mut body_lines = seed.display_body().lines();
    let title = body_lines.next().unwrap_or("(empty seed)");
    lines.push(Line::from(highlight_line(
        title,
        regex,
        highlight_style,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        format!("Created {}", seed.created_at),
        Style::default().fg(Color::Gray),
    )));
    if let Some(facet_line) = render_facet_line(seed, regex, highlight_style) {
        lines.push(facet_line);
    }
    for line in body_lines.take(preview_lines.saturating_sub(1)) {
        lines.push(Line::from(highlight_line(
            line,
            regex,
            highlight_style,
            Style::default(),
        )));
    }
    ListItem::new(lines)
}

fn seed_preview_text(
    seed: &SeedRecord,
    regex: Option<&Regex>,
    highlight_style: Style,
) -> Text<'static> {
    let mut lines = Vec::new();
    lines.push(Line::from(Span::styled(
        format!("Created {}", seed.created_at),
        Style::default().fg(Color::Gray),
    )));
    if let Some(slug) = &seed.slug {
        lines.push(Line::from(Span::styled(
            format!("Slug {slug}"),
            Style::default().fg(Color::Gray),
        )));
    }
    if let Some(facet_line) = render_facet_line(seed, regex, highlight_style) {
        lines.push(facet_line);
    }
    lines.push(Line::from(""));
    let body = seed.display_body();
    if body.is_empty() {
        lines.push(Line::from(""));
    } else {
        for line in body.lines() {
            lines.push(Line::from(highlight_line(
                line,
                regex,
                highlight_style,
                Style::default(),
            )));
        }
    }
    Text::from(lines)
}

fn render_facet_line(
    seed: &SeedRecord,
    regex: Option<&Regex>,
    highlight_style: Style,
) -> Option<Line<'static>> {
    let tags = seed.tag_refs();
    let categories = seed.category_refs();
    if tags.is_empty() && categories.is_empty() {
        return None;
    }
    let tag_style = Style::default().fg(Color::Green);
    let category_style = Style::default().fg(Color::Magenta);
    let mut spans = Vec::new();
    for tag in tags {
        let token = format!("#{}", tag.name);
        spans.extend(highlight_line(&token, regex, highlight_style, tag_style));
        spans.push(Span::raw(" "));
    }
    for category in categories {
        spans.extend(highlight_line(
            &category.path,
            regex,
            highlight_style,
            category_style,
        ));
        spans.push(Span::raw(" "));
    }
    spans.pop();
    Some(Line::from(spans))
}

fn build_status_line(state: &AppState, count_label: Option<&str>) -> Text<'static> {
    let mut spans = Vec::new();
    if let Some(label) = count_label {
        spans.push(Span::styled(
            label.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    }

    match &state.load {
        LoadState::Loading => {
            push_separator(&mut spans);
            spans.push(Span::styled(
                "loading\u{2026}",
                Style::default().fg(Color::Yellow),
            ));
        }
        LoadState::Failed { message } => {
            push_separator(&mut spans);
            spans.push(Span::styled(
                format!("load failed: {message}"),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ));
        }
        LoadState::Ready => {}
    }

    push_separator(&mut spans);
    spans.push(Span::raw("Sort: "));
    spans.push(Span::styled(
        state.filters.sort.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ));

    if state.search_active || !state.filters.query.is_empty() {
        let label_style = if state.search_active {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::raw(" | Search "));
        spans.push(Span::styled("/", label_style));
        if state.filters.query.is_empty() {
            spans.push(Span::styled(
                "(type to search)",
                Style::default().fg(Color::DarkGray),
            ));
        } else {
            spans.push(Span::styled(
                state.filters.query.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        if state.search_active {
            spans.push(Span::styled(" \u{258c}", Style::default().fg(Color::Cyan)));
        }
    }

    for chip in state.filter_chips() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            format!("[{chip}]"),
            Style::default().fg(Color::Green),
        ));
    }

    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Cyan),
        ));
    }

    let mut lines = Vec::with_capacity(2);
    lines.push(Line::from(spans));

    let keys = vec![
        Span::styled(
            "Keys: ",
            Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "j/k move \u{2022} / search \u{2022} t tags \u{2022} c categories \u{2022} s sort \u{2022} x clear \u{2022} Ctrl-r refresh \u{2022} Enter open \u{2022} q quit",
            Style::default().fg(Color::DarkGray),
        ),
    ];
    lines.push(Line::from(keys));

    Text::from(lines)
}

fn push_separator(spans: &mut Vec<Span<'static>>) {
    if !spans.is_empty() {
        spans.push(Span::raw(" | "));
    }
}

fn highlight_line(
    text: &str,
    regex: Option<&Regex>,
    highlight_style: Style,
    base_style: Style,
) -> Vec<Span<'static>> {
    if let Some(re) = regex {
        let mut spans = Vec::new();
        let mut last = 0;
        for mat in re.find_iter(text) {
            if mat.start() > last {
                spans.push(Span::styled(
                    text[last..mat.start()].to_string(),
                    base_style,
                ));
            }
            spans.push(Span::styled(mat.as_str().to_string(), highlight_style));
            last = mat.end();
        }
        if last < text.len() {
            spans.push(Span::styled(text[last..].to_string(), base_style));
        }
        if spans.is_empty() {
            spans.push(Span::styled(text.to_string(), base_style));
        }
        spans
    } else {
        vec![Span::styled(text.to_string(), base_style)]
    }
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    match state.overlay() {
        Some(OverlayState::FacetPicker(picker)) => {
            let area = centered_rect(50, 60, frame.size());
            frame.render_widget(Clear, area);

            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(2), Constraint::Min(3)].as_ref())
                .split(area);

            let (title, noun) = match picker.kind {
                FacetKind::Tag => ("Filter by Tag", "tags"),
                FacetKind::Category => ("Filter by Category", "categories"),
            };

            let header = Paragraph::new(vec![
                Line::from(Span::styled(
                    title,
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    "space toggle \u{2022} j/k move \u{2022} Esc close",
                    Style::default().fg(Color::Gray),
                )),
            ]);
            frame.render_widget(header, layout[0]);

            let mut items: Vec<ListItem> = picker
                .items
                .iter()
                .map(|item| {
                    let mark = if item.selected { "[x]" } else { "[ ]" };
                    let style = if item.selected {
                        Style::default().fg(Color::Green)
                    } else {
                        Style::default()
                    };
                    ListItem::new(Line::from(vec![
                        Span::styled(mark.to_string(), style.add_modifier(Modifier::BOLD)),
                        Span::raw(" "),
                        Span::styled(item.label.clone(), style),
                    ]))
                })
                .collect();
            if items.is_empty() {
                items.push(ListItem::new(Span::styled(
                    format!("No {noun} yet."),
                    Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
                )));
            }

            let mut picker_state = ListState::default();
            if !picker.items.is_empty() {
                picker_state.select(Some(picker.selected_index));
            }
            let list = List::new(items)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Cyan)),
                )
                .highlight_style(
                    Style::default()
                        .bg(Color::Blue)
                        .fg(Color::Black)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("\u{25b8} ");
            frame.render_stateful_widget(list, layout[1], &mut picker_state);
        }
        None => {}
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}
