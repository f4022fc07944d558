use chrono::Local;
use ratatui::prelude::*;
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Clear, Padding, Paragraph};

use crate::agent_session::SessionState;
use crate::app::App;
use crate::forge::BackendForge;
use crate::menu::{Focus, MenuState, SECTIONS, Screen};
use crate::solitaire::{FOUNDATIONS, Pile, TABLEAU_PILES};
use crate::text_layout::{input_viewport, tail_window, wrap_lines};
use crate::theme::Theme;

const TEXT_PADDING: u16 = 1;
const HEADER_HEIGHT: u16 = 3;
const STATUS_HEIGHT: u16 = 3;
const TITLE_BAR_HEIGHT: u16 = 3;
const INPUT_HEIGHT: u16 = 3;
const SIDEBAR_WIDTH: u16 = 26;
const SESSION_LIST_WIDTH: u16 = 30;
const CARD_CELL_WIDTH: usize = 6;
const ACTIVE_TITLE_BG: Color = Color::Rgb(90, 145, 200);
const ACTIVE_TITLE_FG: Color = Color::Black;

pub fn render(frame: &mut Frame, app: &App, forge: &BackendForge, theme: &Theme) {
    let [header, body, status] = Layout::vertical([
        Constraint::Length(HEADER_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(STATUS_HEIGHT),
    ])
    .areas(frame.area());

    render_header(frame, header, app, theme);
    if app.lock.is_locked() {
        render_locked(frame, body, app, theme);
    } else {
        let [sidebar, content] =
            Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
                .areas(body);
        render_sidebar(frame, sidebar, app, theme);
        render_content(frame, content, app, forge, theme);
    }
    render_status(frame, status, app, theme);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let style = Style::default().bg(theme.header_bg).fg(theme.text_fg);
    let block = Block::default()
        .style(style)
        .padding(Padding::uniform(TEXT_PADDING));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let crumb = if app.lock.is_locked() {
        "Locked".to_string()
    } else {
        app.menu.breadcrumb()
    };
    let left = Line::from(vec![
        Span::styled(
            "UNIBOS ",
            Style::default()
                .fg(theme.accent_fg)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(app.version.label(), Style::default().fg(theme.muted_fg)),
        Span::raw("  "),
        Span::raw(crumb),
    ]);
    frame.render_widget(Paragraph::new(left).style(style), inner);

    let clock = Local::now().format("%Y-%m-%d %H:%M:%S");
    let right = Line::from(vec![
        Span::styled(app.user().to_string(), Style::default().fg(theme.accent_fg)),
        Span::raw(format!("  {clock}")),
    ]);
    frame.render_widget(
        Paragraph::new(right).alignment(Alignment::Right),
        inner,
    );
}

fn render_title_bar(frame: &mut Frame, area: Rect, title: &str, active: bool, base: Color, theme: &Theme) {
    let title_bg = title_bar_bg(base, active);
    let title_fg = if active {
        ACTIVE_TITLE_FG
    } else {
        theme.muted_fg
    };
    frame.render_widget(
        Paragraph::new(title.to_string())
            .style(Style::default().bg(title_bg).fg(title_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(title_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn render_sidebar(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let [title_area, list_area] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    let active = app.menu.focus() == Focus::Sidebar;
    render_title_bar(frame, title_area, "Menu", active, theme.sidebar_bg, theme);

    let mut lines: Vec<Line> = Vec::new();
    let selected = app.menu.selected();
    let mut flat_index = 0usize;
    for section in SECTIONS {
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        lines.push(Line::styled(
            section.title.to_uppercase(),
            Style::default()
                .fg(theme.muted_fg)
                .add_modifier(Modifier::BOLD),
        ));
        for item in section.items {
            let style = if flat_index == selected && active {
                Style::default().bg(ACTIVE_TITLE_BG).fg(ACTIVE_TITLE_FG)
            } else if flat_index == selected {
                Style::default().fg(theme.accent_fg)
            } else if item.screen == app.menu.screen() {
                Style::default()
                    .fg(theme.text_fg)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.text_fg)
            };
            lines.push(Line::styled(format!("  {}", item.label), style));
            flat_index += 1;
        }
    }

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().bg(theme.sidebar_bg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.sidebar_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        list_area,
    );
}

fn render_content(frame: &mut Frame, area: Rect, app: &App, forge: &BackendForge, theme: &Theme) {
    let [title_area, body] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    let active = app.menu.focus() == Focus::Content;
    let title = match app.menu.screen() {
        Screen::Home => "Home".to_string(),
        _ => app.menu.breadcrumb(),
    };
    render_title_bar(frame, title_area, &title, active, theme.content_bg, theme);
    frame.render_widget(
        Block::default().style(Style::default().bg(theme.content_bg)),
        body,
    );

    match app.menu.screen() {
        Screen::Home => render_lines(frame, body, home_lines(app, forge), app.content_scroll(), theme),
        Screen::Agents => render_agents(frame, body, app, active, theme),
        Screen::Forge => render_lines(frame, body, forge_lines(forge), app.content_scroll(), theme),
        Screen::Solitaire => render_solitaire(frame, body, app, theme),
        Screen::Lock => render_lines(frame, body, lock_lines(app), 0, theme),
        Screen::Version => render_lines(frame, body, version_lines(app), app.content_scroll(), theme),
        Screen::Logs => {
            let lines = if app.log_lines().is_empty() {
                vec!["(log is empty)".to_string()]
            } else {
                app.log_lines().to_vec()
            };
            render_lines(frame, body, lines, app.content_scroll(), theme);
        }
    }
}

/// Bottom-anchored wrapped text, scrolled back `scroll` rows.
fn render_lines(frame: &mut Frame, area: Rect, lines: Vec<String>, scroll: u16, theme: &Theme) {
    let block = Block::default()
        .style(Style::default().bg(theme.content_bg))
        .padding(Padding::uniform(TEXT_PADDING));
    let inner = block.inner(area);
    let rows = wrap_lines(lines.iter().map(String::as_str), inner.width);
    let visible = if rows.len() <= usize::from(inner.height) {
        0..rows.len()
    } else {
        tail_window(rows.len(), inner.height, scroll)
    };
    frame.render_widget(
        Paragraph::new(rows[visible].join("\n"))
            .style(Style::default().bg(theme.content_bg).fg(theme.text_fg))
            .block(block),
        area,
    );
}

fn home_lines(app: &App, forge: &BackendForge) -> Vec<String> {
    let open_sessions = app
        .sessions()
        .iter()
        .filter(|session| session.state != SessionState::Closed)
        .count();
    let mut lines = vec![
        format!("Welcome, {}.", app.user()),
        String::new(),
        format!("Version      {}", app.version.label()),
        format!("Agents       {open_sessions} open session(s)"),
        format!("Web Forge    {}", forge.status().summary()),
        format!(
            "Solitaire    score {}, {} moves",
            app.game.score, app.game.moves
        ),
        String::new(),
    ];
    for (section, item) in MenuState::items() {
        lines.push(format!(
            "{:<10} {:<16} {}",
            SECTIONS[section].title, item.label, item.hint
        ));
    }
    lines
}

fn forge_lines(forge: &BackendForge) -> Vec<String> {
    let command = forge.command();
    let mut lines = vec![
        format!("Status   {}", forge.status().summary()),
        format!("Command  {}", command.command_line()),
        format!("Workdir  {}", command.working_dir.display()),
        format!("URL      {}", command.url),
        String::new(),
    ];
    if forge.log_len() == 0 {
        lines.push("(no output yet; press s to start)".to_string());
    }
    lines.extend(forge.log().cloned());
    lines
}

fn lock_lines(app: &App) -> Vec<String> {
    let enabled = if app.lock.is_enabled() { "enabled" } else { "disabled" };
    let passphrase = if app.lock.has_passphrase() {
        "set"
    } else {
        "not set (Enter unlocks)"
    };
    vec![
        format!("Screen lock  {enabled}"),
        format!("Passphrase   {passphrase}"),
        String::new(),
        "Press Enter or Ctrl-L to lock.".to_string(),
        "While locked the solitaire table stays playable; press u to unlock.".to_string(),
    ]
}

fn version_lines(app: &App) -> Vec<String> {
    let info = &app.version;
    let mut lines = vec![
        format!("Version    {}", info.version),
        format!("Build      {}", info.build_number),
        format!("Released   {}", non_empty(&info.release_date)),
        format!("Codename   {}", non_empty(&info.codename)),
        String::new(),
        "Changelog".to_string(),
    ];
    if info.changelog.is_empty() {
        lines.push("  (no releases recorded)".to_string());
    }
    for entry in &info.changelog {
        lines.push(format!("  {:<10} {:<11} {}", entry.version, entry.date, entry.summary));
    }
    lines
}

fn non_empty(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn render_agents(frame: &mut Frame, area: Rect, app: &App, active: bool, theme: &Theme) {
    let [list_area, chat_area] =
        Layout::horizontal([Constraint::Length(SESSION_LIST_WIDTH), Constraint::Min(0)])
            .areas(area);

    let mut list: Vec<Line> = Vec::new();
    if app.sessions().is_empty() {
        list.push(Line::styled(
            "No sessions. /new <role> [name]",
            Style::default().fg(theme.muted_fg),
        ));
    }
    for (index, session) in app.sessions().iter().enumerate() {
        let marker = match session.state {
            SessionState::Idle => "·",
            SessionState::Busy => working_dots(app.ticks),
            SessionState::Closed => "x",
        };
        let style = if index == app.selected_session_index() {
            Style::default().fg(theme.accent_fg).add_modifier(Modifier::BOLD)
        } else if session.state == SessionState::Closed {
            Style::default().fg(theme.muted_fg)
        } else {
            Style::default().fg(theme.text_fg)
        };
        list.push(Line::styled(
            format!("{} {} {}", session.id, session.name, marker),
            style,
        ));
        list.push(Line::styled(
            format!(
                "   {} · {} ok · {} failed",
                session.role.label(),
                session.processed.saturating_sub(session.failures),
                session.failures
            ),
            Style::default().fg(theme.muted_fg),
        ));
    }
    frame.render_widget(
        Paragraph::new(Text::from(list))
            .style(Style::default().bg(theme.sidebar_bg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.sidebar_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        list_area,
    );

    let [transcript_area, input_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(INPUT_HEIGHT)]).areas(chat_area);
    let transcript = app
        .selected_session_id()
        .map(|id| app.transcript(&id).to_vec())
        .unwrap_or_default();
    render_lines(frame, transcript_area, transcript, app.content_scroll(), theme);

    let block = Block::default()
        .style(Style::default().bg(theme.input_bg))
        .padding(Padding::uniform(TEXT_PADDING));
    let inner = block.inner(input_area);
    let (visible, cursor_col) =
        input_viewport(app.input().text(), app.input().cursor(), inner.width);
    frame.render_widget(
        Paragraph::new(visible)
            .style(Style::default().bg(theme.input_bg).fg(theme.text_fg))
            .block(block),
        input_area,
    );
    if active && inner.width > 0 && inner.height > 0 {
        frame.set_cursor_position((
            inner
                .x
                .saturating_add(cursor_col.min(inner.width.saturating_sub(1))),
            inner.y,
        ));
    }
}

fn render_locked(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let [title_area, body] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(area);
    render_title_bar(frame, title_area, "Solitaire (locked)", false, theme.content_bg, theme);
    frame.render_widget(
        Block::default().style(Style::default().bg(theme.content_bg)),
        body,
    );
    render_solitaire(frame, body, app, theme);
    if app.lock.is_prompt_open() {
        render_unlock_prompt(frame, body, app, theme);
    }
}

fn render_unlock_prompt(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let width = 44u16.min(area.width);
    let height = 7u16.min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let overlay = Rect::new(x, y, width, height);
    let mut lines = vec![
        Line::styled("Unlock", Style::default().fg(theme.accent_fg).add_modifier(Modifier::BOLD)),
        Line::raw(format!("Passphrase: {}", app.masked_unlock_input())),
    ];
    if app.lock.failed_attempts() > 0 {
        lines.push(Line::styled(
            format!("Failed attempts: {}", app.lock.failed_attempts()),
            Style::default().fg(theme.red_card_fg),
        ));
    }
    frame.render_widget(Clear, overlay);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(Color::Rgb(20, 20, 20)))
                    .padding(Padding::uniform(1)),
            ),
        overlay,
    );
}

fn render_solitaire(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let game = &app.game;
    let cursor = app.pile_cursor();
    let picked = app.picked_pile();
    let cell_style = |pile: Pile, base: Style| {
        let mut style = base;
        if picked == Some(pile) {
            style = style.bg(ACTIVE_TITLE_BG);
        }
        if cursor == pile {
            style = style.add_modifier(Modifier::REVERSED);
        }
        style
    };
    let card_style = |red: bool| {
        Style::default().fg(if red {
            theme.red_card_fg
        } else {
            theme.black_card_fg
        })
    };
    let muted = Style::default().fg(theme.muted_fg);

    let mut top_row: Vec<Span> = Vec::new();
    let stock_label = if game.cards(Pile::Stock).is_empty() { "[  ]" } else { "[##]" };
    top_row.push(Span::styled(pad_cell(stock_label), cell_style(Pile::Stock, muted)));
    let waste = match game.top(Pile::Waste) {
        Some(card) => Span::styled(pad_cell(&card.label()), cell_style(Pile::Waste, card_style(card.is_red()))),
        None => Span::styled(pad_cell("[  ]"), cell_style(Pile::Waste, muted)),
    };
    top_row.push(waste);
    top_row.push(Span::raw(" ".repeat(CARD_CELL_WIDTH)));
    for index in 0..FOUNDATIONS {
        let pile = Pile::Foundation(index);
        top_row.push(match game.top(pile) {
            Some(card) => Span::styled(pad_cell(&card.label()), cell_style(pile, card_style(card.is_red()))),
            None => Span::styled(pad_cell("[  ]"), cell_style(pile, muted)),
        });
    }

    let mut lines = vec![Line::from(top_row), Line::default()];
    let depth = (0..TABLEAU_PILES)
        .map(|index| game.cards(Pile::Tableau(index)).len())
        .max()
        .unwrap_or(0)
        .max(1);
    for row in 0..depth {
        let mut spans: Vec<Span> = Vec::new();
        for index in 0..TABLEAU_PILES {
            let pile = Pile::Tableau(index);
            let cards = game.cards(pile);
            let is_top = row + 1 == cards.len() || (cards.is_empty() && row == 0);
            let span = match cards.get(row) {
                Some(card) if card.face_up => {
                    Span::styled(pad_cell(&card.label()), card_style(card.is_red()))
                }
                Some(_) => Span::styled(pad_cell("##"), muted),
                None if cards.is_empty() && row == 0 => Span::styled(pad_cell("[  ]"), muted),
                None => Span::raw(" ".repeat(CARD_CELL_WIDTH)),
            };
            spans.push(if is_top {
                let style = span.style;
                span.style(cell_style(pile, style))
            } else {
                span
            });
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::default());
    let mut footer = format!(
        "Score {}  ·  Moves {}  ·  Seed {}",
        game.score, game.moves, game.seed
    );
    if game.is_won() {
        footer.push_str("  ·  Solved!");
    }
    lines.push(Line::styled(footer, Style::default().fg(theme.accent_fg)));

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().bg(theme.content_bg).fg(theme.text_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.content_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn pad_cell(label: &str) -> String {
    format!("{label:<width$}", width = CARD_CELL_WIDTH)
}

fn render_status(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let line = match app.status_message() {
        Some(message) if app.is_quit_armed() => Line::styled(
            message.to_string(),
            Style::default()
                .fg(theme.red_card_fg)
                .add_modifier(Modifier::BOLD),
        ),
        Some(message) => Line::styled(message.to_string(), Style::default().fg(theme.accent_fg)),
        None => Line::styled(status_help_text(app), Style::default().fg(theme.muted_fg)),
    };
    frame.render_widget(
        Paragraph::new(line)
            .style(Style::default().bg(theme.status_bg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.status_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        area,
    );
}

fn status_help_text(app: &App) -> String {
    let busy = app
        .sessions()
        .iter()
        .any(|session| session.state == SessionState::Busy);
    if busy {
        format!("{} | agents working {}", app.help_line(), working_dots(app.ticks))
    } else {
        app.help_line().to_string()
    }
}

fn working_dots(ticks: u64) -> &'static str {
    const FRAMES: [&str; 6] = ["[   ]", "[.  ]", "[.. ]", "[...]", "[ ..]", "[  .]"];
    FRAMES[((ticks / 8) as usize) % FRAMES.len()]
}

fn title_bar_bg(base: Color, active: bool) -> Color {
    if active {
        return ACTIVE_TITLE_BG;
    }
    match base {
        Color::Rgb(r, g, b) => Color::Rgb(
            r.saturating_sub(12),
            g.saturating_sub(12),
            b.saturating_sub(12),
        ),
        _ => base,
    }
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
