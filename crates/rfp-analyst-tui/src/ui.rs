use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use rfp_analyst_core::{Category, Role};
use crate::app::{App, InputMode, PromptKind};
use crate::markdown::render_markdown;

fn category_color(category: Category) -> Color {
    match category {
        Category::Legal => Color::Red,
        Category::Technical => Color::Blue,
        Category::Writer => Color::Magenta,
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    // Body: transcript, then either the upload banner or approval controls, then input
    let banner_height = if !app.session.is_file_uploaded() {
        3
    } else if app.session.pending_approval().is_some() {
        4
    } else {
        0
    };
    let [chat_area, banner_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(banner_height),
        Constraint::Length(3),
    ])
    .areas(body_area);

    render_chat(app, frame, chat_area);
    if banner_height > 0 {
        if app.session.is_file_uploaded() {
            render_approval_controls(frame, banner_area);
        } else {
            render_upload_banner(app, frame, banner_area);
        }
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if let Some(message) = app.current_alert().map(|a| a.message.clone()) {
        render_alert(&message, app.alerts.len(), frame, area);
    } else if app.prompt.is_some() {
        render_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let document = match app.session.uploaded_file() {
        Some(name) => format!(" [{}]", name),
        None => String::new(),
    };

    let backend_color = match app.backend_status.as_deref() {
        Some("Active") => Color::Green,
        Some("unreachable") => Color::Red,
        _ => Color::Gray,
    };
    let status = app.backend_status.as_deref().unwrap_or("unknown");
    let backend = match app.backend_service.as_deref() {
        Some(service) => format!(" {} [{}: {}] ", app.base_url, service, status),
        None => format!(" {} ({}) ", app.base_url, status),
    };

    let title = Line::from(vec![
        Span::styled(" RFP Intelligent Analyst ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(document, Style::default().fg(Color::White)),
        Span::styled(backend, Style::default().fg(backend_color)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area for mouse hit-testing and scroll calculations (inner size minus borders)
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();

    for msg in app.session.messages() {
        match msg.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.text.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Role::Bot | Role::System => {
                let mut label = vec![Span::styled(
                    "Analyst:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )];
                if let Some(category) = msg.category {
                    label.push(Span::raw(" "));
                    label.push(Span::styled(
                        format!(" {} AGENT ", category),
                        Style::default()
                            .bg(category_color(category))
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    ));
                }
                lines.push(Line::from(label));
                lines.extend(render_markdown(&msg.text));

                if !msg.sources.is_empty() {
                    lines.push(Line::from(vec![
                        Span::styled("Sources: ", Style::default().fg(Color::Gray).bold()),
                        Span::styled(msg.sources.join(", "), Style::default().fg(Color::Gray)),
                    ]));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.session.is_loading() && app.session.is_file_uploaded() {
        lines.push(Line::from(Span::styled(
            "Analyst:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_upload_banner(app: &App, frame: &mut Frame, area: Rect) {
    let text = if app.is_busy() {
        Line::from(Span::styled(
            "Processing...",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        ))
    } else {
        Line::from(vec![
            Span::raw("Upload a PDF to initialize the AI Agent. Press "),
            Span::styled(" u ", Style::default().bg(Color::Blue).fg(Color::White).bold()),
            Span::raw(" to select an RFP document."),
        ])
    };

    let banner = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title(" Upload RFP Document "),
    );
    frame.render_widget(banner, area);
}

fn render_approval_controls(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);

    let text = Text::from(vec![
        Line::from(vec![
            Span::styled("Manager Review: ", Style::default().bold()),
            Span::raw("Do you approve this draft?"),
        ]),
        Line::from(vec![
            Span::styled(" a  Approve ", key_style.bg(Color::Green)),
            Span::raw("   "),
            Span::styled(" r  Reject & Edit ", key_style.bg(Color::Red)),
        ]),
    ]);

    let controls = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    frame.render_widget(controls, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let enabled = app.session.can_chat();
    let editing = app.input_mode == InputMode::Editing;

    let border_color = if !enabled {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };
    let title = if enabled {
        " Ask about risks, costs, or tech stack (i to type) "
    } else {
        " Upload a PDF to start chatting "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling to keep the cursor visible (inner width = width - borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 || cursor_pos < inner_width {
        0
    } else {
        cursor_pos - inner_width + 1
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(if enabled { Color::Cyan } else { Color::DarkGray }))
        .block(input_block);
    frame.render_widget(input, area);

    // Show cursor when editing and nothing modal is on top
    if editing && app.prompt.is_none() && app.current_alert().is_none() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " ASK ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let mut hints: Vec<Span> = Vec::new();
    if let Some(status) = &app.status_line {
        hints.push(Span::styled(
            format!(" {} ", status),
            Style::default().bg(Color::Black).fg(Color::Yellow),
        ));
    } else if app.current_alert().is_some() {
        hints.extend(hint("Enter", "dismiss"));
    } else if app.prompt.is_some() {
        hints.extend(hint("Enter", "submit"));
        hints.extend(hint("Esc", "cancel"));
    } else if app.input_mode == InputMode::Editing {
        hints.extend(hint("Enter", "send"));
        hints.extend(hint("Esc", "stop typing"));
    } else {
        let session = &app.session;
        if !session.is_file_uploaded() {
            hints.extend(hint("u", "upload"));
        } else {
            hints.extend(hint("i", "ask"));
            hints.extend(hint("b", "auto-brief"));
        }
        if session.pending_approval().is_some() {
            hints.extend(hint("a", "approve"));
            hints.extend(hint("r", "reject"));
        }
        if session.can_export() {
            hints.extend(hint("e", "export"));
        }
        hints.extend(hint("j/k", "scroll"));
        hints.extend(hint("q", "quit"));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Centered popup rectangle clamped to the screen
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_alert(message: &str, queued: usize, frame: &mut Frame, area: Rect) {
    // Height grows with the message: borders + wrapped text + blank + hint
    let width = 60u16;
    let inner_width = width.saturating_sub(2).max(1) as usize;
    let text_lines = message
        .lines()
        .map(|l| l.chars().count() / inner_width + 1)
        .sum::<usize>()
        .max(1) as u16;
    let popup_area = popup_rect(area, width, text_lines + 4);

    frame.render_widget(Clear, popup_area);

    let title = if queued > 1 {
        format!(" Notice (1 of {}) ", queued)
    } else {
        " Notice ".to_string()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(title);

    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::default(),
        Line::from(Span::styled(
            "Press Enter to dismiss",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    let alert = Paragraph::new(text).block(block).wrap(Wrap { trim: false });
    frame.render_widget(alert, popup_area);
}

fn render_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let Some(prompt) = app.prompt.as_ref() else {
        return;
    };

    let (title, instructions) = match prompt.kind {
        PromptKind::UploadPath => (
            " Upload RFP Document ",
            "Path to the RFP PDF. Enter to upload, Esc to cancel.",
        ),
        PromptKind::Feedback => (
            " What should be changed? ",
            "Describe the changes. Enter to send, Esc to keep the draft.",
        ),
    };

    let popup_area = popup_rect(area, 70, 7);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions_area = Rect::new(inner.x, inner.y, inner.width, 1);
    frame.render_widget(
        Paragraph::new(instructions).style(Style::default().fg(Color::DarkGray)),
        instructions_area,
    );

    // Input field with horizontal scrolling
    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = input_area.width as usize;
    let scroll_offset = if width == 0 || prompt.cursor < width {
        0
    } else {
        prompt.cursor - width + 1
    };
    let visible: String = prompt.input.chars().skip(scroll_offset).take(width).collect();

    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    let cursor_x = (prompt.cursor - scroll_offset) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}
