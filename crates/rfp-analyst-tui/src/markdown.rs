use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

/// Render a markdown answer into styled lines.
///
/// Covers what the backend actually produces: `#` headers, bullet lists,
/// fenced code, horizontal rules and inline `**bold**`,
/// `*italic*` and `` `code` ``. Anything else passes through as plain text.
pub fn render_markdown(text: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code_block = false;

    for raw in text.lines() {
        let trimmed = raw.trim_start();

        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }

        if in_code_block {
            lines.push(Line::from(Span::styled(
                format!("  {}", raw),
                Style::default().fg(Color::Gray),
            )));
            continue;
        }

        if let Some((level, title)) = heading(trimmed) {
            let color = match level {
                1 => Color::Magenta,
                2 => Color::Cyan,
                _ => Color::Blue,
            };
            let mut style = Style::default().fg(color).add_modifier(Modifier::BOLD);
            if level == 1 {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            lines.push(Line::from(Span::styled(title.to_string(), style)));
            continue;
        }

        if is_rule(trimmed) {
            lines.push(Line::from(Span::styled(
                "─".repeat(24),
                Style::default().fg(Color::DarkGray),
            )));
            continue;
        }

        let indent = " ".repeat((raw.len() - trimmed.len()).min(8));
        if let Some(item) = bullet(trimmed) {
            let mut spans = vec![Span::raw(format!("{}• ", indent))];
            spans.extend(parse_inline(item));
            lines.push(Line::from(spans));
            continue;
        }

        let spans = parse_inline(raw);
        if spans.is_empty() {
            lines.push(Line::default());
        } else {
            lines.push(Line::from(spans));
        }
    }

    lines
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if rest.is_empty() || rest.starts_with(' ') {
        Some((level, rest.trim()))
    } else {
        None
    }
}

fn bullet(line: &str) -> Option<&str> {
    ["- ", "* ", "+ "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
}

fn is_rule(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= 3
        && (line.chars().all(|c| c == '-')
            || line.chars().all(|c| c == '*')
            || line.chars().all(|c| c == '_'))
}

/// Convert `**bold**`, `*italic*` and `` `code` `` into styled spans.
/// Unclosed markers are kept literally.
fn parse_inline(text: &str) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut current_text = String::new();
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        let (marker, style) = match c {
            '*' if rest.starts_with("**") => ("**", Style::default().add_modifier(Modifier::BOLD)),
            '*' => ("*", Style::default().add_modifier(Modifier::ITALIC)),
            '`' => ("`", Style::default().fg(Color::Yellow)),
            _ => {
                current_text.push(c);
                rest = &rest[c.len_utf8()..];
                continue;
            }
        };

        let after = &rest[marker.len()..];
        // An opening marker must hug its text, so "5 * 3" stays arithmetic
        let opens = !after.starts_with(char::is_whitespace);
        match after.find(marker) {
            Some(end) if end > 0 && opens => {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(after[..end].to_string(), style));
                rest = &after[end + marker.len()..];
            }
            _ => {
                // No closing marker, treat as literal
                current_text.push_str(marker);
                rest = after;
            }
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    spans
}
