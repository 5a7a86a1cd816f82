use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Shared line editing for the chat input and the modal prompts.
/// Returns false when the key isn't an editing key.
fn edit_line(text: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < text.chars().count() {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            *cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            *cursor = (*cursor + 1).min(text.chars().count());
        }
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = text.chars().count(),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.replace_range(..byte_pos, "");
            *cursor = 0;
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
    app.poll_tasks().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Alerts block everything until dismissed
    if app.current_alert().is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            app.dismiss_alert();
        }
        return;
    }

    if app.prompt.is_some() {
        handle_prompt(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_prompt(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit_prompt(false),
        KeyCode::Esc => app.submit_prompt(true),
        _ => {
            if let Some(prompt) = app.prompt.as_mut() {
                edit_line(&mut prompt.input, &mut prompt.cursor, key);
            }
        }
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    // Any keypress retires the previous notice
    app.status_line = None;

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Session actions
        KeyCode::Char('u') if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.open_upload_prompt()
        }
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Tab => app.focus_input(),
        KeyCode::Char('b') => app.generate_brief(),
        KeyCode::Char('e') => app.export_report(),
        KeyCode::Char('a') => app.approve_draft(),
        KeyCode::Char('r') => app.reject_draft(),

        // Half-page scroll
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.send_message();
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        _ => {
            edit_line(&mut app.input, &mut app.input_cursor, key);
        }
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("héllo", 10), 6);
    }

    #[test]
    fn test_edit_line_insert_and_delete() {
        let mut text = String::new();
        let mut cursor = 0;
        for c in "risks".chars() {
            assert!(edit_line(&mut text, &mut cursor, key(KeyCode::Char(c))));
        }
        assert_eq!(text, "risks");

        edit_line(&mut text, &mut cursor, key(KeyCode::Home));
        edit_line(&mut text, &mut cursor, key(KeyCode::Delete));
        assert_eq!(text, "isks");

        edit_line(&mut text, &mut cursor, key(KeyCode::End));
        edit_line(&mut text, &mut cursor, key(KeyCode::Backspace));
        assert_eq!(text, "isk");
        assert_eq!(cursor, 3);

        assert!(!edit_line(&mut text, &mut cursor, key(KeyCode::F(1))));
    }

    #[test]
    fn test_edit_line_utf8_cursor() {
        let mut text = "coût".to_string();
        let mut cursor = 4;
        edit_line(&mut text, &mut cursor, key(KeyCode::Left));
        edit_line(&mut text, &mut cursor, key(KeyCode::Backspace));
        assert_eq!(text, "cot");
        assert_eq!(cursor, 2);
    }

    #[test]
    fn test_ctrl_u_clears_before_cursor() {
        let mut text = "/tmp/rfp.pdf".to_string();
        let mut cursor = 5;
        edit_line(
            &mut text,
            &mut cursor,
            KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL),
        );
        assert_eq!(text, "rfp.pdf");
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_point_in_rect() {
        let rect = Rect::new(2, 2, 4, 4);
        assert!(point_in_rect(2, 2, rect));
        assert!(!point_in_rect(6, 2, rect));
    }
}
