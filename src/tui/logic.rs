use super::{ConfirmState, SelectState};
use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui_elm::{Task, Update};
use tui_input::{Input, backend::crossterm::EventHandler};
use usb_format::{Error, VolumeLabel};

type Message = ();

/// The `number`th item, counting from 1 as shown on screen.
///
/// Digit keys only reach items 1 to 9; rows further down are selected with the arrows.
pub fn pick<T>(items: &[T], number: usize) -> Result<&T, Error> {
    number
        .checked_sub(1)
        .and_then(|i| items.get(i))
        .ok_or(Error::InvalidSelection {
            index: number,
            count: items.len(),
        })
}

pub fn update_select(state: &mut SelectState, update: Update<Message>) -> (Task<Message>, bool) {
    let Update::Terminal(Event::Key(KeyEvent { code, .. })) = update else {
        return (Task::None, false);
    };

    match code {
        KeyCode::Char('q') | KeyCode::Esc => (Task::Quit, false),
        KeyCode::Up => {
            state.table.scroll_up_by(1);
            (Task::None, true)
        }
        KeyCode::Down => {
            state.table.scroll_down_by(1);
            (Task::None, true)
        }
        KeyCode::Char(c) if c.is_ascii_digit() => {
            let number = c.to_digit(10).unwrap_or_default() as usize;
            match pick(&state.devices, number) {
                Ok(_) => {
                    state.table.select(Some(number - 1));
                    state.status = None;
                }
                Err(e) => state.status = Some(e.to_string()),
            }
            (Task::None, true)
        }
        KeyCode::Enter => {
            let number = state.table.selected().map_or(0, |i| i + 1);
            match pick(&state.devices, number) {
                Ok(device) => {
                    let _ = state.tx.send(device.path().to_path_buf());
                    (Task::Quit, false)
                }
                Err(e) => {
                    state.status = Some(e.to_string());
                    (Task::None, true)
                }
            }
        }
        _ => (Task::None, false),
    }
}

pub fn update_confirm(state: &mut ConfirmState, update: Update<Message>) -> (Task<Message>, bool) {
    let Update::Terminal(event) = update else {
        return (Task::None, false);
    };
    let Event::Key(KeyEvent { code, .. }) = event else {
        return (Task::None, false);
    };

    if let Some(input) = &mut state.input {
        return match code {
            KeyCode::Esc => (Task::Quit, false),
            KeyCode::Enter => {
                state.label = VolumeLabel::new(input.value());
                state.input = None;
                (Task::None, true)
            }
            _ => (Task::None, input.handle_event(&event).is_some()),
        };
    }

    match code {
        KeyCode::Char('y' | 'Y') => {
            let _ = state.tx.send(state.label.clone());
            (Task::Quit, false)
        }
        KeyCode::Char('e') => {
            state.input = Some(Input::new(state.label.to_string()));
            (Task::None, true)
        }
        KeyCode::Char('n' | 'N' | 'q') | KeyCode::Esc => (Task::Quit, false),
        _ => (Task::None, false),
    }
}
