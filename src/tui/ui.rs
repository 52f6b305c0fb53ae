use super::{ConfirmState, SelectState};
use ratatui::{
    Frame,
    layout::{Constraint, Layout},
    style::{Style, Stylize},
    text::{Line, Text},
    widgets::{Block, Paragraph, Row, Table},
};

pub fn view_select(state: &mut SelectState, frame: &mut Frame) {
    const COLUMNS: usize = 6;

    let [top, bottom] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(frame.area());

    let table = Table::new(
        state.devices.iter().enumerate().map(|(i, d)| {
            Row::new::<[String; COLUMNS]>([
                (i + 1).to_string(),
                d.path().display().to_string(),
                d.model().unwrap_or_default().to_string(),
                format!("{:#.1}", d.size()),
                d.label().unwrap_or_default().to_string(),
                d.mount_point()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ])
        }),
        [
            Constraint::Length(3),
            Constraint::Fill(2),
            Constraint::Fill(3),
            Constraint::Fill(1),
            Constraint::Fill(1),
            Constraint::Fill(2),
        ],
    )
    .header(
        Row::new::<[&'static str; COLUMNS]>(["#", "Path", "Model", "Size", "Label", "Mount"])
            .style(Style::new().bold()),
    )
    .row_highlight_style(Style::new().reversed())
    .block(Block::bordered().title("Removable devices"));

    frame.render_stateful_widget(table, top, &mut state.table);
    match &state.status {
        Some(status) => frame.render_widget(Text::raw(status.as_str()).red(), bottom),
        None => frame.render_widget(
            Text::raw("Esc/q: Quit | Up/Down or 1-9: Change selection | Enter: Select"),
            bottom,
        ),
    }
}

pub fn view_confirm(state: &mut ConfirmState, frame: &mut Frame) {
    let [top, label_area, bottom] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let mut lines = vec![
        Line::from(format!("Everything on {} will be erased.", state.target)).bold(),
        Line::raw(""),
    ];
    lines.extend(state.details.iter().map(|d| Line::raw(d.as_str())));
    if !state.warnings.is_empty() {
        lines.push(Line::raw(""));
        lines.extend(
            state
                .warnings
                .iter()
                .map(|w| Line::from(format!("Warning: {w}")).yellow()),
        );
    }
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title(format!("Format {}", state.target))),
        top,
    );

    let help = match &state.input {
        Some(input) => {
            let block = Block::bordered().title("Volume label (up to 11 characters)");
            frame.render_widget(Paragraph::new(input.value()).block(block), label_area);
            frame.set_cursor_position((
                label_area.x + 1 + input.visual_cursor() as u16,
                label_area.y + 1,
            ));
            "Enter: Accept label | Esc: Cancel"
        }
        None => {
            let block = Block::bordered().title("Volume label");
            frame.render_widget(
                Paragraph::new(state.label.as_str()).block(block),
                label_area,
            );
            "y: Format | e: Edit label | n/Esc: Cancel"
        }
    };
    frame.render_widget(Text::raw(help), bottom);
}
