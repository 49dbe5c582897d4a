use crate::bar::Action;
use ratatui::{
    buffer::Buffer,
    crossterm::event::{Event, KeyCode, KeyEvent},
    layout::{Constraint, Layout, Margin, Position, Rect},
    style::Stylize,
    text::Line,
    widgets::{Block, BorderType, Clear, Padding, Paragraph, StatefulWidget, Widget, Wrap},
};
use tui_input::{Input, backend::crossterm::EventHandler};

#[derive(Debug)]
pub enum State {
    Open,
    Confirmed,
    Dismissed,
}

#[derive(Debug)]
pub enum Popup {
    TriggerAction(Action),
    SetPower(Input, f32),
    InvalidPowerArgument,
    ActionFailed(Action, String),
}

impl Popup {
    pub fn handle_event(&mut self, event: &Event) -> State {
        if let Some(KeyEvent { code, .. }) = event.as_key_press_event() {
            match code {
                KeyCode::Enter => {
                    return State::Confirmed;
                }
                KeyCode::Esc => {
                    return State::Dismissed;
                }
                _ => {}
            }
        }

        if let Self::SetPower(input, _) = self {
            input.handle_event(event);
        }

        State::Open
    }

    fn render_set_power_prompt(
        area: Rect,
        buf: &mut Buffer,
        max_power: f32,
        input: &Input,
    ) -> Position {
        let par = Paragraph::new(vec![
            Line::from(vec![
                "Please specify the output power in percent of the maximum of ".into(),
                format!("{max_power:.2} mW").bold(),
                ".".into(),
            ]),
            Line::default(),
            Line::from(vec!["Possible values: ".into(), "0 to 100".bold(), ".".into()]),
        ])
        .wrap(Wrap { trim: false });

        // Split message into multiple lines if too long
        let width = par.line_width().min(area.width.saturating_sub(50) as usize);
        let lines = par.line_count(width as u16);

        let inner = Self::render_popup(area, buf, "Set power", width, lines + 2);
        let [top, bottom] =
            Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(inner);

        par.render(top, buf);
        input.value().render(bottom, buf);

        (bottom.x + input.visual_cursor() as u16, bottom.y).into()
    }

    fn render_trigger_action(area: Rect, buf: &mut Buffer, action: Action) {
        let msg = Line::from(vec![
            "Press enter to trigger the ".into(),
            action.name().bold(),
            " action.".into(),
        ]);
        let inner = Self::render_popup(area, buf, "Trigger action", msg.width(), 1);

        msg.render(inner, buf);
    }

    fn render_message(area: Rect, buf: &mut Buffer, title: &str, lines: Vec<Line>) {
        let par = Paragraph::new(lines).wrap(Wrap { trim: false });
        let width = par.line_width().min(area.width.saturating_sub(20) as usize);
        let height = par.line_count(width as u16);
        let inner = Self::render_popup(area, buf, title, width, height);

        par.render(inner, buf);
    }

    fn render_popup(
        area: Rect,
        buf: &mut Buffer,
        title: &str,
        width: usize,
        height: usize,
    ) -> Rect {
        // Increase size by block padding and border
        let pad = Padding::proportional(1);
        let width = (width as u16) + pad.left + pad.right + 2;
        let height = (height as u16) + pad.top + pad.bottom + 2;
        let popup = area.centered(Constraint::Length(width), Constraint::Length(height));
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .padding(pad)
            .title(Line::from(vec![" ".into(), title.bold(), " ".into()]).centered());
        let inner = block.inner(popup);

        // Clear area around the block with additional margin
        Clear.render(popup.outer(Margin::new(2, 1)), buf);
        block.render(popup, buf);

        inner
    }
}

impl StatefulWidget for &Popup {
    type State = Option<Position>;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        match self {
            Popup::TriggerAction(action) => Popup::render_trigger_action(area, buf, *action),
            Popup::SetPower(input, max_power) => {
                // Update state with current input prompt cursor position
                *state = Some(Popup::render_set_power_prompt(
                    area, buf, *max_power, input,
                ));
            }
            Popup::InvalidPowerArgument => Popup::render_message(
                area,
                buf,
                "Action failed",
                vec![Line::from(vec![
                    "The specified power is invalid. Use a percentage from ".into(),
                    "0 to 100".bold(),
                    ".".into(),
                ])],
            ),
            Popup::ActionFailed(action, msg) => Popup::render_message(
                area,
                buf,
                "Action failed",
                vec![
                    Line::from(vec![
                        "The ".into(),
                        action.name().bold(),
                        " action failed.".into(),
                    ]),
                    Line::default(),
                    Line::from(msg.as_str()),
                ],
            ),
        }
    }
}
