use ratatui::{
    buffer::Buffer,
    crossterm::event::{Event, KeyCode, KeyEvent},
    layout::Rect,
    style::Stylize,
    text::Line,
    widgets::Widget,
};
use std::fmt::{Display, Formatter};

/// User action, mapped to a function key by its position in [`Action::ALL`].
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Action {
    Enable,
    Disable,
    SetPower,
    Refresh,
}

impl Action {
    pub const ALL: [Self; 4] = [Self::Enable, Self::Disable, Self::SetPower, Self::Refresh];

    pub fn name(self) -> &'static str {
        match self {
            Self::Enable => "Enable Laser",
            Self::Disable => "Disable Laser",
            Self::SetPower => "Set Power",
            Self::Refresh => "Refresh",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct CommandBar;

impl CommandBar {
    pub fn event_to_action(event: &Event) -> Option<Action> {
        if let Some(KeyEvent {
            code: KeyCode::F(key),
            ..
        }) = event.as_key_press_event()
        {
            Action::ALL.get(usize::from(key).checked_sub(1)?).copied()
        } else {
            None
        }
    }
}

impl Widget for &CommandBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let len = Action::ALL.len();
        let spans = Action::ALL
            .iter()
            .enumerate()
            .flat_map(|(i, action)| {
                // Map actions to function keys
                let name = action.name().into();
                let key = format!("<F{}>", i + 1).bold();

                if i + 1 == len {
                    [name, " ".into(), key, "".into()]
                } else {
                    [name, " ".into(), key, " | ".into()]
                }
            })
            .collect::<Vec<_>>();

        Line::from(spans).render(area, buf);
    }
}
