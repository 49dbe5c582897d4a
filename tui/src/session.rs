use crate::{
    bar::{Action, CommandBar},
    popup::{Popup, State},
    table::{Cell, RecordTable},
    worker::{Reading, Request, Response},
};
use anyhow::Result;
use lambda_mini::{
    laser::Snapshot,
    record::{DeviceInfo, Status},
};
use ratatui::{
    buffer::Buffer,
    crossterm::event::Event,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Stylize},
    text::Line,
    widgets::{Block, Borders, Padding, StatefulWidget, Widget},
};
use tokio::sync::mpsc::UnboundedSender;
use tui_input::Input;

#[derive(Debug)]
pub struct Session {
    info: DeviceInfo,
    reading: Reading,
    info_table: RecordTable,
    status_table: RecordTable,
    temperature_table: RecordTable,
    power_table: RecordTable,
    popup: Option<Popup>,
    warning: Option<String>,
    update_counter: usize,
    tx: UnboundedSender<Request>,
}

impl Session {
    pub fn create(snapshot: Snapshot, tx: UnboundedSender<Request>) -> Self {
        let Snapshot {
            info,
            status,
            temperature,
            power,
            error,
        } = snapshot;
        let mut sess = Session {
            info,
            reading: Reading {
                status,
                temperature,
                power,
                error,
            },
            info_table: RecordTable::new("Device Information", Color::Green),
            status_table: RecordTable::new("Status", Color::Red),
            temperature_table: RecordTable::new("Temperature", Color::Blue),
            power_table: RecordTable::new("Power", Color::Magenta),
            popup: None,
            warning: None,
            update_counter: 0,
            tx,
        };

        sess.update_info_table();
        sess.update_reading_tables();

        sess
    }

    pub fn handle_event(&mut self, event: &Event) -> Result<bool> {
        if let Some(popup) = &mut self.popup {
            match popup.handle_event(event) {
                State::Dismissed => {
                    self.popup = None;
                }
                State::Confirmed => {
                    self.popup = match popup {
                        Popup::TriggerAction(action) => {
                            let action = *action;

                            self.trigger_action(action)?;
                            None
                        }
                        Popup::SetPower(input, max_power) => {
                            match Self::parse_percent(input.value()) {
                                Some(percent) => {
                                    self.tx
                                        .send(Request::SetPower(*max_power * percent / 100.0))?;
                                    None
                                }
                                None => Some(Popup::InvalidPowerArgument),
                            }
                        }
                        _ => None,
                    };
                }
                State::Open => {}
            }

            Ok(true)
        } else if let Some(action) = CommandBar::event_to_action(event) {
            match action {
                Action::SetPower => {
                    self.popup = Some(Popup::SetPower(
                        Input::default(),
                        self.reading.power.max,
                    ));
                }
                Action::Refresh => self.refresh()?,
                _ => self.popup = Some(Popup::TriggerAction(action)),
            }

            Ok(true)
        } else {
            // Event wasn't handled
            Ok(false)
        }
    }

    pub fn handle_worker_response(&mut self, resp: Response) {
        match resp {
            Response::Updated(reading) => {
                self.reading = reading;
                self.warning = None;
                self.update_reading_tables();
            }
            Response::RefreshFailed(msg) => {
                self.warning = Some(format!("Readings not updated: {msg}"));
            }
            Response::ActionFailed(action, msg) => {
                self.popup = Some(Popup::ActionFailed(action, msg));
            }
            _ => {}
        }
    }

    /// Requests fresh readings from the worker.
    pub fn refresh(&mut self) -> Result<()> {
        self.tx.send(Request::Refresh)?;
        self.update_counter += 1;

        Ok(())
    }

    /// Requests the worker to switch off the laser and close the connection.
    pub fn shutdown(&mut self) -> Result<()> {
        self.popup = None;
        self.tx.send(Request::Shutdown)?;

        Ok(())
    }

    fn trigger_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Enable => self.tx.send(Request::Enable)?,
            Action::Disable => self.tx.send(Request::Disable)?,
            Action::SetPower | Action::Refresh => return self.refresh(),
        }

        Ok(())
    }

    fn parse_percent(val: &str) -> Option<f32> {
        val.trim()
            .trim_end_matches('%')
            .parse()
            .ok()
            .filter(|percent| (0.0..=100.0).contains(percent))
    }

    fn update_info_table(&mut self) {
        let info = &self.info;
        let total_mins = info.operating_time.as_secs() / 60;

        self.info_table.update(vec![
            ("Manufacturer", info.manufacturer.as_str().into()),
            ("Model", info.model.as_str().into()),
            ("Serial Number", info.serial_number.as_str().into()),
            ("Firmware Version", info.firmware.as_str().into()),
            ("Wavelength", format!("{:.0} nm", info.wavelength).into()),
            (
                "Operating Time",
                format!("{}h {}min", total_mins / 60, total_mins % 60).into(),
            ),
            ("Features", info.features.as_str().into()),
            ("Control Mode", info.control.to_string().into()),
        ]);
    }

    fn update_reading_tables(&mut self) {
        let Reading {
            status,
            temperature,
            power,
            error,
        } = &self.reading;
        let yes_no = |flag: Status| if status.contains(flag) { "Yes" } else { "No" };
        let mut status_rows: Vec<(&'static str, Cell)> = vec![
            ("Laser On", yes_no(Status::LaserOn).into()),
            ("Interlock Open", yes_no(Status::InterlockOpen).into()),
            ("Temperature OK", yes_no(Status::TemperatureOk).into()),
            (
                "Error",
                error
                    .as_ref()
                    .map_or_else(|| "None".to_string(), ToString::to_string)
                    .into(),
            ),
        ];

        if status.unknown_bits() != 0 {
            status_rows.push((
                "Other Flags",
                format!("0x{:04x}", status.unknown_bits()).into(),
            ));
        }

        self.status_table.update(status_rows);
        self.temperature_table.update(vec![
            (
                "Current",
                Cell::range(
                    format!("{:.1} °C", temperature.current),
                    temperature.current,
                    temperature.min,
                    temperature.max,
                ),
            ),
            ("Lower Limit", format!("{:.1} °C", temperature.min).into()),
            ("Upper Limit", format!("{:.1} °C", temperature.max).into()),
        ]);
        self.power_table.update(vec![
            (
                "Setting",
                Cell::Gauge(
                    format!("{:.2} / {:.2} mW", power.current, power.max),
                    power.ratio(),
                ),
            ),
            ("Minimum", format!("{:.2} mW", power.min).into()),
            ("Maximum", format!("{:.2} mW", power.max).into()),
        ]);
    }

    fn render_tables(&self, area: Rect, buf: &mut Buffer) {
        let [top, bottom] = Layout::vertical(vec![Constraint::Fill(1); 2])
            .spacing(1)
            .areas(area);
        let [top_left, top_right] = Layout::horizontal(vec![Constraint::Fill(1); 2])
            .spacing(2)
            .areas(top);
        let [bottom_left, bottom_right] = Layout::horizontal(vec![Constraint::Fill(1); 2])
            .spacing(2)
            .areas(bottom);

        self.info_table.render(top_left, buf);
        self.status_table.render(bottom_left, buf);
        self.temperature_table.render(top_right, buf);
        self.power_table.render(bottom_right, buf);
    }

    fn render_bar(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered()
            .borders(Borders::TOP)
            .padding(Padding::proportional(1))
            .title("Actions ".bold())
            .title(
                Line::from(vec![
                    " ".into(),
                    self.info.model.as_str().into(),
                    ", Serial Number: ".into(),
                    self.info.serial_number.as_str().into(),
                    " ".into(),
                    self.spinner().green(),
                    " ".into(),
                ])
                .bold()
                .right_aligned(),
            );
        let block = match &self.warning {
            Some(msg) => block.title(Line::from(format!(" {msg} ")).red().bold().centered()),
            None => block,
        };

        CommandBar.render(block.inner(area), buf);
        block.render(area, buf);
    }

    fn spinner(&self) -> String {
        let symbols = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
        let index = self.update_counter % symbols.len();

        symbols[index].to_string()
    }
}

impl StatefulWidget for &Session {
    type State = Option<Position>;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let [top, bottom] = Layout::vertical([Constraint::Fill(1), Constraint::Length(4)])
            .spacing(1)
            .areas(area);

        self.render_tables(top, buf);
        self.render_bar(bottom, buf);

        if let Some(popup) = &self.popup {
            // Pass cursor position state to popup
            popup.render(top, buf, state);
        }
    }
}
