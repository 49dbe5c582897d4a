mod bar;
mod popup;
mod session;
mod table;
mod worker;

use crate::{
    session::Session,
    worker::{Response, Worker},
};
use anyhow::{Context, Result};
use clap::Parser;
use futures::{StreamExt, future::FutureExt};
use lambda_mini::serial::{self, DEFAULT_BAUD_RATE};
use log::error;
use ratatui::{
    DefaultTerminal,
    buffer::Buffer,
    crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers},
    layout::{Constraint, Flex, Layout, Margin, Position, Rect},
    style::Stylize,
    text::Line,
    widgets::{Block, BorderType, Borders, Padding, StatefulWidget, Widget},
};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{self, Duration, MissedTickBehavior},
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port path (e.g. /dev/ttyUSB0)
    serial_port: String,

    /// Baud rate of the serial port
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Read timeout in milliseconds
    #[arg(short, long, default_value = "1000")]
    timeout_ms: u64,

    /// Interval between status refreshes in seconds
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    refresh_secs: u64,
}

#[derive(Default, Debug)]
struct App {
    session: Option<Session>,
    message: Option<String>,
    closing: bool,
    worker_exited: bool,
    should_exit: bool,
}

impl App {
    async fn run(
        &mut self,
        mut rx: UnboundedReceiver<Response>,
        refresh: Duration,
        term: &mut DefaultTerminal,
    ) -> Result<()> {
        let mut events = EventStream::new();
        let mut interval = time::interval(refresh);

        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.should_exit {
            // Draw terminal widgets
            term.draw(|frame| {
                let mut cursor_pos = None;

                frame.render_stateful_widget(&*self, frame.area(), &mut cursor_pos);

                if let Some(pos) = cursor_pos {
                    frame.set_cursor_position(pos);
                }
            })?;

            // Handle terminal events, worker responses and periodic refreshes
            tokio::select! {
                Some(evt) = events.next().fuse() => self
                    .handle_event(&evt?).context("Failed to handle event")?,
                resp = rx.recv(), if !self.worker_exited => match resp {
                    Some(resp) => self.handle_worker_response(resp),
                    None => self.handle_worker_exit(),
                },
                _ = interval.tick() => self.refresh().context("Failed to refresh readings")?,
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: &Event) -> Result<()> {
        if let Some(sess) = &mut self.session
            && !self.closing
            && sess.handle_event(event)?
        {
            // Event was handled by session
            return Ok(());
        }

        if let Some(KeyEvent {
            code, modifiers, ..
        }) = event.as_key_press_event()
        {
            match code {
                KeyCode::Char('q') => self.quit()?,
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.quit()?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn handle_worker_response(&mut self, resp: Response) {
        match resp {
            Response::Connected(snapshot, tx) => {
                self.session = Some(Session::create(*snapshot, tx));
            }
            Response::ConnectionFailed(msg) => {
                self.message = Some(format!("Failed to connect: {msg}"));
            }
            Response::Closed => {
                self.session = None;
                self.should_exit = true;
            }
            _ => {
                if let Some(sess) = &mut self.session {
                    sess.handle_worker_response(resp);
                }
            }
        }
    }

    fn handle_worker_exit(&mut self) {
        self.worker_exited = true;
        self.should_exit = self.closing;

        if self.session.take().is_some() {
            self.message = Some("Connection lost".to_string());
        }
    }

    fn refresh(&mut self) -> Result<()> {
        if let Some(sess) = &mut self.session
            && !self.closing
        {
            sess.refresh()?;
        }

        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        match &mut self.session {
            // Wait for the worker to switch off the laser
            Some(sess) if !self.closing => {
                sess.shutdown()?;
                self.closing = true;
            }
            Some(_) => {}
            None => self.should_exit = true,
        }

        Ok(())
    }
}

impl StatefulWidget for &App {
    type State = Option<Position>;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let area = area.inner(Margin::new(1, 0));
        let block = Block::bordered()
            .borders(Borders::TOP)
            .border_type(BorderType::Double)
            .padding(Padding::top(1))
            .title(
                Line::from(vec![
                    " ".into(),
                    "lambda mini TUI ".into(),
                    env!("CARGO_PKG_VERSION").into(),
                    " ".into(),
                ])
                .bold()
                .centered(),
            );
        let inner = block.inner(area);

        if let Some(sess) = &self.session
            && !self.closing
        {
            // Session might set cursor position state
            sess.render(inner, buf, state);
        } else {
            let [center] = Layout::vertical([Constraint::Length(1)])
                .flex(Flex::Center)
                .areas(inner);
            let msg = if self.closing {
                "Disabling laser and closing connection..."
            } else {
                self.message
                    .as_deref()
                    .unwrap_or("Connecting to controller...")
            };

            msg.bold().into_centered_line().render(center, buf);
        }

        block.render(area, buf);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let port = serial::open(
        &args.serial_port,
        args.baud,
        Duration::from_millis(args.timeout_ms),
    )
    .context("Failed to open serial port")?;
    let (rx, worker) = Worker::start(port);
    let mut term = ratatui::init();
    let mut app = App::default();
    let res = app
        .run(rx, Duration::from_secs(args.refresh_secs), &mut term)
        .await;

    ratatui::restore();

    // Worker switches off the laser once the session is gone
    drop(app);

    if worker.join().is_err() {
        error!("Controller worker panicked");
    }

    res
}
