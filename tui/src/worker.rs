use crate::bar::Action;
use anyhow::{Context, Result};
use lambda_mini::{
    Laser,
    embedded_io::{Read, Write},
    laser::Snapshot,
    record::{LaserError, Power, Status, Temperature},
};
use log::debug;
use std::{
    error::Error,
    thread::{self, JoinHandle},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug)]
pub enum Request {
    Refresh,
    Enable,
    Disable,
    SetPower(f32),
    Shutdown,
}

/// Readings refreshed periodically.
#[derive(Debug)]
pub struct Reading {
    pub status: Status,
    pub temperature: Temperature,
    pub power: Power,
    pub error: Option<LaserError>,
}

#[derive(Debug)]
pub enum Response {
    Connected(Box<Snapshot>, UnboundedSender<Request>),
    ConnectionFailed(String),
    Updated(Reading),
    RefreshFailed(String),
    ActionFailed(Action, String),
    Closed,
}

pub struct Worker<'a, P> {
    laser: Laser<P>,
    tx: &'a UnboundedSender<Response>,
}

impl<P> Worker<'_, P>
where
    P: Read + Write + Send + 'static,
    P::Error: Error + Send + Sync + 'static,
{
    /// Spawns the worker thread owning the connection.
    ///
    /// Blocking device I/O never runs on the UI event loop.
    /// The thread switches the laser off before it ends, also when the UI is gone.
    pub fn start(port: P) -> (UnboundedReceiver<Response>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = thread::spawn(move || {
            let (laser, snapshot) = match connect(port) {
                Ok(res) => res,
                Err(err) => {
                    debug!("Error connecting to controller: {err:#}");
                    let _ = tx.send(Response::ConnectionFailed(format!("{err:#}")));

                    return;
                }
            };
            let mut worker = Worker { laser, tx: &tx };

            if let Err(err) = worker.run(snapshot) {
                debug!("Error running controller worker: {err:#}");

                if worker.laser.is_open()
                    && let Err(err) = worker.shutdown()
                {
                    debug!("Error shutting down controller: {err:#}");
                }
            }
        });

        (rx, handle)
    }

    fn run(&mut self, snapshot: Snapshot) -> Result<()> {
        let (dev_tx, mut dev_rx) = mpsc::unbounded_channel();

        self.tx.send(Response::Connected(Box::new(snapshot), dev_tx))?;

        // Handle incoming requests until shutdown or until the UI is gone
        while let Some(req) = dev_rx.blocking_recv() {
            match req {
                Request::Refresh => self.refresh()?,
                Request::Enable => self.trigger(Action::Enable, Laser::enable)?,
                Request::Disable => self.trigger(Action::Disable, Laser::disable)?,
                Request::SetPower(milliwatts) => self.trigger(Action::SetPower, |laser| {
                    laser.set_power(milliwatts).map(|_| ())
                })?,
                Request::Shutdown => break,
            }
        }

        let res = self.shutdown();

        // UI might already be gone
        let _ = self.tx.send(Response::Closed);

        res
    }

    /// Reads fresh readings and reports them to the UI.
    ///
    /// Failed exchanges are reported, the connection stays open.
    fn refresh(&mut self) -> Result<()> {
        let resp = match self.read() {
            Ok(reading) => Response::Updated(reading),
            Err(err) => {
                debug!("Error refreshing readings: {err}");
                Response::RefreshFailed(err.to_string())
            }
        };

        self.tx.send(resp)?;

        Ok(())
    }

    fn read(&mut self) -> lambda_mini::Result<Reading, P::Error> {
        Ok(Reading {
            status: self.laser.query_status()?,
            temperature: self.laser.query_temperature()?,
            power: self.laser.query_power_info()?,
            error: self.laser.query_error()?,
        })
    }

    fn trigger(
        &mut self,
        action: Action,
        op: impl FnOnce(&mut Laser<P>) -> lambda_mini::Result<(), P::Error>,
    ) -> Result<()> {
        if let Err(err) = op(&mut self.laser) {
            debug!("Error triggering {action} action: {err}");
            self.tx.send(Response::ActionFailed(action, err.to_string()))?;
        }

        // Show the effect of the action right away
        self.refresh()
    }

    /// Switches the laser off and closes the connection.
    ///
    /// The laser is switched off unless a fresh status shows it is already off.
    fn shutdown(&mut self) -> Result<()> {
        let on = self
            .laser
            .query_status()
            .map_or(true, |status| status.contains(Status::LaserOn));

        let res = if on {
            self.laser.disable().context("Failed to disable laser")
        } else {
            Ok(())
        };

        self.laser.close()?;

        res
    }
}

fn connect<P>(port: P) -> Result<(Laser<P>, Snapshot)>
where
    P: Read + Write,
    P::Error: Error + Send + Sync + 'static,
{
    let mut laser = Laser::connect(port).context("Failed to initialize controller")?;
    let snapshot = laser
        .query_snapshot()
        .context("Failed to query controller")?;

    Ok((laser, snapshot))
}
