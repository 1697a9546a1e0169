//! Tokio driver for the polling state machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::{Effect, PollingSession};
use super::transport::CheckTransport;
use crate::config::PollingConfig;
use crate::error::ClientError;
use crate::pipeline::ResultMessage;

/// Inputs to the driver.
#[derive(Debug)]
pub enum ClientEvent {
    Submit { email: String, password: String },
    Tick,
    Visibility(bool),
    Unload,
    Response {
        initial: bool,
        result: Result<Vec<ResultMessage>, ClientError>,
    },
}

/// Where the client shows results.
pub trait ClientView: Send {
    fn render(&mut self, messages: &[ResultMessage]);
    fn append(&mut self, messages: &[ResultMessage]);
    fn notify(&mut self, count: usize);
    fn show_error(&mut self, message: &str);
    fn clear_error(&mut self) {}
}

/// Prints to the terminal.
#[derive(Debug, Default)]
pub struct TerminalView;

impl TerminalView {
    fn print(msg: &ResultMessage) {
        println!(
            "[{}] {} | {}",
            msg.date.format("%Y-%m-%d %H:%M"),
            msg.from,
            msg.subject
        );
        for line in msg.text.lines().take(5) {
            println!("    {line}");
        }
    }
}

impl ClientView for TerminalView {
    fn render(&mut self, messages: &[ResultMessage]) {
        if messages.is_empty() {
            println!("No messages yet.");
        }
        messages.iter().for_each(Self::print);
    }

    fn append(&mut self, messages: &[ResultMessage]) {
        messages.iter().for_each(Self::print);
    }

    fn notify(&mut self, count: usize) {
        println!("*** {count} new message(s) ***");
    }

    fn show_error(&mut self, message: &str) {
        eprintln!("Error: {message}");
    }
}

pub struct ClientRunner<V: ClientView> {
    session: PollingSession,
    transport: Arc<dyn CheckTransport>,
    view: V,
    tx: mpsc::UnboundedSender<ClientEvent>,
    rx: mpsc::UnboundedReceiver<ClientEvent>,
    timer: Option<JoinHandle<()>>,
}

impl<V: ClientView> ClientRunner<V> {
    pub fn new(cadence: PollingConfig, transport: Arc<dyn CheckTransport>, view: V) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session: PollingSession::new(cadence),
            transport,
            view,
            tx,
            rx,
            timer: None,
        }
    }

    /// Handle for feeding events (submit, visibility, unload) into the loop.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.tx.clone()
    }

    pub fn session(&self) -> &PollingSession {
        &self.session
    }

    /// Process events until the client is unloaded and no request is pending.
    /// Returns the view.
    pub async fn run(mut self) -> V {
        while let Some(event) = self.rx.recv().await {
            let effects = match event {
                ClientEvent::Submit { email, password } => {
                    match self.session.submit(&email, &password) {
                        Ok(effects) => effects,
                        Err(e) => vec![Effect::ShowError(e.to_string())],
                    }
                }
                ClientEvent::Tick => self.session.tick(),
                ClientEvent::Visibility(visible) => self.session.visibility_changed(visible),
                ClientEvent::Unload => self.session.unload(),
                ClientEvent::Response { initial, result } => {
                    self.session.on_response(initial, result)
                }
            };

            for effect in effects {
                self.apply(effect);
            }

            if self.session.is_unloaded() && !self.session.is_in_flight() {
                break;
            }
        }

        self.stop_timer();
        info!("Polling client stopped");
        self.view
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Request {
                credentials,
                polling,
            } => {
                let transport = Arc::clone(&self.transport);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = transport
                        .check(&credentials.email, &credentials.password, polling)
                        .await;
                    let _ = tx.send(ClientEvent::Response {
                        initial: !polling,
                        result,
                    });
                });
            }
            Effect::StartTimer(period) => {
                self.stop_timer();
                debug!(period_secs = period.as_secs(), "Polling timer started");
                self.timer = Some(spawn_ticker(self.tx.clone(), period));
            }
            Effect::StopTimer => self.stop_timer(),
            Effect::Render(messages) => self.view.render(&messages),
            Effect::Append(messages) => self.view.append(&messages),
            Effect::Notify { count } => {
                info!(count, "New messages");
                self.view.notify(count);
            }
            Effect::ShowError(message) => self.view.show_error(&message),
            Effect::ClearError => self.view.clear_error(),
            Effect::PollFailed(e) => warn!(error = %e, "Poll failed, will retry"),
        }
    }

    fn stop_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

fn spawn_ticker(tx: mpsc::UnboundedSender<ClientEvent>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            interval.tick().await;
            if tx.send(ClientEvent::Tick).is_err() {
                break;
            }
        }
    })
}
