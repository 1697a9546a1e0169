//! Polling client state machine.
//!
//! Pure: every input event returns the effects the driver must carry out.
//! Nothing here touches the network or the clock.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::PollingConfig;
use crate::error::ClientError;
use crate::pipeline::ResultMessage;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    /// Initial check in flight.
    Checking,
    /// Polling at the foreground cadence.
    Polling,
    /// Polling at the background cadence.
    PollingPaused,
}

/// Alias and password the client polls with.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Work the driver performs on behalf of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a check request; `polling` marks a timer-driven one.
    Request {
        credentials: Credentials,
        polling: bool,
    },
    /// Replace any running timer with one firing every `Duration`.
    StartTimer(Duration),
    StopTimer,
    /// Replace the displayed list.
    Render(Vec<ResultMessage>),
    /// Add newly arrived messages to the displayed list.
    Append(Vec<ResultMessage>),
    Notify { count: usize },
    ShowError(String),
    ClearError,
    /// A timer-driven request failed; polling carries on.
    PollFailed(ClientError),
}

#[derive(Debug)]
pub struct PollingSession {
    cadence: PollingConfig,
    state: PollState,
    credentials: Option<Credentials>,
    visible: bool,
    polling: bool,
    timer: Option<Duration>,
    last_count: usize,
    in_flight: bool,
    unloaded: bool,
}

impl PollingSession {
    pub fn new(cadence: PollingConfig) -> Self {
        Self {
            cadence,
            state: PollState::Idle,
            credentials: None,
            visible: true,
            polling: false,
            timer: None,
            last_count: 0,
            in_flight: false,
            unloaded: false,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Cadence of the running timer, if any.
    pub fn timer(&self) -> Option<Duration> {
        self.timer
    }

    pub fn last_count(&self) -> usize {
        self.last_count
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    fn current_cadence(&self) -> Duration {
        if self.visible {
            self.cadence.foreground
        } else {
            self.cadence.background
        }
    }

    fn polling_state(&self) -> PollState {
        if self.visible {
            PollState::Polling
        } else {
            PollState::PollingPaused
        }
    }

    /// User asks for an initial check.
    pub fn submit(&mut self, email: &str, password: &str) -> Result<Vec<Effect>, ClientError> {
        let email = email.trim();
        let password = password.trim();

        if email.is_empty() {
            return Err(ClientError::Validation("email address is required".into()));
        }
        if !EMAIL_SHAPE.is_match(email) {
            return Err(ClientError::Validation(
                "please enter a valid email address".into(),
            ));
        }
        if password.is_empty() {
            return Err(ClientError::Validation("access password is required".into()));
        }

        if self.in_flight || self.unloaded {
            return Ok(Vec::new());
        }

        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.credentials = Some(credentials.clone());
        self.state = PollState::Checking;
        self.in_flight = true;

        Ok(vec![
            Effect::ClearError,
            Effect::Request {
                credentials,
                polling: false,
            },
        ])
    }

    /// The polling timer fired.
    pub fn tick(&mut self) -> Vec<Effect> {
        if self.in_flight || self.unloaded {
            return Vec::new();
        }
        let Some(credentials) = self.credentials.clone() else {
            return Vec::new();
        };

        self.in_flight = true;
        vec![Effect::Request {
            credentials,
            polling: true,
        }]
    }

    /// A request finished. `initial` is false for timer-driven requests.
    pub fn on_response(
        &mut self,
        initial: bool,
        result: Result<Vec<ResultMessage>, ClientError>,
    ) -> Vec<Effect> {
        self.in_flight = false;
        let mut effects = Vec::new();

        match (initial, result) {
            (true, Ok(messages)) => {
                if !self.polling && !self.unloaded {
                    self.polling = true;
                    let cadence = self.current_cadence();
                    self.timer = Some(cadence);
                    effects.push(Effect::StartTimer(cadence));
                }
                if !self.unloaded {
                    self.state = self.polling_state();
                }
                self.last_count = messages.len();
                effects.push(Effect::Render(messages));
            }
            (true, Err(e)) => {
                self.polling = false;
                self.timer = None;
                self.state = PollState::Idle;
                effects.push(Effect::StopTimer);
                effects.push(Effect::ShowError(e.to_string()));
            }
            (false, Ok(messages)) => {
                if messages.len() > self.last_count {
                    let fresh = messages.len() - self.last_count;
                    let delta: Vec<ResultMessage> = messages.into_iter().take(fresh).collect();
                    self.last_count += fresh;
                    effects.push(Effect::Append(delta));
                    effects.push(Effect::Notify { count: fresh });
                }
            }
            (false, Err(e)) => effects.push(Effect::PollFailed(e)),
        }

        effects
    }

    /// The client became visible or hidden.
    pub fn visibility_changed(&mut self, visible: bool) -> Vec<Effect> {
        self.visible = visible;
        if !self.polling || self.unloaded {
            return Vec::new();
        }

        let cadence = self.current_cadence();
        self.timer = Some(cadence);
        if matches!(self.state, PollState::Polling | PollState::PollingPaused) {
            self.state = self.polling_state();
        }
        vec![Effect::StopTimer, Effect::StartTimer(cadence)]
    }

    /// The client is going away.
    pub fn unload(&mut self) -> Vec<Effect> {
        self.unloaded = true;
        self.polling = false;
        self.timer = None;
        self.state = PollState::Idle;
        vec![Effect::StopTimer]
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn msgs(n: usize) -> Vec<ResultMessage> {
        (0..n)
            .map(|i| ResultMessage {
                from: "alice@example.com".into(),
                subject: format!("message {i}"),
                date: Utc::now(),
                text: "hi".into(),
                html: None,
            })
            .collect()
    }

    fn polling_session() -> PollingSession {
        let mut s = PollingSession::new(PollingConfig::default());
        s.submit("bob@example.com", "secret").unwrap();
        s.on_response(true, Ok(msgs(3)));
        s
    }

    #[test]
    fn submit_validates_input() {
        let mut s = PollingSession::new(PollingConfig::default());
        assert!(matches!(
            s.submit("", "pw"),
            Err(ClientError::Validation(_))
        ));
        assert!(s.submit("bob@example", "pw").is_err());
        assert!(s.submit("bob @example.com", "pw").is_err());
        assert!(s.submit("bob@example.com", "   ").is_err());
        assert_eq!(s.state(), PollState::Idle);
    }

    #[test]
    fn submit_requests_initial_check() {
        let mut s = PollingSession::new(PollingConfig::default());
        let effects = s.submit(" bob@example.com ", "secret").unwrap();

        assert_eq!(s.state(), PollState::Checking);
        assert!(effects.contains(&Effect::Request {
            credentials: Credentials {
                email: "bob@example.com".into(),
                password: "secret".into(),
            },
            polling: false,
        }));
    }

    #[test]
    fn initial_success_starts_foreground_polling() {
        let mut s = PollingSession::new(PollingConfig::default());
        s.submit("bob@example.com", "secret").unwrap();
        let effects = s.on_response(true, Ok(msgs(3)));

        assert_eq!(s.state(), PollState::Polling);
        assert_eq!(s.timer(), Some(Duration::from_secs(30)));
        assert_eq!(s.last_count(), 3);
        assert_eq!(effects[0], Effect::StartTimer(Duration::from_secs(30)));
        assert!(matches!(&effects[1], Effect::Render(m) if m.len() == 3));
    }

    #[test]
    fn initial_success_while_hidden_uses_background_cadence() {
        let mut s = PollingSession::new(PollingConfig::default());
        s.visibility_changed(false);
        s.submit("bob@example.com", "secret").unwrap();
        s.on_response(true, Ok(msgs(0)));

        assert_eq!(s.state(), PollState::PollingPaused);
        assert_eq!(s.timer(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn initial_failure_returns_to_idle() {
        let mut s = PollingSession::new(PollingConfig::default());
        s.submit("bob@example.com", "wrong").unwrap();
        let effects = s.on_response(
            true,
            Err(ClientError::Rejected {
                status: 403,
                message: "wrong access password".into(),
            }),
        );

        assert_eq!(s.state(), PollState::Idle);
        assert!(!s.is_polling());
        assert_eq!(
            effects,
            vec![
                Effect::StopTimer,
                Effect::ShowError("wrong access password".into())
            ]
        );
    }

    #[test]
    fn delta_takes_leading_entries() {
        let mut s = polling_session();
        assert_eq!(s.tick().len(), 1);

        let polled = msgs(5);
        let effects = s.on_response(false, Ok(polled.clone()));

        assert_eq!(
            effects,
            vec![
                Effect::Append(polled[..2].to_vec()),
                Effect::Notify { count: 2 },
            ]
        );
        assert_eq!(s.last_count(), 5);
    }

    #[test]
    fn same_or_fewer_messages_change_nothing() {
        let mut s = polling_session();
        s.tick();
        assert!(s.on_response(false, Ok(msgs(3))).is_empty());
        s.tick();
        assert!(s.on_response(false, Ok(msgs(1))).is_empty());
        assert_eq!(s.last_count(), 3);
    }

    #[test]
    fn tick_while_in_flight_is_noop() {
        let mut s = polling_session();
        assert_eq!(s.tick().len(), 1);
        assert!(s.tick().is_empty());
        assert!(s.submit("bob@example.com", "secret").unwrap().is_empty());

        s.on_response(false, Ok(msgs(3)));
        assert_eq!(s.tick().len(), 1);
    }

    #[test]
    fn failed_tick_keeps_polling() {
        let mut s = polling_session();
        s.tick();
        let effects = s.on_response(false, Err(ClientError::Connection("refused".into())));

        assert!(matches!(effects[..], [Effect::PollFailed(_)]));
        assert_eq!(s.state(), PollState::Polling);
        assert!(s.timer().is_some());
    }

    #[test]
    fn visibility_swaps_cadence_only() {
        let mut s = polling_session();

        let effects = s.visibility_changed(false);
        assert_eq!(
            effects,
            vec![Effect::StopTimer, Effect::StartTimer(Duration::from_secs(60))]
        );
        assert_eq!(s.state(), PollState::PollingPaused);
        assert_eq!(s.last_count(), 3);

        s.visibility_changed(true);
        assert_eq!(s.state(), PollState::Polling);
        assert_eq!(s.timer(), Some(Duration::from_secs(30)));
        assert!(s.is_polling());
    }

    #[test]
    fn visibility_before_polling_does_nothing() {
        let mut s = PollingSession::new(PollingConfig::default());
        assert!(s.visibility_changed(false).is_empty());
        assert!(s.timer().is_none());
    }

    #[test]
    fn response_after_unload_never_restarts_timer() {
        let mut s = PollingSession::new(PollingConfig::default());
        s.submit("bob@example.com", "secret").unwrap();
        assert_eq!(s.unload(), vec![Effect::StopTimer]);

        let effects = s.on_response(true, Ok(msgs(2)));
        assert!(!effects.iter().any(|e| matches!(e, Effect::StartTimer(_))));
        assert!(s.timer().is_none());
        assert_eq!(s.last_count(), 2);
        assert!(s.tick().is_empty());
    }
}
