//! Capability negotiation and SASL authentication.
//!
//! The [`Negotiator`] sees every inbound line before the protocol handlers do
//! and consumes the ones that belong to negotiation. Whatever happens, it ends
//! by sending `CAP END` exactly once so that registration can complete.

use crate::config::SaslConfig;
use crate::message::InboundMessage;
use crate::numeric::*;
use crate::outcome::{network_event, Outcome};
use crate::state::NetworkState;

use base64::prelude::*;
use strum::Display;

pub mod sasl;
use sasl::{build_mechanism, SaslMechanism};

/// Maximum length of one base64 chunk in an `AUTHENTICATE` line
pub const AUTHENTICATE_CHUNK_LEN: usize = 400;

/// Version sent with `CAP LS`, enabling multi-line replies and cap values
const CAP_VERSION: &str = "302";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum CapState {
    Idle,
    CapRequested,
    CapAcked,
    CapNaked,
    CapNotSupported,
    AuthInProgress,
    AuthSucceeded,
    AuthFailed,
    AuthAborted,
    CapEnded,
}

pub struct Negotiator {
    sasl: SaslConfig,
    state: CapState,
    /// Last state reached before negotiation ended
    result: Option<CapState>,
    /// Capabilities offered so far by a (possibly multi-line) LS reply
    offered: Vec<(String, Option<String>)>,
    mechanism: Option<Box<dyn SaslMechanism>>,
    /// Partial server challenge, while chunks are still arriving
    challenge: String,
    /// A complete challenge waiting for the mechanism to answer it
    pending: Option<Vec<u8>>,
    cap_end_sent: bool,
}

/// One mechanism step taken out of the negotiator, so that it can run without
/// the network state locked. SCRAM derives its keys here, which can take a
/// while.
pub struct PendingStep {
    mechanism: Box<dyn SaslMechanism>,
    challenge: Vec<u8>,
}

impl PendingStep {
    pub fn run(mut self) -> CompletedStep {
        let response = self.mechanism.step(&self.challenge);
        CompletedStep {
            mechanism: self.mechanism,
            response,
        }
    }
}

/// The result of a [`PendingStep`], to hand back to
/// [`Negotiator::complete_step`]
pub struct CompletedStep {
    mechanism: Box<dyn SaslMechanism>,
    response: sasl::SaslResult,
}

impl Negotiator {
    pub fn new(sasl: SaslConfig) -> Self {
        Self {
            sasl,
            state: CapState::Idle,
            result: None,
            offered: Vec::new(),
            mechanism: None,
            challenge: String::new(),
            pending: None,
            cap_end_sent: false,
        }
    }

    pub fn state(&self) -> CapState {
        self.state
    }

    /// How negotiation ended, once it has
    pub fn result(&self) -> Option<CapState> {
        self.result
    }

    /// Whether negotiation is still holding up registration
    pub fn is_active(&self) -> bool {
        !matches!(self.state, CapState::Idle | CapState::CapEnded)
    }

    /// Open negotiation, if authentication is configured. Must run before
    /// anything else is sent on the connection.
    pub fn start(&mut self, out: &mut Outcome) {
        if !self.sasl.enabled {
            return;
        }
        out.send(format!("CAP LS {}", CAP_VERSION));
        self.state = CapState::CapRequested;
    }

    /// Handle one inbound line. Returns true if the line was consumed and
    /// should not be passed on to the protocol handlers.
    ///
    /// A completed `AUTHENTICATE` challenge is not answered here. It is left
    /// for [`take_step`](Self::take_step), and nothing else should be handled
    /// until the step has been run and passed to
    /// [`complete_step`](Self::complete_step).
    pub fn handle(&mut self, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) -> bool {
        match msg.command.as_str() {
            "CAP" => {
                self.handle_cap(net, msg, out);
                true
            }
            "AUTHENTICATE" if self.state == CapState::AuthInProgress => {
                self.handle_authenticate(net, msg, out);
                true
            }
            RPL_LOGGEDIN => {
                net.account = msg.arg(2).map(str::to_string);
                tracing::info!(network = %net.network, account = ?net.account, "logged in");
                true
            }
            RPL_LOGGEDOUT => {
                net.account = None;
                true
            }
            RPL_SASLMECHS => {
                tracing::debug!(network = %net.network, mechanisms = ?msg.arg(1), "server SASL mechanisms");
                true
            }
            RPL_SASLSUCCESS | ERR_SASLALREADY if self.state == CapState::AuthInProgress => {
                out.emit(network_event(net, "sasl.success").with("mechanism", self.mechanism_name()));
                self.finish(CapState::AuthSucceeded, out);
                true
            }
            ERR_NICKLOCKED | ERR_SASLFAIL | ERR_SASLTOOLONG if self.state == CapState::AuthInProgress => {
                out.emit(
                    network_event(net, "sasl.failed")
                        .with("mechanism", self.mechanism_name())
                        .with("code", msg.command.as_str())
                        .with("reason", msg.last_arg().unwrap_or_default()),
                );
                self.finish(CapState::AuthFailed, out);
                true
            }
            ERR_SASLABORTED if self.state == CapState::AuthInProgress => {
                out.emit(network_event(net, "sasl.aborted").with("mechanism", self.mechanism_name()));
                self.finish(CapState::AuthAborted, out);
                true
            }
            ERR_UNKNOWNCOMMAND if self.is_active() && msg.arg(1) == Some("CAP") => {
                tracing::info!(network = %net.network, "server does not support capability negotiation");
                self.finish(CapState::CapNotSupported, out);
                true
            }
            RPL_WELCOME if self.is_active() => {
                // Registered without waiting for us, so the server ignored CAP
                self.finish(CapState::CapNotSupported, out);
                false
            }
            _ => false,
        }
    }

    fn mechanism_name(&self) -> &'static str {
        self.mechanism.as_ref().map_or("", |m| m.name())
    }

    fn handle_cap(&mut self, net: &mut NetworkState, msg: &InboundMessage, out: &mut Outcome) {
        let subcommand = msg.arg(1).unwrap_or_default().to_ascii_uppercase();

        match subcommand.as_str() {
            "LS" if self.state == CapState::CapRequested => {
                // `CAP * LS * :caps` means more lines follow
                let (more, caps) = match (msg.arg(2), msg.arg(3)) {
                    (Some("*"), Some(caps)) => (true, caps),
                    (Some(caps), _) => (false, caps),
                    (None, _) => (false, ""),
                };

                for cap in caps.split_ascii_whitespace() {
                    let (name, value) = match cap.split_once('=') {
                        Some((n, v)) => (n.to_string(), Some(v.to_string())),
                        None => (cap.to_string(), None),
                    };
                    self.offered.push((name, value));
                }

                if !more {
                    self.request_sasl(net, out);
                }
            }
            "ACK" if self.state == CapState::CapRequested => {
                let acked = msg.last_arg().unwrap_or_default();
                if acked.split_ascii_whitespace().any(|c| c == "sasl") {
                    self.state = CapState::CapAcked;
                    self.begin_authentication(net, out);
                } else {
                    self.finish(CapState::CapNaked, out);
                }
            }
            "NAK" if self.state == CapState::CapRequested => {
                tracing::info!(network = %net.network, "server refused the sasl capability");
                self.finish(CapState::CapNaked, out);
            }
            _ => {
                tracing::debug!(network = %net.network, ?subcommand, state = %self.state, "ignoring CAP reply");
            }
        }
    }

    fn request_sasl(&mut self, net: &NetworkState, out: &mut Outcome) {
        let wanted = self.sasl.mechanism.to_string();

        let usable = match self.offered.iter().find(|(name, _)| name == "sasl") {
            None => false,
            // No value means the server didn't say which mechanisms it has
            Some((_, None)) => true,
            Some((_, Some(mechs))) => mechs.is_empty() || mechs.split(',').any(|m| m.eq_ignore_ascii_case(&wanted)),
        };

        if usable {
            out.send("CAP REQ :sasl");
        } else {
            tracing::info!(network = %net.network, mechanism = %wanted, "SASL not available");
            self.finish(CapState::CapNotSupported, out);
        }
    }

    fn begin_authentication(&mut self, net: &NetworkState, out: &mut Outcome) {
        let mechanism = build_mechanism(&self.sasl);
        out.send(format!("AUTHENTICATE {}", mechanism.name()));
        out.emit(network_event(net, "sasl.started").with("mechanism", mechanism.name()));

        self.mechanism = Some(mechanism);
        self.state = CapState::AuthInProgress;
    }

    fn handle_authenticate(&mut self, net: &NetworkState, msg: &InboundMessage, out: &mut Outcome) {
        let chunk = msg.arg(0).unwrap_or("+");

        if chunk != "+" {
            self.challenge.push_str(chunk);
            if chunk.len() == AUTHENTICATE_CHUNK_LEN {
                // Either more data or a lone "+" follows
                return;
            }
        }

        let encoded = std::mem::take(&mut self.challenge);
        match BASE64_STANDARD.decode(encoded) {
            Ok(challenge) => self.pending = Some(challenge),
            Err(e) => self.answer(net, Err(e.into()), out),
        }
    }

    /// Take the mechanism step left by the last `AUTHENTICATE` line, if any
    pub fn take_step(&mut self) -> Option<PendingStep> {
        let challenge = self.pending.take()?;
        match self.mechanism.take() {
            Some(mechanism) => Some(PendingStep { mechanism, challenge }),
            None => {
                tracing::warn!("SASL challenge with no mechanism selected");
                None
            }
        }
    }

    /// Send the response produced by a [`PendingStep`], or abort the exchange
    /// if the mechanism failed
    pub fn complete_step(&mut self, net: &NetworkState, step: CompletedStep, out: &mut Outcome) {
        self.mechanism = Some(step.mechanism);
        self.answer(net, step.response, out);
    }

    /// Give up on a step that never completed
    pub fn abandon_step(&mut self, net: &NetworkState, reason: String, out: &mut Outcome) {
        self.answer(net, Err(sasl::SaslError::Internal(reason)), out);
    }

    /// Run any pending step in place. For callers with no lock to release.
    pub fn run_step(&mut self, net: &NetworkState, out: &mut Outcome) {
        if let Some(step) = self.take_step() {
            self.complete_step(net, step.run(), out);
        }
    }

    fn answer(&mut self, net: &NetworkState, response: sasl::SaslResult, out: &mut Outcome) {
        match response {
            Ok(payload) => {
                for line in authenticate_lines(&payload) {
                    out.send(line);
                }
            }
            Err(e) => {
                tracing::warn!(network = %net.network, mechanism = self.mechanism_name(), "SASL exchange failed: {}", e);
                out.send("AUTHENTICATE *");
                out.emit(
                    network_event(net, "sasl.failed")
                        .with("mechanism", self.mechanism_name())
                        .with("reason", e.to_string()),
                );
                self.finish(CapState::AuthFailed, out);
            }
        }
    }

    /// Record the outcome, drop any authentication state and send `CAP END`
    /// if it hasn't been sent already
    fn finish(&mut self, result: CapState, out: &mut Outcome) {
        self.result = Some(result);
        self.state = CapState::CapEnded;
        self.mechanism = None;
        self.challenge.clear();
        self.pending = None;
        self.offered.clear();

        if !self.cap_end_sent {
            self.cap_end_sent = true;
            out.send("CAP END");
        }
    }
}

/// Encode a client response as `AUTHENTICATE` lines: base64, split into
/// chunks of at most 400 bytes, with a lone `+` after a final chunk of
/// exactly 400 bytes. An empty response is a single `+`.
pub fn authenticate_lines(payload: &[u8]) -> Vec<String> {
    if payload.is_empty() {
        return vec!["AUTHENTICATE +".to_string()];
    }

    let encoded = BASE64_STANDARD.encode(payload);
    let mut lines: Vec<String> = encoded
        .as_bytes()
        .chunks(AUTHENTICATE_CHUNK_LEN)
        .map(|chunk| format!("AUTHENTICATE {}", String::from_utf8_lossy(chunk)))
        .collect();

    if encoded.len() % AUTHENTICATE_CHUNK_LEN == 0 {
        lines.push("AUTHENTICATE +".to_string());
    }
    lines
}
