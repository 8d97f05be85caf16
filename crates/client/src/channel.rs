//! Session channel: one owned connection to the session server.
//!
//! Every command carries a fresh correlation id and is registered in a
//! dispatch table until its single response arrives. Responses whose id is
//! not pending (stale or duplicated) are discarded. Pushes for the open
//! session go to the registered handler for their kind and onto a queue the
//! controller drains.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use maxgammon_wire::{
    ClientFrame, Command, CommandKind, CorrelationId, Push, PushEvent, PushKind, Response,
    ResponseResult, ServerFrameKind, Transport, TransportError,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

type PushHandler = Box<dyn FnMut(&PushEvent)>;

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: CommandKind,
    sent_at: Instant,
}

pub struct SessionChannel<T: Transport> {
    transport: T,
    session_id: Option<String>,
    next_correlation_id: CorrelationId,
    /// Dispatch table: correlation id → command awaiting its response
    pending: HashMap<CorrelationId, Pending>,
    /// Responses received but not yet claimed by `wait`
    resolved: HashMap<CorrelationId, (CommandKind, Option<ResponseResult>)>,
    /// Mutating command that has not resolved yet
    in_flight: Option<(CorrelationId, CommandKind)>,
    handlers: HashMap<PushKind, PushHandler>,
    pushes: VecDeque<PushEvent>,
    timeout: Duration,
    closed: bool,
}

impl<T: Transport> SessionChannel<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            session_id: None,
            next_correlation_id: 1,
            pending: HashMap::new(),
            resolved: HashMap::new(),
            in_flight: None,
            handlers: HashMap::new(),
            pushes: VecDeque::new(),
            timeout: config.response_timeout(),
            closed: false,
        }
    }

    /// Scope subsequent commands to `session_id`. Anything still pending for
    /// a previous session is dropped.
    pub fn open(&mut self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        tracing::info!(session_id = %session_id, "session channel opened");
        self.pending.clear();
        self.resolved.clear();
        self.in_flight = None;
        self.pushes.clear();
        self.session_id = Some(session_id);
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn in_flight(&self) -> Option<CommandKind> {
        self.in_flight.map(|(_, kind)| kind)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Register the handler for one push kind, replacing any previous one.
    pub fn on_push(&mut self, kind: PushKind, handler: impl FnMut(&PushEvent) + 'static) {
        if self.handlers.insert(kind, Box::new(handler)).is_some() {
            tracing::debug!(?kind, "push handler replaced");
        }
    }

    /// Pushes received since the last call, oldest first.
    pub fn take_pushes(&mut self) -> Vec<PushEvent> {
        self.pushes.drain(..).collect()
    }

    /// Send `command` and wait for its response.
    pub fn send(&mut self, command: Command) -> Result<ResponseResult> {
        let correlation_id = self.begin(command)?;
        self.wait(correlation_id)
    }

    /// Send `command` without waiting. At most one mutating command may be
    /// unresolved at a time.
    pub fn begin(&mut self, command: Command) -> Result<CorrelationId> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        let kind = command.kind();
        if kind.is_mutating() {
            if let Some((_, in_flight)) = self.in_flight {
                return Err(ClientError::ConcurrencyConflict { in_flight });
            }
        }
        let session_id = match (&self.session_id, kind.is_unscoped()) {
            (_, true) => String::new(),
            (Some(id), false) => id.clone(),
            (None, false) => {
                return Err(ClientError::invalid(format!("{kind} needs an open session")));
            }
        };

        let correlation_id = self.next_correlation_id;
        self.next_correlation_id += 1;
        let frame = ClientFrame {
            correlation_id,
            session_id,
            command: Some(command),
        };

        if let Err(err) = self.transport.send(&frame) {
            tracing::error!(correlation_id, command = %kind, error = %err, "send failed");
            return Err(err.into());
        }
        tracing::debug!(
            session_id = %frame.session_id,
            correlation_id,
            command = %kind,
            "command sent"
        );

        self.pending.insert(
            correlation_id,
            Pending {
                kind,
                sent_at: Instant::now(),
            },
        );
        if kind.is_mutating() {
            self.in_flight = Some((correlation_id, kind));
        }
        Ok(correlation_id)
    }

    /// Block until the response for `correlation_id` arrives or times out.
    pub fn wait(&mut self, correlation_id: CorrelationId) -> Result<ResponseResult> {
        loop {
            if let Some((kind, result)) = self.resolved.remove(&correlation_id) {
                return self.finish(correlation_id, kind, result);
            }
            let Some(pending) = self.pending.get(&correlation_id).copied() else {
                return Err(ClientError::invalid(format!(
                    "no command pending for correlation id {correlation_id}"
                )));
            };
            match self.transport.recv() {
                Ok(Some(frame)) => self.route(frame.kind),
                Ok(None) => {
                    let waited = pending.sent_at.elapsed();
                    if waited >= self.timeout {
                        self.abandon(correlation_id);
                        let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                        tracing::error!(correlation_id, command = %pending.kind, waited_ms, "response timed out");
                        return Err(TransportError::Timeout { waited_ms }.into());
                    }
                }
                Err(err) => {
                    self.abandon(correlation_id);
                    tracing::error!(correlation_id, command = %pending.kind, error = %err, "receive failed");
                    return Err(err.into());
                }
            }
        }
    }

    /// Read whatever is available without blocking on a response.
    /// Returns the number of frames processed.
    pub fn poll(&mut self) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        let mut processed = 0;
        while let Some(frame) = self.transport.recv()? {
            processed += 1;
            self.route(frame.kind);
        }
        Ok(processed)
    }

    /// Close the connection. Pending commands are abandoned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        self.resolved.clear();
        self.in_flight = None;
        tracing::info!(session_id = ?self.session_id, "session channel closed");
        self.transport.close()?;
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ------------------------------------------------------------------------

    fn route(&mut self, kind: Option<ServerFrameKind>) {
        match kind {
            Some(ServerFrameKind::Response(response)) => self.park(response),
            Some(ServerFrameKind::Push(push)) => self.deliver(push),
            None => tracing::warn!("empty server frame discarded"),
        }
    }

    /// Resolve a pending id, or discard the response as stale.
    fn park(&mut self, response: Response) {
        let id = response.correlation_id;
        if let Some(pending) = self.pending.remove(&id) {
            self.resolved.insert(id, (pending.kind, response.result));
        } else {
            tracing::warn!(correlation_id = id, "stale or duplicate response discarded");
        }
    }

    fn deliver(&mut self, push: Push) {
        let Some(event) = push.event else {
            tracing::warn!("push without event discarded");
            return;
        };
        if self.session_id.as_deref() != Some(push.session_id.as_str()) {
            tracing::debug!(session_id = %push.session_id, "push for another session discarded");
            return;
        }
        let kind = event.kind();
        tracing::debug!(session_id = %push.session_id, ?kind, "push received");
        if let Some(handler) = self.handlers.get_mut(&kind) {
            handler(&event);
        }
        self.pushes.push_back(event);
    }

    fn abandon(&mut self, correlation_id: CorrelationId) {
        self.pending.remove(&correlation_id);
        if matches!(self.in_flight, Some((id, _)) if id == correlation_id) {
            self.in_flight = None;
        }
    }

    fn finish(
        &mut self,
        correlation_id: CorrelationId,
        kind: CommandKind,
        result: Option<ResponseResult>,
    ) -> Result<ResponseResult> {
        self.abandon(correlation_id);
        match result {
            Some(ResponseResult::Error(err)) => {
                tracing::warn!(correlation_id, command = %kind, message = %err.message, "command rejected");
                Err(ClientError::from_server(
                    err.code,
                    err.message,
                    self.session_id.as_deref().unwrap_or_default(),
                    kind,
                ))
            }
            Some(result) => {
                tracing::debug!(correlation_id, command = %kind, "command resolved");
                Ok(result)
            }
            None => Err(ClientError::invalid(format!("empty response to {kind}"))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use maxgammon_wire::{
        FetchState, GameOver, RollDice, ServerFrame, StateChanged, TurnChanged, Undo,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Transport replaying canned server frames and recording what was sent.
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Vec<ClientFrame>,
        inbox: VecDeque<ServerFrame>,
        fail_send: bool,
        closed: bool,
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, frame: &ClientFrame) -> std::result::Result<(), TransportError> {
            if self.fail_send {
                return Err(TransportError::Closed);
            }
            self.sent.push(frame.clone());
            Ok(())
        }

        fn recv(&mut self) -> std::result::Result<Option<ServerFrame>, TransportError> {
            Ok(self.inbox.pop_front())
        }

        fn close(&mut self) -> std::result::Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }
    }

    fn turn(current_turn: &str) -> ResponseResult {
        ResponseResult::Turn(TurnChanged {
            current_turn: current_turn.into(),
            revision: 1,
        })
    }

    fn channel(inbox: Vec<ServerFrame>) -> SessionChannel<ScriptedTransport> {
        let transport = ScriptedTransport {
            inbox: inbox.into(),
            ..Default::default()
        };
        let config = ClientConfig {
            response_timeout_ms: 0,
            ..Default::default()
        };
        let mut channel = SessionChannel::new(transport, &config);
        channel.open("ABC123");
        channel
    }

    #[test]
    fn test_response_matched_by_correlation_id() {
        let mut channel = channel(vec![ServerFrame::response(1, turn("Max"))]);
        let result = channel.send(Command::FetchState(FetchState {})).unwrap();
        assert_eq!(result, turn("Max"));
        let sent = &channel.transport().sent[0];
        assert_eq!(sent.correlation_id, 1);
        assert_eq!(sent.session_id, "ABC123");
    }

    #[test]
    fn test_stale_response_discarded() {
        let mut channel = channel(vec![
            ServerFrame::response(41, turn("Ghost")),
            ServerFrame::response(1, turn("Max")),
        ]);
        let result = channel.send(Command::FetchState(FetchState {})).unwrap();
        assert_eq!(result, turn("Max"));
    }

    #[test]
    fn test_duplicate_response_discarded() {
        let mut channel = channel(vec![
            ServerFrame::response(1, turn("Max")),
            ServerFrame::response(1, turn("Max")),
        ]);
        channel.send(Command::FetchState(FetchState {})).unwrap();
        // the duplicate is read and dropped; nothing resolves
        assert_eq!(channel.poll().unwrap(), 1);
        assert!(channel.resolved.is_empty());
    }

    #[test]
    fn test_out_of_order_responses_resolve_their_own_command() {
        let mut channel = channel(vec![
            ServerFrame::response(2, turn("Second")),
            ServerFrame::response(1, turn("First")),
        ]);
        let first = channel.begin(Command::FetchState(FetchState {})).unwrap();
        let second = channel.begin(Command::FetchState(FetchState {})).unwrap();
        assert_eq!(channel.wait(first).unwrap(), turn("First"));
        assert_eq!(channel.wait(second).unwrap(), turn("Second"));
    }

    #[test]
    fn test_second_mutating_command_conflicts() {
        let mut channel = channel(vec![]);
        channel.begin(Command::RollDice(RollDice {})).unwrap();
        assert_eq!(channel.in_flight(), Some(CommandKind::RollDice));

        let err = channel.begin(Command::Undo(Undo {})).unwrap_err();
        assert!(matches!(
            err,
            ClientError::ConcurrencyConflict {
                in_flight: CommandKind::RollDice
            }
        ));
        // queries are still allowed
        channel.begin(Command::FetchState(FetchState {})).unwrap();
        assert_eq!(channel.transport().sent.len(), 2);
    }

    #[test]
    fn test_timeout_releases_in_flight() {
        let mut channel = channel(vec![]);
        let err = channel.send(Command::RollDice(RollDice {})).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Timeout { .. })
        ));
        assert_eq!(channel.in_flight(), None);
        // a late response is now stale
        channel
            .transport_mut()
            .inbox
            .push_back(ServerFrame::response(1, turn("Max")));
        channel.poll().unwrap();
        assert!(channel.resolved.is_empty());
    }

    #[test]
    fn test_send_failure_surfaces_and_leaves_nothing_pending() {
        let mut channel = channel(vec![]);
        channel.transport_mut().fail_send = true;
        let err = channel.send(Command::RollDice(RollDice {})).unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Closed)));
        assert!(channel.pending.is_empty());
        assert_eq!(channel.in_flight(), None);
    }

    #[test]
    fn test_server_error_mapped() {
        let mut channel = channel(vec![ServerFrame::response(
            1,
            ResponseResult::error(maxgammon_wire::ErrorCode::SessionNotFound, "unknown session"),
        )]);
        let err = channel.send(Command::FetchState(FetchState {})).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_scoped_command_needs_open_session() {
        let transport = ScriptedTransport::default();
        let mut channel = SessionChannel::new(transport, &ClientConfig::default());
        let err = channel.send(Command::FetchState(FetchState {})).unwrap_err();
        assert!(matches!(err, ClientError::InvalidCommand { .. }));
        assert!(channel.transport().sent.is_empty());
    }

    #[test]
    fn test_push_handler_replaced_not_stacked() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut channel = channel(vec![
            ServerFrame::push("ABC123", PushEvent::StateChanged(StateChanged { revision: 3 })),
            ServerFrame::push("OTHER1", PushEvent::StateChanged(StateChanged { revision: 9 })),
            ServerFrame::push(
                "ABC123",
                PushEvent::GameOver(GameOver {
                    winner: "Max".into(),
                }),
            ),
        ]);

        let first = Rc::clone(&seen);
        channel.on_push(PushKind::StateChanged, move |_| first.borrow_mut().push("first"));
        let second = Rc::clone(&seen);
        channel.on_push(PushKind::StateChanged, move |_| second.borrow_mut().push("second"));

        assert_eq!(channel.poll().unwrap(), 3);
        assert_eq!(*seen.borrow(), vec!["second"]);

        let queued = channel.take_pushes();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].kind(), PushKind::StateChanged);
        assert_eq!(queued[1].kind(), PushKind::GameOver);
    }

    #[test]
    fn test_close_is_explicit_and_final() {
        let mut channel = channel(vec![]);
        channel.close().unwrap();
        assert!(channel.transport().closed);
        assert!(channel.is_closed());
        assert!(matches!(
            channel.send(Command::FetchState(FetchState {})),
            Err(ClientError::Transport(TransportError::Closed))
        ));
    }
}
