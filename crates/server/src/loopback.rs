//! In-process transport onto a shared `SessionServer`.
//!
//! Frames are encoded and decoded on the way through so the loopback path
//! exercises the same codec as a socket would.

use std::cell::RefCell;
use std::rc::Rc;

use maxgammon_wire::{ClientFrame, ServerFrame, Transport, TransportError};
use prost::Message;

use crate::{ConnectionId, SessionServer};

/// Single-threaded handle onto a server shared by several loopback clients.
pub type SharedServer = Rc<RefCell<SessionServer>>;

pub struct LoopbackTransport {
    server: SharedServer,
    connection: ConnectionId,
    closed: bool,
}

impl LoopbackTransport {
    /// Open a fresh connection on `server`.
    pub fn connect(server: &SharedServer) -> Self {
        let connection = server.borrow_mut().connect();
        Self {
            server: Rc::clone(server),
            connection,
            closed: false,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, frame: &ClientFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let decoded = ClientFrame::decode(frame.encode_to_vec().as_slice())?;
        self.server.borrow_mut().handle_frame(self.connection, decoded);
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let Some(frame) = self.server.borrow_mut().take_frame(self.connection) else {
            return Ok(None);
        };
        Ok(Some(ServerFrame::decode(frame.encode_to_vec().as_slice())?))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.server.borrow_mut().disconnect(self.connection);
        }
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if !self.closed {
            if let Ok(mut server) = self.server.try_borrow_mut() {
                server.disconnect(self.connection);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use maxgammon_wire::{Command, FetchState, ResponseResult, ServerFrameKind};

    #[test]
    fn test_loopback_delivers_response() {
        let server: SharedServer = Rc::new(RefCell::new(SessionServer::new(ServerConfig::default())));
        let mut transport = LoopbackTransport::connect(&server);

        transport
            .send(&ClientFrame {
                correlation_id: 3,
                session_id: "NOPE00".into(),
                command: Some(Command::FetchState(FetchState {})),
            })
            .unwrap();

        let frame = transport.recv().unwrap().unwrap();
        let Some(ServerFrameKind::Response(response)) = frame.kind else {
            panic!("expected response");
        };
        assert_eq!(response.correlation_id, 3);
        assert!(matches!(response.result, Some(ResponseResult::Error(_))));
        assert!(transport.recv().unwrap().is_none());
    }

    #[test]
    fn test_closed_loopback_refuses_io() {
        let server: SharedServer = Rc::new(RefCell::new(SessionServer::new(ServerConfig::default())));
        let mut transport = LoopbackTransport::connect(&server);
        assert_eq!(server.borrow().connection_count(), 1);

        transport.close().unwrap();
        assert_eq!(server.borrow().connection_count(), 0);
        assert!(matches!(
            transport.send(&ClientFrame::default()),
            Err(TransportError::Closed)
        ));
        assert!(matches!(transport.recv(), Err(TransportError::Closed)));
    }
}
