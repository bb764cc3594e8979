//! Single ordered send path.
//!
//! Every outbound envelope goes through one writer task, so frames reach the
//! connection in the order they were enqueued and callers never block on the
//! socket. A send failure is reported to the hook attached to the envelope.

use std::sync::Arc;

use buildlink_core::Connection;
use buildlink_core::protocol::{Envelope, Request, Response};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::ClientError;

/// Called when an envelope could not be written.
pub type FailureHook = Box<dyn FnOnce(ClientError) + Send>;

struct Outgoing {
    envelope: Envelope,
    on_failure: Option<FailureHook>,
}

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct Outbox {
    connection: Arc<dyn Connection>,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbox {
    /// Spawn the writer task for `connection`.
    ///
    /// The task ends once every `Outbox` clone is dropped.
    pub fn start(connection: Arc<dyn Connection>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(Arc::clone(&connection), rx));
        (Self { connection, tx }, writer)
    }

    /// Reserve a serial for an outbound message.
    pub fn next_serial(&self) -> u64 {
        self.connection.next_serial()
    }

    /// Send a request under an already reserved serial.
    pub fn send_request(&self, serial: u64, request: Request, on_failure: Option<FailureHook>) {
        self.enqueue(Envelope::request(serial, request), on_failure);
    }

    /// Send a request nobody waits on. Returns its serial.
    pub fn fire_and_forget(&self, request: Request) -> u64 {
        let serial = self.next_serial();
        self.send_request(serial, request, None);
        serial
    }

    /// Answer a server request.
    pub fn respond(&self, reply_to: u64, response: Response) {
        let serial = self.next_serial();
        self.enqueue(Envelope::response(serial, reply_to, response), None);
    }

    fn enqueue(&self, envelope: Envelope, on_failure: Option<FailureHook>) {
        let outgoing = Outgoing {
            envelope,
            on_failure,
        };
        if let Err(mpsc::error::SendError(outgoing)) = self.tx.send(outgoing) {
            debug!(
                serial = outgoing.envelope.serial,
                "writer stopped, dropping outbound message"
            );
            if let Some(hook) = outgoing.on_failure {
                hook(ClientError::ConnectionClosed);
            }
        }
    }
}

async fn write_loop(connection: Arc<dyn Connection>, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(Outgoing {
        envelope,
        on_failure,
    }) = rx.recv().await
    {
        let serial = envelope.serial;
        let kind = envelope.message.message_type();
        match connection.send(envelope).await {
            Ok(()) => trace!(serial, kind, "sent"),
            Err(error) => {
                debug!(serial, kind, %error, "send failed");
                if let Some(hook) = on_failure {
                    hook(error.into());
                }
            }
        }
    }
}
