//! Connection handler
//!
//! Owns one session from accept to teardown: registers it, runs the
//! read and delivery tasks, and supervises liveness. Teardown always
//! happens exactly once, whichever of exit, idle timeout or I/O failure
//! comes first.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::codec::{InputLine, LineCodec};
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::Notice;
use crate::registry::Registry;
use crate::session::{OfflineReason, Outcome, Session};

/// Buffer for liveness reports from the read task
const PULSE_BUFFER_SIZE: usize = 32;

/// How long teardown waits for queued lines to reach the client
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Read task → supervisor report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    /// Recognized activity; resets the idle timer
    Pulse,
    /// `exit` received
    Exit,
    /// End of stream
    Closed,
    /// Read error
    Failed,
}

/// Handle a new TCP connection
///
/// The session starts out named after the peer address.
pub async fn handle_connection(
    stream: TcpStream,
    registry: Registry,
    config: Arc<ServerConfig>,
) -> Result<OfflineReason, AppError> {
    let peer_addr = stream.peer_addr()?.to_string();
    debug!("New TCP connection from {}", peer_addr);
    serve_connection(stream, peer_addr, registry, config).await
}

/// Run a session over any bidirectional byte stream
///
/// Returns once the session is offline and its output has been drained
/// (or the drain timed out).
pub async fn serve_connection<S>(
    stream: S,
    peer: String,
    registry: Registry,
    config: Arc<ServerConfig>,
) -> Result<OfflineReason, AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (session, mailbox) = Session::new(peer, Arc::clone(&config));
    let session_id = session.id();

    if let Err(e) = session.go_online(&registry) {
        warn!("Client {} from {} rejected: {}", session_id, session.address(), e);
        session.notify(Notice::Refused {
            name: session.name(),
        });
        session.close_mailbox();
        match tokio::time::timeout(DRAIN_TIMEOUT, Session::deliver_loop(mailbox, writer)).await {
            Ok(Err(write_err)) => debug!("Refusal not delivered to {}: {}", session_id, write_err),
            Err(_) => debug!("Refusal to {} timed out", session_id),
            Ok(Ok(())) => {}
        }
        return Err(e);
    }

    // Spawn write task (mailbox -> connection)
    let mut write_task = tokio::spawn(async move {
        match Session::deliver_loop(mailbox, writer).await {
            Ok(()) => debug!("Write task ended for {}", session_id),
            Err(e) => warn!("Write failed for {}, ending write task: {}", session_id, e),
        }
    });

    // Spawn read task (connection -> interpret)
    let (pulse_tx, mut pulse_rx) = mpsc::channel(PULSE_BUFFER_SIZE);
    let read_task = tokio::spawn(read_loop(
        Arc::clone(&session),
        registry.clone(),
        FramedRead::new(reader, LineCodec::new(config.max_line_length)),
        pulse_tx,
    ));

    let (reason, write_done) =
        supervise(&mut pulse_rx, &mut write_task, config.idle_timeout()).await;
    if reason == OfflineReason::IdleTimeout {
        info!(
            "Client {} idle for {:?}, forcing offline",
            session_id,
            config.idle_timeout()
        );
    }

    session.go_offline(&registry, reason);
    read_task.abort();

    if !write_done && tokio::time::timeout(DRAIN_TIMEOUT, &mut write_task).await.is_err() {
        warn!("Client {} did not drain output in time", session_id);
        write_task.abort();
    }

    info!("Client {} disconnected", session_id);
    Ok(reason)
}

/// Read lines, interpret them and report liveness until the session ends
async fn read_loop<R>(
    session: Arc<Session>,
    registry: Registry,
    mut lines: FramedRead<R, LineCodec>,
    pulses: mpsc::Sender<Liveness>,
) where
    R: AsyncRead + Unpin,
{
    let session_id = session.id();
    let end = loop {
        let outcome = match lines.next().await {
            Some(Ok(InputLine::Text(line))) => session.interpret(&registry, &line),
            Some(Ok(InputLine::Overlong)) => session.reject_overlong(),
            Some(Err(e)) => {
                warn!("Read error for {}: {}", session_id, e);
                break Liveness::Failed;
            }
            None => {
                debug!("Client {} closed the stream", session_id);
                break Liveness::Closed;
            }
        };

        match outcome {
            Outcome::Terminate => break Liveness::Exit,
            Outcome::Active => {
                if pulses.send(Liveness::Pulse).await.is_err() {
                    return;
                }
            }
            Outcome::Continue => {}
        }
    };

    let _ = pulses.send(end).await;
    debug!("Read task ended for {}", session_id);
}

/// Wait for the first of: exit, stream end, I/O failure, idle timeout
///
/// The second value is true when the write task has already finished.
async fn supervise(
    pulses: &mut mpsc::Receiver<Liveness>,
    write_task: &mut JoinHandle<()>,
    idle_timeout: Duration,
) -> (OfflineReason, bool) {
    loop {
        tokio::select! {
            pulse = pulses.recv() => match pulse {
                Some(Liveness::Pulse) => continue,
                Some(Liveness::Exit) => return (OfflineReason::Exit, false),
                Some(Liveness::Closed) | None => return (OfflineReason::Disconnected, false),
                Some(Liveness::Failed) => return (OfflineReason::IoError, false),
            },
            // The mailbox is still open, so an ended write task means a write error.
            _ = &mut *write_task => return (OfflineReason::IoError, true),
            _ = tokio::time::sleep(idle_timeout) => return (OfflineReason::IdleTimeout, false),
        }
    }
}
