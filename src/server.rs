//! TCP server: accept loop and per-connection handlers.
//!
//! Accepts every incoming socket, negotiates identity, and asks the session
//! registry for admission; at capacity the peer gets a rejection line and the
//! socket is closed without a session. Each admitted connection runs its own
//! task whose only shared state is the registry.

use crate::config::Config;
use crate::protocol::{self, Engine, Reply, REJECT_MSG};
use crate::registry::{Admission, CloseReason, SessionRegistry};
use crate::repository::FileRepository;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    repository: Arc<FileRepository>,
}

impl Server {
    /// Create the repository directory if needed and bind the listener.
    /// A bind failure here is fatal to the process.
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let repository = FileRepository::new(&config.repository);
        repository.ensure()?;

        let listener = TcpListener::bind(config.listen_addr()).await?;
        info!(
            address = %listener.local_addr()?,
            max_clients = config.max_clients,
            repository = %repository.root().display(),
            "Server listening"
        );

        Ok(Server {
            listener,
            registry: Arc::new(SessionRegistry::new(config.max_clients)),
            repository: Arc::new(repository),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, spawning one handler task per socket.
    /// Per-connection failures never reach the accept loop.
    pub async fn run(self) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");
                    let registry = Arc::clone(&self.registry);
                    let repository = Arc::clone(&self.repository);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, registry, repository).await
                        {
                            debug!(peer = %addr, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// How a command loop ended
enum LoopEnd {
    /// Client sent an exit command
    Exit,
    /// Peer closed the connection
    Eof,
}

/// Handle a single client connection from identity negotiation to cleanup
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    repository: Arc<FileRepository>,
) -> io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // The client opens with its requested name; the server assigns its own.
    let mut requested = String::new();
    if reader.read_line(&mut requested).await? == 0 {
        debug!(peer = %addr, "Peer left before negotiating identity");
        return Ok(());
    }

    let session = match registry.try_admit(addr) {
        Admission::Admitted(session) => session,
        Admission::Rejected => {
            warn!(peer = %addr, "Rejected connection: server at capacity");
            writer.write_all(REJECT_MSG.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            return Ok(());
        }
    };

    let identity = session.identity.clone();
    info!(
        identity = %identity,
        peer = %addr,
        requested = %requested.trim(),
        active = registry.active_count(),
        "Client connected"
    );

    let engine = Engine::new(Arc::clone(&registry), repository);

    // Once admitted, the session must be closed exactly once on every exit
    // path; no fallible write may escape this match before the close.
    let reason = match serve_session(&mut reader, &mut writer, &engine, &identity).await {
        Ok(LoopEnd::Exit) => CloseReason::Graceful,
        Ok(LoopEnd::Eof) => {
            debug!(identity = %identity, "Peer disconnected");
            CloseReason::Abrupt
        }
        Err(e) => {
            warn!(identity = %identity, error = %e, "Connection failed");
            CloseReason::Abrupt
        }
    };
    registry.close(&identity, reason);
    info!(
        identity = %identity,
        active = registry.active_count(),
        "Client disconnected"
    );
    Ok(())
}

/// Confirm the assigned identity, then read, execute, and answer commands
/// until exit, end-of-stream, or error
async fn serve_session(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    engine: &Engine,
    identity: &str,
) -> io::Result<LoopEnd> {
    write_line(writer, identity).await?;

    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(LoopEnd::Eof);
        }

        let request = protocol::parse_request(&line);
        debug!(identity = %identity, ?request, "Processing request");

        match engine.execute(request) {
            Reply::Line(text) => {
                write_line(writer, &text).await?;
            }
            Reply::Lines(lines) => {
                let mut block = lines.join("\n");
                block.push('\n');
                writer.write_all(block.as_bytes()).await?;
            }
            Reply::File { header, bytes } => {
                // Metadata line, then exactly the declared byte count
                write_line(writer, &header).await?;
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
            Reply::Goodbye(text) => {
                // Write completes before the socket is dropped
                write_line(writer, &text).await?;
                writer.flush().await?;
                return Ok(LoopEnd::Exit);
            }
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, text: &str) -> io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await
}
