//! Command-line client runtime.
//!
//! Connects, negotiates an identity, then drives commands over the same
//! framing the server speaks: single lines for echo and errors, count-headed
//! blocks for status and list, and the length-prefixed byte stream for
//! downloads. Downloaded files are saved into a local directory.

use crate::protocol::{
    self, parse_count_header, parse_file_header, Request, FILES_HEADER, SESSIONS_HEADER,
};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Requested name sent during negotiation (the server assigns its own)
    pub name: String,
    /// Directory downloaded files are saved into
    pub downloads: PathBuf,
}

/// Outcome of the identity negotiation
pub enum Negotiation {
    /// Admitted with a server-assigned identity
    Admitted(Connection),
    /// Server at capacity; the rejection line it sent
    Rejected(String),
}

/// One reply, already read off the wire
#[derive(Debug, PartialEq)]
pub enum ServerReply {
    /// A single text line
    Line(String),
    /// A status or list block, header included
    Block(Vec<String>),
    /// A completed file transfer
    FileData { name: String, bytes: Vec<u8> },
}

/// An admitted connection to the server
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    identity: String,
}

/// Connect and negotiate: send the requested name, then read either the
/// assigned identity or a rejection line.
pub async fn connect(addr: &str, name: &str) -> io::Result<Negotiation> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    writer.write_all(name.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let greeting = read_reply_line(&mut reader).await?;
    if protocol::is_identity(&greeting) {
        debug!(identity = %greeting, "Admitted");
        Ok(Negotiation::Admitted(Connection {
            reader,
            writer,
            identity: greeting,
        }))
    } else {
        Ok(Negotiation::Rejected(greeting))
    }
}

impl Connection {
    /// The server-assigned identity
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Send one command line and read its reply, using the reply shape the
    /// command implies.
    pub async fn send(&mut self, line: &str) -> io::Result<ServerReply> {
        let request = protocol::parse_request(line);

        self.writer.write_all(line.trim().as_bytes()).await?;
        self.writer.write_all(b"\n").await?;

        match request {
            Request::Status => self.read_block(SESSIONS_HEADER).await,
            Request::List => {
                let first = read_reply_line(&mut self.reader).await?;
                match parse_count_header(&first, FILES_HEADER) {
                    Some(count) => self.read_block_body(first, count).await,
                    // Empty repository: the explicit single-line reply
                    None => Ok(ServerReply::Line(first)),
                }
            }
            Request::Download(name) => self.read_download(name).await,
            Request::Echo(_) | Request::Exit => {
                Ok(ServerReply::Line(read_reply_line(&mut self.reader).await?))
            }
        }
    }

    /// Read a count header and exactly that many lines
    async fn read_block(&mut self, header: &str) -> io::Result<ServerReply> {
        let first = read_reply_line(&mut self.reader).await?;
        let count = parse_count_header(&first, header)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed block header"))?;
        self.read_block_body(first, count).await
    }

    async fn read_block_body(&mut self, header: String, count: usize) -> io::Result<ServerReply> {
        let mut lines = Vec::with_capacity(count + 1);
        lines.push(header);
        for _ in 0..count {
            lines.push(read_reply_line(&mut self.reader).await?);
        }
        Ok(ServerReply::Block(lines))
    }

    /// Read a download reply: the metadata line, then exactly the declared
    /// byte count. A short read is a transfer failure, never a shorter file.
    async fn read_download(&mut self, name: String) -> io::Result<ServerReply> {
        let first = read_reply_line(&mut self.reader).await?;
        let len = match parse_file_header(&first) {
            Some(len) => len,
            // Not-found (or any error line): connection stays usable
            None => return Ok(ServerReply::Line(first)),
        };

        let mut bytes = vec![0u8; len];
        self.reader.read_exact(&mut bytes).await?;
        Ok(ServerReply::FileData { name, bytes })
    }
}

/// Read one line, stripping the newline; end-of-stream is an error here
/// because every read in the client follows a request it expects answered.
async fn read_reply_line(reader: &mut BufReader<OwnedReadHalf>) -> io::Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "server closed the connection",
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Save a downloaded file into the download directory
pub fn save_download(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Interactive session: prompt on stdin, print replies, save downloads
pub async fn run(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);

    let mut conn = match connect(&addr, &config.name).await? {
        Negotiation::Admitted(conn) => conn,
        Negotiation::Rejected(message) => {
            println!("{}", message);
            return Ok(());
        }
    };
    println!("Connected as {}", conn.identity());
    println!("Commands: status, list, download <file>, exit, or any text to echo");

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = match input.next_line().await? {
            Some(line) => line,
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let is_exit = protocol::parse_request(&line) == Request::Exit;

        match conn.send(&line).await? {
            ServerReply::Line(text) => println!("{}", text),
            ServerReply::Block(lines) => {
                for entry in lines {
                    println!("{}", entry);
                }
            }
            ServerReply::FileData { name, bytes } => {
                let path = save_download(&config.downloads, &name, &bytes)?;
                println!("Saved {} ({} bytes) to {}", name, bytes.len(), path.display());
            }
        }

        if is_exit {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_download_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_download(dir.path(), "out.bin", b"\x00\x01data").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"\x00\x01data");
    }

    #[test]
    fn test_save_download_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("downloads");
        save_download(&nested, "a.txt", b"hi").unwrap();
        assert!(nested.join("a.txt").is_file());
    }
}
