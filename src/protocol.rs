//! Text command protocol: request parsing, reply rendering, and the
//! length-prefixed file-transfer framing shared by server and client.
//!
//! All non-payload traffic is newline-delimited UTF-8. Keywords are
//! case-insensitive with surrounding whitespace trimmed; echoed text and file
//! names pass through untouched. A download reply is one metadata line
//! (`FILE_START <byte-length>`) followed by exactly that many raw bytes,
//! so arbitrary binary content is never mistaken for protocol text.

use crate::registry::{Session, SessionRegistry};
use crate::repository::{FileRepository, RepoError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Suffix appended to echoed messages
pub const ACK_SUFFIX: &str = " ACK";

/// Farewell line sent in reply to an exit command
pub const GOODBYE: &str = "BYE BYE! ACK";

/// Rejection line sent when the server is at capacity
pub const REJECT_MSG: &str = "Maximum clients reached. Server is full. Please try again later.";

/// Line sent when the repository holds no files
pub const NO_FILES: &str = "no files available";

/// Sentinel token opening a file-transfer metadata line. Reserved: no other
/// reply begins with this token.
pub const FILE_SENTINEL: &str = "FILE_START";

/// Header prefix of a status reply (`SESSIONS <n>`)
pub const SESSIONS_HEADER: &str = "SESSIONS";

/// Header prefix of a file-list reply (`FILES <n>`)
pub const FILES_HEADER: &str = "FILES";

/// One parsed client request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Text with no recognized keyword; echoed back with ACK
    Echo(String),
    /// Session table query
    Status,
    /// Repository file listing
    List,
    /// File transfer request
    Download(String),
    /// Graceful disconnect
    Exit,
}

/// Classify one request line. Unrecognized input is Echo, never an error.
pub fn parse_request(line: &str) -> Request {
    let trimmed = line.trim();
    let mut parts = trimmed.split_whitespace();
    let keyword = parts.next().unwrap_or("").to_lowercase();

    match keyword.as_str() {
        "status" if parts.next().is_none() => Request::Status,
        "list" if parts.next().is_none() => Request::List,
        "exit" if parts.next().is_none() => Request::Exit,
        "download" => match parts.next() {
            // Download takes exactly one file name
            Some(name) if parts.next().is_none() => Request::Download(name.to_string()),
            _ => Request::Echo(trimmed.to_string()),
        },
        _ => Request::Echo(trimmed.to_string()),
    }
}

/// What the connection handler should write back
#[derive(Debug)]
pub enum Reply {
    /// A single text line
    Line(String),
    /// A block of lines (status, list); the first is a count header
    Lines(Vec<String>),
    /// A file transfer: metadata line then the raw payload
    File { header: String, bytes: Vec<u8> },
    /// A single line, then close the connection gracefully
    Goodbye(String),
}

/// Maps parsed requests to replies against the registry and repository
pub struct Engine {
    registry: Arc<SessionRegistry>,
    repository: Arc<FileRepository>,
}

impl Engine {
    pub fn new(registry: Arc<SessionRegistry>, repository: Arc<FileRepository>) -> Self {
        Engine {
            registry,
            repository,
        }
    }

    /// Execute one request. Never fails: every outcome, including a missing
    /// file, is expressed as a reply for the peer.
    pub fn execute(&self, request: Request) -> Reply {
        match request {
            Request::Echo(text) => Reply::Line(format!("{}{}", text, ACK_SUFFIX)),

            Request::Status => Reply::Lines(render_status(&self.registry.snapshot())),

            Request::List => {
                let names = self.repository.list();
                if names.is_empty() {
                    Reply::Line(NO_FILES.to_string())
                } else {
                    let mut lines = Vec::with_capacity(names.len() + 1);
                    lines.push(format!("{} {}", FILES_HEADER, names.len()));
                    lines.extend(names);
                    Reply::Lines(lines)
                }
            }

            Request::Download(name) => match self.repository.read(&name) {
                Ok(bytes) => {
                    debug!(file = %name, len = bytes.len(), "Serving file");
                    Reply::File {
                        header: format!("{} {}", FILE_SENTINEL, bytes.len()),
                        bytes,
                    }
                }
                Err(err) => {
                    if let RepoError::Io(e) = &err {
                        warn!(file = %name, error = %e, "File read failed");
                    }
                    Reply::Line(download_error_line(&name, &err))
                }
            },

            Request::Exit => Reply::Goodbye(GOODBYE.to_string()),
        }
    }
}

/// Error line for a failed download. A readable-name-but-unreadable-file
/// failure is distinguished from a missing name so "not found" stays
/// unambiguous; either way the connection remains usable.
fn download_error_line(name: &str, err: &RepoError) -> String {
    match err {
        RepoError::Io(_) => format!("ERROR file unavailable: {}", name),
        RepoError::NotFound(_) | RepoError::InvalidName(_) => {
            format!("ERROR file not found: {}", name)
        }
    }
}

/// Render the session table: `SESSIONS <n>` plus one line per session
fn render_status(sessions: &[Session]) -> Vec<String> {
    let mut lines = Vec::with_capacity(sessions.len() + 1);
    lines.push(format!("{} {}", SESSIONS_HEADER, sessions.len()));
    lines.extend(sessions.iter().map(Session::render));
    lines
}

/// Parse a `FILE_START <byte-length>` metadata line
pub fn parse_file_header(line: &str) -> Option<usize> {
    let mut parts = line.trim().split_whitespace();
    if parts.next() != Some(FILE_SENTINEL) {
        return None;
    }
    let len = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(len)
}

/// Parse a `SESSIONS <n>` or `FILES <n>` count header
pub fn parse_count_header(line: &str, header: &str) -> Option<usize> {
    let mut parts = line.trim().split_whitespace();
    if parts.next() != Some(header) {
        return None;
    }
    let count = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(count)
}

/// True if a line is a server-assigned identity ("Client" + digits)
pub fn is_identity(line: &str) -> bool {
    let rest = match line.trim().strip_prefix("Client") {
        Some(rest) => rest,
        None => return false,
    };
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Admission, CloseReason};
    use std::io::Write;

    #[test]
    fn test_parse_keywords_case_and_whitespace() {
        assert_eq!(parse_request("status"), Request::Status);
        assert_eq!(parse_request("  STATUS \r"), Request::Status);
        assert_eq!(parse_request("List"), Request::List);
        assert_eq!(parse_request(" exit"), Request::Exit);
    }

    #[test]
    fn test_parse_download() {
        assert_eq!(
            parse_request("download a.txt"),
            Request::Download("a.txt".to_string())
        );
        assert_eq!(
            parse_request("DOWNLOAD  b.bin "),
            Request::Download("b.bin".to_string())
        );
        // No filename: not a recognized command form, falls through to echo
        assert_eq!(
            parse_request("download"),
            Request::Echo("download".to_string())
        );
        assert_eq!(
            parse_request("download a b"),
            Request::Echo("download a b".to_string())
        );
    }

    #[test]
    fn test_parse_echo_passthrough() {
        assert_eq!(
            parse_request("hello world"),
            Request::Echo("hello world".to_string())
        );
        // Keywords with trailing words are plain messages
        assert_eq!(
            parse_request("status report"),
            Request::Echo("status report".to_string())
        );
    }

    fn engine_with_files(
        files: &[(&str, &[u8])],
    ) -> (tempfile::TempDir, Arc<SessionRegistry>, Engine) {
        let dir = tempfile::tempdir().unwrap();
        for (name, data) in files {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(data).unwrap();
        }
        let registry = Arc::new(SessionRegistry::new(3));
        let repository = Arc::new(FileRepository::new(dir.path()));
        let engine = Engine::new(Arc::clone(&registry), repository);
        (dir, registry, engine)
    }

    #[test]
    fn test_echo_appends_ack() {
        let (_dir, _registry, engine) = engine_with_files(&[]);
        match engine.execute(Request::Echo("hello".to_string())) {
            Reply::Line(line) => assert_eq!(line, "hello ACK"),
            other => panic!("expected line, got {:?}", other),
        }
    }

    #[test]
    fn test_status_with_no_sessions() {
        let (_dir, _registry, engine) = engine_with_files(&[]);
        match engine.execute(Request::Status) {
            Reply::Lines(lines) => assert_eq!(lines, vec!["SESSIONS 0"]),
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[test]
    fn test_status_reflects_closed_session() {
        let (_dir, registry, engine) = engine_with_files(&[]);
        let addr = "127.0.0.1:4000".parse().unwrap();
        let session = match registry.try_admit(addr) {
            Admission::Admitted(s) => s,
            Admission::Rejected => panic!("unexpected rejection"),
        };
        registry.close(&session.identity, CloseReason::Graceful);

        match engine.execute(Request::Status) {
            Reply::Lines(lines) => {
                assert_eq!(lines[0], "SESSIONS 1");
                assert!(lines[1].starts_with("Client01|127.0.0.1:4000|"));
                assert!(lines[1].ends_with("|closed"));
            }
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[test]
    fn test_list_files() {
        let (_dir, _registry, engine) = engine_with_files(&[("a.txt", b"x"), ("b.bin", b"\x00")]);
        match engine.execute(Request::List) {
            Reply::Lines(lines) => assert_eq!(lines, vec!["FILES 2", "a.txt", "b.bin"]),
            other => panic!("expected lines, got {:?}", other),
        }
    }

    #[test]
    fn test_list_empty_repository() {
        let (_dir, _registry, engine) = engine_with_files(&[]);
        match engine.execute(Request::List) {
            Reply::Line(line) => assert_eq!(line, NO_FILES),
            other => panic!("expected line, got {:?}", other),
        }
    }

    #[test]
    fn test_download_found() {
        let payload: &[u8] = b"raw\nFILE_START fake\n\x00bytes";
        let (_dir, _registry, engine) = engine_with_files(&[("data.bin", payload)]);
        match engine.execute(Request::Download("data.bin".to_string())) {
            Reply::File { header, bytes } => {
                assert_eq!(header, format!("FILE_START {}", payload.len()));
                assert_eq!(bytes, payload);
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_download_missing() {
        let (_dir, _registry, engine) = engine_with_files(&[]);
        match engine.execute(Request::Download("ghost.txt".to_string())) {
            Reply::Line(line) => assert_eq!(line, "ERROR file not found: ghost.txt"),
            other => panic!("expected line, got {:?}", other),
        }
    }

    #[test]
    fn test_download_error_lines() {
        let denied = RepoError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(
            download_error_line("a.txt", &denied),
            "ERROR file unavailable: a.txt"
        );
        assert_eq!(
            download_error_line("a.txt", &RepoError::NotFound("a.txt".to_string())),
            "ERROR file not found: a.txt"
        );
        assert_eq!(
            download_error_line("../a", &RepoError::InvalidName("../a".to_string())),
            "ERROR file not found: ../a"
        );
    }

    #[test]
    fn test_exit_is_goodbye() {
        let (_dir, _registry, engine) = engine_with_files(&[]);
        assert!(matches!(
            engine.execute(Request::Exit),
            Reply::Goodbye(line) if line == GOODBYE
        ));
    }

    #[test]
    fn test_parse_file_header() {
        assert_eq!(parse_file_header("FILE_START 1024"), Some(1024));
        assert_eq!(parse_file_header("FILE_START 0"), Some(0));
        assert_eq!(parse_file_header("FILE_START"), None);
        assert_eq!(parse_file_header("FILE_START ten"), None);
        assert_eq!(parse_file_header("FILE_START 1 2"), None);
        assert_eq!(parse_file_header("hello ACK"), None);
    }

    #[test]
    fn test_parse_count_header() {
        assert_eq!(parse_count_header("SESSIONS 3", SESSIONS_HEADER), Some(3));
        assert_eq!(parse_count_header("FILES 0", FILES_HEADER), Some(0));
        assert_eq!(parse_count_header("SESSIONS x", SESSIONS_HEADER), None);
        assert_eq!(parse_count_header("FILES 1", SESSIONS_HEADER), None);
    }

    #[test]
    fn test_is_identity() {
        assert!(is_identity("Client01"));
        assert!(is_identity("Client42\n"));
        assert!(is_identity("Client100"));
        assert!(!is_identity("Client"));
        assert!(!is_identity("ClientXY"));
        assert!(!is_identity(REJECT_MSG));
    }
}
