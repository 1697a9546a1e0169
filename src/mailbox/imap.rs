//! IMAP-over-TLS mailbox access.
//!
//! The connection is blocking (rustls over `std::net::TcpStream`). Every
//! command moves the connection into `spawn_blocking` and back, so one
//! session is driven by one task at a time.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use super::{MailboxAccess, MailboxSession, RawMessage};
use crate::config::MailAccount;
use crate::error::MailboxError;

/// Header fields requested for every message. The MIME fields let the parser
/// decode multipart bodies; the recovery stages handle whatever slips through.
const HEADER_FIELDS: &str =
    "FROM TO CC BCC SUBJECT DATE MIME-VERSION CONTENT-TYPE CONTENT-TRANSFER-ENCODING";

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Buffered reads, unbuffered writes over one TLS stream.
struct TlsIo(BufReader<TlsStream>);

impl Read for TlsIo {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl BufRead for TlsIo {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.0.fill_buf()
    }
    fn consume(&mut self, amt: usize) {
        self.0.consume(amt)
    }
}

impl Write for TlsIo {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.get_mut().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.get_mut().flush()
    }
}

/// Opens IMAP sessions over implicit TLS.
#[derive(Debug, Clone)]
pub struct ImapMailbox {
    timeout: Duration,
}

impl ImapMailbox {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl MailboxAccess for ImapMailbox {
    async fn open(&self, account: &MailAccount) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let account = account.clone();
        let timeout = self.timeout;
        let conn = tokio::task::spawn_blocking(move || ImapConn::connect(&account, timeout))
            .await
            .map_err(|e| MailboxError::Task(e.to_string()))??;
        Ok(Box::new(ImapSession { conn: Some(conn) }))
    }
}

struct ImapSession {
    conn: Option<ImapConn<TlsIo>>,
}

impl ImapSession {
    /// Run a blocking operation against the connection.
    async fn run<T, F>(&mut self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapConn<TlsIo>) -> Result<T, MailboxError> + Send + 'static,
    {
        let mut conn = self.conn.take().ok_or(MailboxError::Closed)?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| MailboxError::Task(e.to_string()))?;
        // A failed command leaves the stream in an unknown state.
        if result.is_ok() {
            self.conn = Some(conn);
        }
        result
    }
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn list_ids(&mut self) -> Result<Vec<u32>, MailboxError> {
        self.run(|conn| {
            let resp = conn.command("SEARCH ALL")?;
            Ok(parse_search_ids(&resp.lines))
        })
        .await
    }

    async fn fetch(&mut self, seq: u32) -> Result<RawMessage, MailboxError> {
        self.run(move |conn| {
            let resp = conn.command(&format!(
                "FETCH {seq} (BODY.PEEK[HEADER.FIELDS ({HEADER_FIELDS})] BODY.PEEK[TEXT])"
            ))?;
            Ok(raw_message_from(seq, resp))
        })
        .await
    }

    async fn close(mut self: Box<Self>) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || conn.command("LOGOUT")).await {
            Ok(Ok(_)) => debug!("IMAP session closed"),
            Ok(Err(e)) => debug!(error = %e, "IMAP logout failed"),
            Err(e) => warn!(error = %e, "IMAP logout task failed"),
        }
    }
}

// ── Protocol ────────────────────────────────────────────────────────

/// A completed tagged command.
#[derive(Debug, Default)]
struct Response {
    /// Untagged and continuation lines, literals removed.
    lines: Vec<String>,
    /// Literals with the line text that announced them.
    literals: Vec<(String, Vec<u8>)>,
}

struct ImapConn<S> {
    stream: S,
    next_tag: u32,
}

impl ImapConn<TlsIo> {
    fn connect(account: &MailAccount, timeout: Duration) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((account.host.as_str(), account.imap_port)).map_err(|e| {
            MailboxError::Connect {
                host: account.host.clone(),
                port: account.imap_port,
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls_config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| MailboxError::Tls(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let server_name = rustls_pki_types::ServerName::try_from(account.host.clone())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let tls = rustls::ClientConnection::new(Arc::new(tls_config), server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        let mut conn = ImapConn {
            stream: TlsIo(BufReader::new(rustls::StreamOwned::new(tls, tcp))),
            next_tag: 1,
        };

        let greeting = read_line(&mut conn.stream)?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&account.user),
            quote(account.password.expose_secret())
        );
        conn.command(&login).map_err(|e| match e {
            MailboxError::Command { .. } => MailboxError::LoginRejected {
                user: account.user.clone(),
            },
            other => other,
        })?;
        conn.command("EXAMINE \"INBOX\"")?;

        info!(host = %account.host, mailbox = %account.id, "IMAP session opened");
        Ok(conn)
    }
}

impl<S: BufRead + Write> ImapConn<S> {
    /// Send one command and read through its tagged completion.
    fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let verb = cmd.split_whitespace().next().unwrap_or_default().to_string();
        read_response(&mut self.stream, &tag, &verb)
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, MailboxError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(MailboxError::Protocol("connection closed".into()));
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read lines (and literals) until the line tagged `tag`.
fn read_response<R: BufRead>(reader: &mut R, tag: &str, verb: &str) -> Result<Response, MailboxError> {
    let mut resp = Response::default();
    let tagged = format!("{tag} ");

    loop {
        let mut line = read_line(reader)?;

        while let Some(len) = literal_len(&line) {
            let mut literal = vec![0u8; len];
            reader.read_exact(&mut literal)?;
            resp.literals.push((line.clone(), literal));
            resp.lines.push(line);
            line = read_line(reader)?;
        }

        if let Some(status) = line.strip_prefix(&tagged) {
            if status.starts_with("OK") {
                return Ok(resp);
            }
            return Err(MailboxError::Command {
                command: verb.to_string(),
                response: status.trim_end().to_string(),
            });
        }
        resp.lines.push(line);
    }
}

/// Length of the literal announced at the end of `line` (`... {123}\r\n`).
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let body = trimmed.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].trim_end_matches('+').parse().ok()
}

fn parse_search_ids(lines: &[String]) -> Vec<u32> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter_map(|id| id.parse().ok())
        .collect()
}

/// Which FETCH section a literal belongs to.
#[derive(Debug, PartialEq, Eq)]
enum Section {
    Header,
    Text,
    Other,
}

fn section_of(announce: &str) -> Section {
    let upper = announce.to_ascii_uppercase();
    let Some(start) = upper.rfind("BODY[") else {
        return Section::Other;
    };
    let item = &upper[start..];
    if item.starts_with("BODY[HEADER") {
        Section::Header
    } else if item.starts_with("BODY[TEXT]") {
        Section::Text
    } else {
        Section::Other
    }
}

fn raw_message_from(seq: u32, resp: Response) -> RawMessage {
    let mut msg = RawMessage {
        seq,
        header: String::new(),
        body: String::new(),
    };
    for (announce, bytes) in resp.literals {
        match section_of(&announce) {
            Section::Header => msg.header = String::from_utf8_lossy(&bytes).into_owned(),
            Section::Text => msg.body = String::from_utf8_lossy(&bytes).into_owned(),
            Section::Other => {}
        }
    }
    msg
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
