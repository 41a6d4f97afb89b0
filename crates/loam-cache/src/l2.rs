//! L2: shared remote cache speaking the RESP wire protocol.
//!
//! The distributed tier is any RESP (Redis wire) compatible key-value
//! server. Only the five commands the facade needs are implemented: GET,
//! SET with expiry, DEL, SCAN, and PING. Connections live in a small
//! bounded pool; stale or errored connections are dropped rather than
//! returned.

use crate::{CacheError, Result};
use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// L2 client configuration.
#[derive(Debug, Clone)]
pub struct RemoteCacheConfig {
    /// Server address, host:port.
    pub address: String,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Connections pre-dialed by [`RemoteCache::warm`].
    pub min_idle: usize,
    /// Dial timeout for new connections.
    pub dial_timeout: Duration,
    /// Per-operation timeout.
    pub op_timeout: Duration,
    /// Key namespace prefix.
    pub key_prefix: String,
    /// Drop pooled connections idle longer than this.
    pub idle_timeout: Duration,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            address: "localhost:6379".to_string(),
            pool_size: 10,
            min_idle: 3,
            dial_timeout: Duration::from_secs(2),
            op_timeout: Duration::from_secs(1),
            key_prefix: "dns:".to_string(),
            idle_timeout: Duration::from_secs(240),
        }
    }
}

/// A parsed RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Null,
    Array(Vec<RespValue>),
}

/// Attempts to parse one RESP value from `buf`, returning the value and the
/// number of bytes consumed, or `None` if the buffer is incomplete.
fn parse_value(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    let line = &buf[1..line_end];
    let consumed_line = line_end + 2;

    match buf[0] {
        b'+' => Ok(Some((
            RespValue::Simple(String::from_utf8_lossy(line).into_owned()),
            consumed_line,
        ))),
        b'-' => Ok(Some((
            RespValue::Error(String::from_utf8_lossy(line).into_owned()),
            consumed_line,
        ))),
        b':' => {
            let n = parse_int(line)?;
            Ok(Some((RespValue::Integer(n), consumed_line)))
        }
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some((RespValue::Null, consumed_line)));
            }
            let len = len as usize;
            let total = consumed_line + len + 2;
            if buf.len() < total {
                return Ok(None);
            }
            let data = buf[consumed_line..consumed_line + len].to_vec();
            Ok(Some((RespValue::Bulk(data), total)))
        }
        b'*' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok(Some((RespValue::Null, consumed_line)));
            }
            let mut items = Vec::with_capacity(count as usize);
            let mut offset = consumed_line;
            for _ in 0..count {
                match parse_value(&buf[offset..])? {
                    Some((item, used)) => {
                        items.push(item);
                        offset += used;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(items), offset)))
        }
        other => Err(CacheError::protocol(format!(
            "unexpected RESP type byte {:?}",
            other as char
        ))),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CacheError::protocol("invalid RESP integer"))
}

/// One pooled connection.
struct Connection {
    stream: TcpStream,
    buf: BytesMut,
    last_used: Instant,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(4096),
            last_used: Instant::now(),
        }
    }

    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }

    /// Sends one command (array of bulk strings) and reads one reply.
    async fn command(&mut self, args: &[&[u8]]) -> Result<RespValue> {
        let mut request = Vec::with_capacity(64);
        request.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
        for arg in args {
            request.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            request.extend_from_slice(arg);
            request.extend_from_slice(b"\r\n");
        }
        self.stream.write_all(&request).await?;

        loop {
            if let Some((value, used)) = parse_value(&self.buf)? {
                self.buf.advance(used);
                self.last_used = Instant::now();
                if let RespValue::Error(message) = value {
                    return Err(CacheError::protocol(message));
                }
                return Ok(value);
            }
            let read = self.stream.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Err(CacheError::unavailable("connection closed by server"));
            }
        }
    }
}

/// Client for the shared RESP cache tier.
pub struct RemoteCache {
    config: RemoteCacheConfig,
    pool: Mutex<Vec<Connection>>,
}

impl RemoteCache {
    /// Creates a client; connections are dialed lazily.
    pub fn new(config: RemoteCacheConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Returns the configured key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }

    /// Maps a fingerprint to its namespaced L2 key.
    pub fn namespaced(&self, fingerprint: &str) -> String {
        format!("{}{fingerprint}", self.config.key_prefix)
    }

    async fn dial(&self) -> Result<Connection> {
        let stream = timeout(
            self.config.dial_timeout,
            TcpStream::connect(&self.config.address),
        )
        .await
        .map_err(|_| CacheError::Timeout)?
        .map_err(CacheError::Io)?;
        stream.set_nodelay(true)?;
        Ok(Connection::new(stream))
    }

    async fn acquire(&self) -> Result<Connection> {
        {
            let mut pool = self.pool.lock();
            while let Some(conn) = pool.pop() {
                if !conn.is_idle(self.config.idle_timeout) {
                    return Ok(conn);
                }
            }
        }
        self.dial().await
    }

    fn release(&self, conn: Connection) {
        let mut pool = self.pool.lock();
        if pool.len() < self.config.pool_size {
            pool.push(conn);
        }
    }

    /// Runs one command on a pooled connection with the operation timeout.
    /// Errored or timed-out connections are dropped, not returned.
    async fn run(&self, args: &[&[u8]]) -> Result<RespValue> {
        let mut conn = self.acquire().await?;
        match timeout(self.config.op_timeout, conn.command(args)).await {
            Ok(Ok(value)) => {
                self.release(conn);
                Ok(value)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CacheError::Timeout),
        }
    }

    /// Pre-dials the configured minimum of idle connections. Failures are
    /// returned but leave the client usable; connections are otherwise
    /// dialed lazily.
    pub async fn warm(&self) -> Result<usize> {
        let wanted = self.config.min_idle.min(self.config.pool_size);
        let mut dialed = 0;
        while self.pool.lock().len() < wanted {
            let conn = self.dial().await?;
            self.release(conn);
            dialed += 1;
        }
        Ok(dialed)
    }

    /// Health probe.
    pub async fn ping(&self) -> Result<()> {
        match self.run(&[b"PING"]).await? {
            RespValue::Simple(s) if s == "PONG" => Ok(()),
            other => Err(CacheError::protocol(format!("unexpected PING reply: {other:?}"))),
        }
    }

    /// Fetches a serialized value.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        trace!(key, "l2 get");
        match self.run(&[b"GET", key.as_bytes()]).await? {
            RespValue::Bulk(data) => Ok(Some(data)),
            RespValue::Null => Ok(None),
            other => Err(CacheError::protocol(format!("unexpected GET reply: {other:?}"))),
        }
    }

    /// Stores a serialized value with a TTL.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        trace!(key, ttl_secs = ttl.as_secs(), "l2 set");
        let ttl_secs = ttl.as_secs().max(1).to_string();
        match self
            .run(&[b"SET", key.as_bytes(), value, b"EX", ttl_secs.as_bytes()])
            .await?
        {
            RespValue::Simple(s) if s == "OK" => Ok(()),
            other => Err(CacheError::protocol(format!("unexpected SET reply: {other:?}"))),
        }
    }

    /// Deletes keys; returns how many existed.
    pub async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"DEL");
        for key in keys {
            args.push(key.as_bytes());
        }
        match self.run(&args).await? {
            RespValue::Integer(n) => Ok(n.max(0) as u64),
            other => Err(CacheError::protocol(format!("unexpected DEL reply: {other:?}"))),
        }
    }

    /// Lists keys matching `prefix` via a SCAN cursor loop.
    pub async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{prefix}*");
        let mut cursor = "0".to_string();
        let mut keys = Vec::new();

        loop {
            let reply = self
                .run(&[
                    b"SCAN",
                    cursor.as_bytes(),
                    b"MATCH",
                    pattern.as_bytes(),
                    b"COUNT",
                    b"100",
                ])
                .await?;

            let RespValue::Array(items) = reply else {
                return Err(CacheError::protocol("unexpected SCAN reply"));
            };
            let [RespValue::Bulk(next_cursor), RespValue::Array(batch)] = items.as_slice() else {
                return Err(CacheError::protocol("malformed SCAN reply"));
            };

            for item in batch {
                if let RespValue::Bulk(key) = item {
                    keys.push(String::from_utf8_lossy(key).into_owned());
                }
            }

            cursor = String::from_utf8_lossy(next_cursor).into_owned();
            if cursor == "0" {
                return Ok(keys);
            }
        }
    }
}
