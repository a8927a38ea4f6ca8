//! # Connection Handler
//!
//! One task per client. After the handshake it does two things at once:
//! pushes every received line into the entity's intake, and writes back
//! whatever the tick scheduler queued in the entity's outbox. When the
//! entity is terminated it flushes the outbox, says `mort` and hangs up.
//!
//! The handler never touches game state beyond spawn and despawn.
//!
//! Incoming bytes are split on `\n` with an optional `\r` stripped. Lines
//! are decoded lossily, so invalid UTF-8 reaches the rules as an unknown
//! command instead of ending the session. Lines over [`MAX_LINE_LEN`] are
//! dropped and answered with `ko`.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zappy_core::{Entity, EntityId, World, WorldError, OUTBOX_CAPACITY};

use crate::rules::REPLY_KO;

/// First line sent to every client.
pub const WELCOME: &str = "BIENVENUE";

/// Status line acknowledging the team name.
pub const HANDSHAKE_OK: &str = "0";

/// Sent when a command was dropped because the intake is full.
pub const BUSY: &str = "suc";

/// Sent when the entity dies.
pub const DEATH: &str = "mort";

/// Longest accepted line in bytes, not counting the `\n`.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Why a connection ended abnormally.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Socket failure.
    #[error("connection i/o error: {0}")]
    Io(#[from] io::Error),

    /// The entity could not be added to the world.
    #[error("registration failed: {0}")]
    Register(#[from] WorldError),
}

/// Serves one client until it disconnects or its entity dies.
///
/// The entity, if one was registered, is always evicted before returning.
///
/// # Errors
///
/// Returns [`ConnectionError`] on socket failure or if `id` is already
/// registered.
pub async fn handle_connection<S>(
    stream: S,
    id: EntityId,
    world: Arc<World>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = LineReader::new(reader);

    write_line(&mut writer, WELCOME).await?;
    let team = match lines.next_line().await? {
        Some(Line::Text(team)) => team,
        Some(Line::TooLong) => {
            warn!(entity = id.0, limit = MAX_LINE_LEN, "team name too long, hanging up");
            return Ok(());
        }
        None => {
            debug!(entity = id.0, "closed before handshake");
            return Ok(());
        }
    };

    let (outbox_tx, mut outbox) = mpsc::channel(OUTBOX_CAPACITY);
    let entity = world.spawn(id, &team, outbox_tx)?;
    info!(entity = id.0, team = %team, "client joined");

    let result = session(&entity, &world, &mut lines, &mut writer, &mut outbox).await;

    world.despawn(id);
    info!(entity = id.0, "client left");
    result
}

async fn session<R, W>(
    entity: &Entity,
    world: &World,
    lines: &mut LineReader<R>,
    writer: &mut W,
    outbox: &mut mpsc::Receiver<String>,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_line(writer, HANDSHAKE_OK).await?;
    write_line(writer, &format!("{} {}", world.width(), world.height())).await?;

    let mut termination = entity.termination();
    if entity.is_terminated() {
        farewell(writer, outbox).await?;
        return Ok(());
    }

    loop {
        tokio::select! {
            biased;

            _ = termination.changed() => {
                farewell(writer, outbox).await?;
                return Ok(());
            }
            message = outbox.recv() => match message {
                Some(line) => write_line(writer, &line).await?,
                None => return Ok(()),
            },
            line = lines.next_line() => match line? {
                None => return Ok(()),
                Some(Line::TooLong) => {
                    warn!(entity = entity.id().0, limit = MAX_LINE_LEN, "line too long, dropped");
                    write_line(writer, REPLY_KO).await?;
                }
                Some(Line::Text(command)) => {
                    if command.is_empty() {
                        continue;
                    }
                    if !entity.intake().try_push(&command) {
                        debug!(entity = entity.id().0, command = %command, "intake full, command dropped");
                        write_line(writer, BUSY).await?;
                    }
                }
            },
        }
    }
}

/// Writes whatever is still queued, then the death notice.
async fn farewell<W>(writer: &mut W, outbox: &mut mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(line) = outbox.try_recv() {
        write_line(writer, &line).await?;
    }
    write_line(writer, DEATH).await
}

async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    writer.write_all(buf.as_bytes()).await?;
    writer.flush().await
}

// ============================================================================
// LINE FRAMING
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Text(String),
    TooLong,
}

/// Length-capped line splitter.
///
/// Cancel safe: a partial line stays in `buf` when `next_line` is dropped
/// mid-read, so it can sit in a `select!` loop.
struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            discarding: false,
        }
    }

    /// Next line, or `None` at end of stream.
    ///
    /// An unterminated tail before end of stream counts as a line.
    async fn next_line(&mut self) -> io::Result<Option<Line>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if std::mem::take(&mut self.discarding) {
                    return Ok(Some(Line::TooLong));
                }
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let (chunk, used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (end, end + 1, true),
                None => (available.len(), available.len(), false),
            };
            if !self.discarding {
                if self.buf.len() + chunk > MAX_LINE_LEN {
                    self.discarding = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(&available[..chunk]);
                }
            }
            self.inner.consume(used);

            if complete {
                if std::mem::take(&mut self.discarding) {
                    return Ok(Some(Line::TooLong));
                }
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> Line {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Line::Text(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use zappy_core::{Position, WorldGrid};

    type ClientLines = Lines<BufReader<ReadHalf<DuplexStream>>>;

    struct Client {
        lines: ClientLines,
        writer: WriteHalf<DuplexStream>,
        handle: JoinHandle<Result<(), ConnectionError>>,
    }

    impl Client {
        fn connect(world: &Arc<World>, id: u64) -> Self {
            let (client, server) = tokio::io::duplex(4096);
            let handle = tokio::spawn(handle_connection(server, EntityId(id), Arc::clone(world)));
            let (reader, writer) = tokio::io::split(client);
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
                handle,
            }
        }

        async fn send(&mut self, line: &str) {
            self.send_bytes(line.as_bytes()).await;
        }

        async fn send_bytes(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .unwrap()
                .unwrap()
        }

        async fn handshake(&mut self, team: &str) {
            assert_eq!(self.recv().await.as_deref(), Some(WELCOME));
            self.send(&format!("{team}\n")).await;
            assert_eq!(self.recv().await.as_deref(), Some(HANDSHAKE_OK));
        }

        async fn finish(self) -> Result<(), ConnectionError> {
            timeout(Duration::from_secs(2), self.handle).await.unwrap().unwrap()
        }
    }

    fn world(capacity: usize) -> Arc<World> {
        Arc::new(World::new(WorldGrid::new(10, 8).unwrap(), capacity))
    }

    async fn wait_for_intake(entity: &Entity, len: usize) {
        for _ in 0..200 {
            if entity.intake().len() == len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("intake never reached {len} commands");
    }

    async fn split_lines(bytes: &[u8]) -> Vec<Line> {
        let mut reader = LineReader::new(bytes);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    fn text(line: &str) -> Line {
        Line::Text(line.to_string())
    }

    #[tokio::test]
    async fn test_line_framing() {
        assert_eq!(
            split_lines(b"avance\r\ndroite\n\ninventaire").await,
            vec![text("avance"), text("droite"), text(""), text("inventaire")]
        );
        assert_eq!(
            split_lines(b"\xff\xfe\nok\n").await,
            vec![text("\u{fffd}\u{fffd}"), text("ok")]
        );

        let mut long = vec![b'x'; MAX_LINE_LEN + 1];
        long.extend_from_slice(b"\navance\n");
        assert_eq!(split_lines(&long).await, vec![Line::TooLong, text("avance")]);

        let exact = vec![b'x'; MAX_LINE_LEN];
        let lines = split_lines(&exact).await;
        assert!(matches!(&lines[..], [Line::Text(line)] if line.len() == MAX_LINE_LEN));

        assert_eq!(split_lines(&vec![b'x'; MAX_LINE_LEN * 2]).await, vec![Line::TooLong]);
        assert!(split_lines(b"").await.is_empty());
    }

    async fn wait_for(world: &World, id: u64) -> Arc<Entity> {
        for _ in 0..200 {
            if let Some(entity) = world.registry().lookup(EntityId(id)) {
                return entity;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("entity {id} never registered");
    }

    #[tokio::test]
    async fn test_handshake() {
        let world = world(10);
        let mut client = Client::connect(&world, 5);
        client.handshake("red\r").await;
        assert_eq!(client.recv().await.as_deref(), Some("10 8"));

        let entity = wait_for(&world, 5).await;
        assert_eq!(entity.team(), "red");
        assert_eq!(entity.position(), Position::new(5, 5));
    }

    #[tokio::test]
    async fn test_lines_reach_intake_in_order() {
        let world = world(10);
        let mut client = Client::connect(&world, 1);
        client.handshake("red").await;
        client.recv().await;

        client.send("avance\r\n\ndroite\n  \ninventaire\n").await;
        let entity = wait_for(&world, 1).await;
        wait_for_intake(&entity, 4).await;

        // Only the truly empty line is skipped.
        assert_eq!(entity.intake().try_pop().as_deref(), Some("avance"));
        assert_eq!(entity.intake().try_pop().as_deref(), Some("droite"));
        assert_eq!(entity.intake().try_pop().as_deref(), Some("  "));
        assert_eq!(entity.intake().try_pop().as_deref(), Some("inventaire"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_session() {
        let world = world(10);
        let mut client = Client::connect(&world, 1);
        client.handshake("red").await;
        client.recv().await;

        client.send_bytes(b"\xff\xfe\navance\n").await;
        let entity = wait_for(&world, 1).await;
        wait_for_intake(&entity, 2).await;

        assert!(world.registry().contains(EntityId(1)));
        assert_eq!(entity.intake().try_pop().as_deref(), Some("\u{fffd}\u{fffd}"));
        assert_eq!(entity.intake().try_pop().as_deref(), Some("avance"));
        assert!(!client.handle.is_finished());
    }

    #[tokio::test]
    async fn test_oversized_line_answers_ko() {
        let world = world(10);
        let mut client = Client::connect(&world, 1);
        client.handshake("red").await;
        client.recv().await;
        let entity = wait_for(&world, 1).await;

        let mut burst = vec![b'a'; MAX_LINE_LEN + 10];
        burst.extend_from_slice(b"\navance\n");
        client.send_bytes(&burst).await;

        assert_eq!(client.recv().await.as_deref(), Some(REPLY_KO));
        wait_for_intake(&entity, 1).await;
        assert_eq!(entity.intake().try_pop().as_deref(), Some("avance"));
        assert!(world.registry().contains(EntityId(1)));
    }

    #[tokio::test]
    async fn test_full_intake_answers_busy() {
        let world = world(2);
        let mut client = Client::connect(&world, 1);
        client.handshake("red").await;
        client.recv().await;

        client.send("avance\navance\navance\n").await;
        assert_eq!(client.recv().await.as_deref(), Some(BUSY));

        let entity = wait_for(&world, 1).await;
        assert_eq!(entity.intake().len(), 2);
    }

    #[tokio::test]
    async fn test_outbox_lines_are_forwarded() {
        let world = world(10);
        let mut client = Client::connect(&world, 1);
        client.handshake("red").await;
        client.recv().await;

        let entity = wait_for(&world, 1).await;
        assert!(entity.notify("ok"));
        assert_eq!(client.recv().await.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_disconnect_evicts_entity() {
        let world = world(10);
        let mut client = Client::connect(&world, 3);
        client.handshake("red").await;
        client.recv().await;
        wait_for(&world, 3).await;

        client.writer.shutdown().await.unwrap();
        client.finish().await.unwrap();

        assert!(world.registry().is_empty());
        assert_eq!(world.lock_grid().occupant_count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_ends_session() {
        let world = world(10);
        let mut client = Client::connect(&world, 2);
        client.handshake("red").await;
        client.recv().await;

        let entity = wait_for(&world, 2).await;
        entity.terminate();
        assert_eq!(client.recv().await.as_deref(), Some(DEATH));
        assert_eq!(client.recv().await, None);
        client.finish().await.unwrap();
        assert!(world.registry().is_empty());
    }

    #[tokio::test]
    async fn test_death_reaches_client_with_full_outbox() {
        let world = world(10);
        let mut client = Client::connect(&world, 2);
        client.handshake("red").await;
        client.recv().await;

        // No await between these: the handler cannot drain in between.
        let entity = wait_for(&world, 2).await;
        for n in 0..OUTBOX_CAPACITY {
            assert!(entity.notify(format!("line {n}")));
        }
        assert!(!entity.notify("overflow"));
        entity.terminate();

        for n in 0..OUTBOX_CAPACITY {
            assert_eq!(client.recv().await, Some(format!("line {n}")));
        }
        assert_eq!(client.recv().await.as_deref(), Some(DEATH));
        assert_eq!(client.recv().await, None);
        client.finish().await.unwrap();
        assert!(world.registry().is_empty());
    }

    #[tokio::test]
    async fn test_eof_before_handshake() {
        let world = world(10);
        let mut client = Client::connect(&world, 1);
        assert_eq!(client.recv().await.as_deref(), Some(WELCOME));
        client.writer.shutdown().await.unwrap();
        client.finish().await.unwrap();
        assert!(world.registry().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_fails_connection() {
        let world = world(10);
        let (tx, _rx) = mpsc::channel(1);
        world.spawn(EntityId(7), "blue", tx).unwrap();

        let mut client = Client::connect(&world, 7);
        assert_eq!(client.recv().await.as_deref(), Some(WELCOME));
        client.send("red\n").await;
        assert_eq!(client.recv().await, None);
        assert!(matches!(
            client.finish().await,
            Err(ConnectionError::Register(WorldError::DuplicateEntity(EntityId(7))))
        ));
        assert_eq!(world.registry().lookup(EntityId(7)).unwrap().team(), "blue");
    }
}
