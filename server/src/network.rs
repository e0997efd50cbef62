//! Standalone TCP front end for [`GameServer`].
//!
//! Every connection gets two tasks: a reader that feeds inputs straight into
//! the session queue, and a writer that turns broadcast world states into
//! per-client delta snapshots against what that client last acknowledged.

use crate::error::ServerError;
use crate::game::GameServer;
use log::{debug, error, info, warn};
use shared::protocol::{read_packet, write_packet, PROTOCOL_VERSION};
use shared::sync::DeltaEncoder;
use shared::{Packet, ProtocolError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

/// Requests the reader task hands to the writer side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Ack(u64),
    RequestFull,
    Pong(u64),
}

pub struct NetworkServer {
    listener: TcpListener,
    game: Arc<GameServer>,
}

impl NetworkServer {
    pub async fn bind(addr: &str, game: Arc<GameServer>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener, game })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the game server is stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut shutdown = self.game.shutdown_signal();
        loop {
            if *shutdown.borrow_and_update() {
                info!("Listener shutting down");
                return Ok(());
            }
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let game = Arc::clone(&self.game);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, game).await {
                                    warn!("Connection {} ended with error: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Listener shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game: Arc<GameServer>,
) -> Result<(), ServerError> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    let hello = match read_packet(&mut reader).await? {
        Packet::Handshake(hello) => hello,
        other => {
            warn!("{} opened with {:?} instead of a handshake", addr, other);
            let reason = "expected handshake".to_string();
            write_packet(&mut writer, &Packet::Rejected { reason }).await?;
            return Err(ProtocolError::UnexpectedPacket("handshake").into());
        }
    };

    if let Err(e) = hello.verify() {
        warn!("Rejecting {} ({}): {}", addr, hello.player_name, e);
        let reason = e.to_string();
        write_packet(&mut writer, &Packet::Rejected { reason }).await?;
        return Ok(());
    }

    let session = match game.join(&hello.player_name).await {
        Ok(session) => session,
        Err(e) => {
            let reason = e.to_string();
            write_packet(&mut writer, &Packet::Rejected { reason }).await?;
            return Ok(());
        }
    };

    let states = game.subscribe();
    let accepted = Packet::Accepted {
        version: PROTOCOL_VERSION,
        session_id: session.id(),
        player_id: session.player_id(),
        tick: game.current_tick(),
        level: game.level_info(),
    };
    info!(
        "{} connected from {} as session {}",
        hello.player_name,
        addr,
        session.id()
    );

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let reader_task = {
        let game = Arc::clone(&game);
        let session_id = session.id();
        tokio::spawn(async move { read_loop(reader, game, session_id, control_tx).await })
    };

    let result = match write_packet(&mut writer, &accepted).await {
        Ok(()) => write_loop(&mut writer, &game, states, control_rx).await,
        Err(e) => Err(e.into()),
    };

    reader_task.abort();
    game.leave(session.id()).await;
    info!("Session {} ({}) disconnected", session.id(), addr);
    result
}

async fn read_loop<R>(
    mut reader: R,
    game: Arc<GameServer>,
    session_id: u32,
    control: mpsc::UnboundedSender<Control>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let packet = match read_packet(&mut reader).await {
            Ok(packet) => packet,
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                warn!("Session {}: read failed: {}", session_id, e);
                break;
            }
        };

        let request = match packet {
            Packet::Input { frames } => {
                for frame in frames {
                    game.queue_input(session_id, frame);
                }
                None
            }
            Packet::Ack { tick } => {
                if let Some(session) = game.sessions().get(session_id) {
                    session.acknowledge(tick);
                }
                Some(Control::Ack(tick))
            }
            Packet::RequestFull => Some(Control::RequestFull),
            Packet::Ping { timestamp } => Some(Control::Pong(timestamp)),
            Packet::Disconnect => break,
            other => {
                warn!("Session {}: unexpected {:?}", session_id, other);
                None
            }
        };

        if let Some(request) = request {
            if control.send(request).is_err() {
                break;
            }
        }
    }
}

async fn write_loop<W>(
    writer: &mut W,
    game: &GameServer,
    mut states: broadcast::Receiver<Arc<shared::WorldState>>,
    mut control: mpsc::UnboundedReceiver<Control>,
) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let mut encoder = DeltaEncoder::new(game.config().full_snapshot_interval);
    let mut shutdown = game.shutdown_signal();

    loop {
        if *shutdown.borrow_and_update() {
            write_packet(writer, &Packet::Disconnect).await?;
            return Ok(());
        }
        tokio::select! {
            state = states.recv() => match state {
                Ok(state) => {
                    let snapshot = encoder.encode(state.tick, state.to_wire_entities()?);
                    write_packet(writer, &Packet::State(snapshot)).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client lagged {} states behind, sending a full snapshot", skipped);
                    encoder.request_full();
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            request = control.recv() => match request {
                Some(Control::Ack(tick)) => {
                    if !encoder.acknowledge(tick) {
                        debug!("Ack for unknown tick {}, next snapshot is full", tick);
                    }
                }
                Some(Control::RequestFull) => {
                    info!("Client requested a full snapshot");
                    encoder.request_full();
                }
                Some(Control::Pong(timestamp)) => {
                    write_packet(writer, &Packet::Pong { timestamp }).await?;
                }
                None => return Ok(()),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    write_packet(writer, &Packet::Disconnect).await?;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use shared::protocol::{Handshake, PROTOCOL_VERSION};
    use shared::{InputFrame, Intent};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn start() -> (Arc<GameServer>, SocketAddr) {
        let config = ServerConfig {
            max_players: 1,
            ..Default::default()
        };
        let game = Arc::new(GameServer::new(config));
        let network = NetworkServer::bind("127.0.0.1:0", Arc::clone(&game))
            .await
            .unwrap();
        let addr = network.local_addr().unwrap();
        tokio::spawn(network.run());
        (game, addr)
    }

    async fn connect(addr: SocketAddr, hello: Handshake) -> (TcpStream, Packet) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_packet(&mut stream, &Packet::Handshake(hello)).await.unwrap();
        let reply = timeout(Duration::from_secs(2), read_packet(&mut stream))
            .await
            .unwrap()
            .unwrap();
        (stream, reply)
    }

    async fn framed(packets: &[Packet]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for packet in packets {
            write_packet(&mut bytes, packet).await.unwrap();
        }
        bytes
    }

    #[tokio::test]
    async fn test_read_loop_dispatches_packets() {
        let game = Arc::new(GameServer::new(ServerConfig::default()));
        let session = game.join("mock").await.unwrap();
        let bytes = framed(&[
            Packet::Input {
                frames: vec![
                    InputFrame::new(4, Intent::LEFT),
                    InputFrame::new(5, Intent::JUMP),
                ],
            },
            Packet::Ack { tick: 9 },
            Packet::Ping { timestamp: 5 },
            Packet::Disconnect,
        ])
        .await;
        let reader = tokio_test::io::Builder::new().read(&bytes).build();
        let (tx, mut rx) = mpsc::unbounded_channel();

        read_loop(reader, Arc::clone(&game), session.id(), tx).await;

        assert_eq!(session.pending_inputs(), 2);
        assert_eq!(session.last_ack_tick(), 9);
        assert_eq!(rx.recv().await, Some(Control::Ack(9)));
        assert_eq!(rx.recv().await, Some(Control::Pong(5)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_handshake_accepted() {
        let (game, addr) = start().await;
        let (_stream, reply) = connect(addr, Handshake::new("ray")).await;
        match reply {
            Packet::Accepted {
                version,
                player_id,
                level,
                ..
            } => {
                assert_eq!(version, PROTOCOL_VERSION);
                assert_eq!(player_id, 1);
                assert_eq!(level.width, 40);
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
        assert_eq!(game.session_count(), 1);
    }

    #[tokio::test]
    async fn test_old_version_rejected() {
        let (game, addr) = start().await;
        let hello = Handshake {
            version: PROTOCOL_VERSION - 1,
            player_name: "old".to_string(),
        };
        let (_stream, reply) = connect(addr, hello).await;
        assert!(matches!(reply, Packet::Rejected { .. }));
        assert_eq!(game.session_count(), 0);
    }

    #[tokio::test]
    async fn test_full_server_rejects() {
        let (_game, addr) = start().await;
        let (_first, _) = connect(addr, Handshake::new("a")).await;
        let (_second, reply) = connect(addr, Handshake::new("b")).await;
        match reply {
            Packet::Rejected { reason } => assert!(reason.contains("full")),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_states_streamed_and_inputs_queued() {
        let (game, addr) = start().await;
        let (mut stream, _) = connect(addr, Handshake::new("ray")).await;

        write_packet(
            &mut stream,
            &Packet::Input {
                frames: vec![InputFrame::new(1_000, Intent::RIGHT)],
            },
        )
        .await
        .unwrap();

        // Give the reader task a moment before driving ticks by hand.
        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..3 {
            game.process_tick().await;
        }

        let packet = timeout(Duration::from_secs(2), read_packet(&mut stream))
            .await
            .unwrap()
            .unwrap();
        match packet {
            Packet::State(snapshot) => {
                assert!(snapshot.full);
                assert_eq!(snapshot.tick, 3);
                assert_eq!(snapshot.entities.len(), 1);
            }
            other => panic!("expected State, got {:?}", other),
        }

        let session = game.sessions().snapshot().remove(0);
        assert_eq!(session.pending_inputs(), 1);
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (_game, addr) = start().await;
        let (mut stream, _) = connect(addr, Handshake::new("ray")).await;
        write_packet(&mut stream, &Packet::Ping { timestamp: 42 })
            .await
            .unwrap();
        let reply = timeout(Duration::from_secs(2), read_packet(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, Packet::Pong { timestamp: 42 });
    }

    #[tokio::test]
    async fn test_disconnect_removes_session() {
        let (game, addr) = start().await;
        let (mut stream, _) = connect(addr, Handshake::new("ray")).await;
        write_packet(&mut stream, &Packet::Disconnect).await.unwrap();

        for _ in 0..50 {
            if game.session_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(game.session_count(), 0);
        assert!(game.snapshot().await.player(1).is_none());
    }

    #[tokio::test]
    async fn test_listener_exits_when_already_stopped() {
        let game = Arc::new(GameServer::new(ServerConfig::default()));
        let _loop = game.start().unwrap();
        game.stop().await;

        let network = NetworkServer::bind("127.0.0.1:0", Arc::clone(&game))
            .await
            .unwrap();
        timeout(Duration::from_secs(2), network.run())
            .await
            .unwrap()
            .unwrap();
    }
}
