//! TCP link to a standalone server.
//!
//! After the handshake the socket is split: a reader task decodes delta
//! snapshots into full world states and a writer task sends whatever the
//! client and the reader queue up (inputs, acks, full-state requests).

use log::{debug, info, warn};
use shared::protocol::{read_packet, verify_version, write_packet, Handshake, LevelInfo};
use shared::sync::{DeltaDecoder, SyncError};
use shared::{InputFrame, Packet, ProtocolError, WorldState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Marks an unmeasured round trip.
const NO_RTT: u64 = u64::MAX;

pub struct RemoteLink {
    session_id: u32,
    player_id: u32,
    server_tick: u64,
    level: LevelInfo,
    outgoing: mpsc::UnboundedSender<Packet>,
    states: mpsc::UnboundedReceiver<Arc<WorldState>>,
    epoch: Instant,
    rtt_micros: Arc<AtomicU64>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl RemoteLink {
    pub async fn connect(addr: &str, name: &str) -> Result<Self, ProtocolError> {
        info!("Connecting to {}...", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut writer = BufWriter::new(writer);

        write_packet(&mut writer, &Packet::Handshake(Handshake::new(name))).await?;
        let (session_id, player_id, server_tick, level) = match read_packet(&mut reader).await? {
            Packet::Accepted {
                version,
                session_id,
                player_id,
                tick,
                level,
            } => {
                if let Err(e) = verify_version(version) {
                    warn!("Server speaks protocol {}: {}", version, e);
                    let _ = write_packet(&mut writer, &Packet::Disconnect).await;
                    return Err(e);
                }
                (session_id, player_id, tick, level)
            }
            Packet::Rejected { reason } => return Err(ProtocolError::Rejected(reason)),
            _ => return Err(ProtocolError::UnexpectedPacket("accepted")),
        };
        info!(
            "Connected! Session {}, player {}, server tick {}",
            session_id, player_id, server_tick
        );

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (states_tx, states) = mpsc::unbounded_channel();
        let epoch = Instant::now();
        let rtt_micros = Arc::new(AtomicU64::new(NO_RTT));
        let reader = tokio::spawn(read_loop(
            reader,
            states_tx,
            outgoing.clone(),
            epoch,
            Arc::clone(&rtt_micros),
        ));
        let writer = tokio::spawn(write_loop(writer, outgoing_rx));

        Ok(Self {
            session_id,
            player_id,
            server_tick,
            level,
            outgoing,
            states,
            epoch,
            rtt_micros,
            reader,
            writer,
        })
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    /// Server tick at the moment the connection was accepted.
    pub fn server_tick(&self) -> u64 {
        self.server_tick
    }

    pub fn level(&self) -> LevelInfo {
        self.level
    }

    /// Queues frames for sending. `false` once the connection is gone.
    pub fn send_inputs(&self, frames: Vec<InputFrame>) -> bool {
        self.outgoing.send(Packet::Input { frames }).is_ok()
    }

    pub fn send_input(&self, frame: InputFrame) -> bool {
        self.send_inputs(vec![frame])
    }

    /// Sends a ping stamped with the time since connecting; the matching
    /// pong updates [`RemoteLink::rtt`].
    pub fn ping(&self) -> bool {
        let timestamp = self.epoch.elapsed().as_micros() as u64;
        self.outgoing.send(Packet::Ping { timestamp }).is_ok()
    }

    /// Round trip of the latest answered ping.
    pub fn rtt(&self) -> Option<Duration> {
        match self.rtt_micros.load(Ordering::Acquire) {
            NO_RTT => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }

    pub fn try_recv_state(&mut self) -> Option<Arc<WorldState>> {
        self.states.try_recv().ok()
    }

    /// Next decoded state, or `None` once the server is gone.
    pub async fn recv_state(&mut self) -> Option<Arc<WorldState>> {
        self.states.recv().await
    }

    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }

    /// Says goodbye and waits for the writer to flush.
    pub async fn disconnect(self) {
        let _ = self.outgoing.send(Packet::Disconnect);
        drop(self.outgoing);
        if let Err(e) = self.writer.await {
            warn!("Writer task failed: {}", e);
        }
        self.reader.abort();
    }
}

async fn read_loop<R>(
    mut reader: R,
    states: mpsc::UnboundedSender<Arc<WorldState>>,
    outgoing: mpsc::UnboundedSender<Packet>,
    epoch: Instant,
    rtt_micros: Arc<AtomicU64>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = DeltaDecoder::default();
    loop {
        let packet = match read_packet(&mut reader).await {
            Ok(packet) => packet,
            Err(ProtocolError::ConnectionClosed) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                break;
            }
        };

        match packet {
            Packet::State(snapshot) => {
                let table = match decoder.apply(&snapshot) {
                    Ok(table) => table,
                    Err(SyncError::MissingBaseline { tick, baseline }) => {
                        warn!(
                            "State {} references unknown baseline {}, requesting full",
                            tick, baseline
                        );
                        let _ = outgoing.send(Packet::RequestFull);
                        continue;
                    }
                };
                let state = match WorldState::from_wire(snapshot.tick, table.values()) {
                    Ok(state) => state,
                    Err(e) => {
                        warn!("Undecodable state {}: {}", snapshot.tick, e);
                        decoder.clear();
                        let _ = outgoing.send(Packet::RequestFull);
                        continue;
                    }
                };
                let _ = outgoing.send(Packet::Ack {
                    tick: snapshot.tick,
                });
                if states.send(Arc::new(state)).is_err() {
                    break;
                }
            }
            Packet::Pong { timestamp } => {
                let now = epoch.elapsed().as_micros() as u64;
                let rtt = now.saturating_sub(timestamp);
                rtt_micros.store(rtt, Ordering::Release);
                debug!("Round trip {:.2} ms", rtt as f64 / 1000.0);
            }
            Packet::Disconnect => {
                info!("Server is shutting down");
                break;
            }
            other => warn!("Unexpected packet {:?}", other),
        }
    }
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<Packet>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = outgoing.recv().await {
        let last = packet == Packet::Disconnect;
        if let Err(e) = write_packet(&mut writer, &packet).await {
            warn!("Send failed: {}", e);
            break;
        }
        if last {
            break;
        }
    }
}
