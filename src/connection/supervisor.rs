use super::{
    framer::TelegramFramer,
    retry::RetryTimer,
    transport::{Connector, MeterStream},
    ConnectionError, ConnectionState, MeterAddress, SupervisorConfig, SupervisorEvent,
};
use crate::metering_dsmr::telegram;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::{
    io::AsyncReadExt,
    sync::mpsc::{self, error::TrySendError, Receiver, Sender, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::timeout,
};

const READ_CHUNK: usize = 2048;
const EVENT_QUEUE: usize = 64;

#[derive(Debug)]
enum Command {
    Start(MeterAddress),
    Stop,
    Reconfigure(MeterAddress),
}

/// What the supervisor does after leaving a state
enum Next {
    Idle,
    Connect,
    Connected(MeterStream),
    BackOff(ConnectionError),
    Exit,
}

/// Control side of a running [`Supervisor`]. Cloneable; the supervisor stops
/// for good once every handle is dropped.
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
    commands: UnboundedSender<Command>,
}

impl SupervisorHandle {
    /// Connect to `address`. Ignored unless the supervisor is disconnected.
    pub fn start(&self, address: MeterAddress) -> bool {
        self.send(Command::Start(address))
    }

    /// Drop the transport and any pending retry, no reconnect afterwards.
    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }

    /// Switch to a new address. An active or pending connection is replaced
    /// right away, a stopped supervisor only remembers the address.
    pub fn reconfigure(&self, address: MeterAddress) -> bool {
        self.send(Command::Reconfigure(address))
    }

    fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

pub struct Supervisor<C: Connector> {
    config: SupervisorConfig,
    connector: Arc<C>,
    address: Option<MeterAddress>,
    state: ConnectionState,
    commands: UnboundedReceiver<Command>,
    events: Sender<SupervisorEvent>,
    retry: RetryTimer,
    framer: TelegramFramer,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(config: SupervisorConfig, connector: C, events: Sender<SupervisorEvent>) -> (Self, SupervisorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();

        let supervisor = Supervisor {
            retry: RetryTimer::new(config.retry_delay),
            framer: TelegramFramer::new(config.max_telegram_len),
            config,
            connector: Arc::new(connector),
            address: None,
            state: ConnectionState::Disconnected,
            commands: rx,
            events,
        };

        (supervisor, SupervisorHandle { commands: tx })
    }

    /// Spawn a supervisor on the current runtime.
    pub fn spawn(config: SupervisorConfig, connector: C) -> (SupervisorHandle, Receiver<SupervisorEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let (supervisor, handle) = Supervisor::new(config, connector, tx);
        let join = tokio::spawn(supervisor.run());
        (handle, rx, join)
    }

    pub async fn run(mut self) {
        info!("[{}] Supervisor started", self.config.name);

        let mut next = Next::Idle;
        loop {
            next = match next {
                Next::Idle => self.idle().await,
                Next::Connect => self.connect().await,
                Next::Connected(stream) => self.connected(stream).await,
                Next::BackOff(error) => self.back_off(error).await,
                Next::Exit => break,
            };
        }

        self.retry.cancel();
        info!("[{}] All handles dropped, supervisor exits", self.config.name);
    }

    async fn idle(&mut self) -> Next {
        self.retry.cancel();
        self.set_state(ConnectionState::Disconnected).await;

        loop {
            match self.commands.recv().await {
                Some(Command::Start(address)) => {
                    self.address = Some(address);
                    return Next::Connect;
                }
                Some(Command::Reconfigure(address)) => {
                    debug!("[{}] Address set to {address} while disconnected", self.config.name);
                    self.address = Some(address);
                }
                Some(Command::Stop) => {}
                None => return Next::Exit,
            }
        }
    }

    async fn connect(&mut self) -> Next {
        let Some(address) = self.address.clone() else {
            warn!("[{}] No address configured", self.config.name);
            return Next::Idle;
        };

        self.set_state(ConnectionState::Connecting).await;
        info!("[{}] Connecting to {address}", self.config.name);

        let connector = self.connector.clone();
        let connect_timeout = self.config.connect_timeout;
        let attempt = timeout(connect_timeout, connector.connect(&address));
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return match result {
                        Ok(Ok(stream)) => Next::Connected(stream),
                        Ok(Err(e)) => Next::BackOff(ConnectionError::Transport(e)),
                        Err(_) => Next::BackOff(ConnectionError::Timeout(connect_timeout)),
                    };
                }
                command = self.commands.recv() => match command {
                    Some(Command::Start(_)) => debug!("[{}] Already connecting", self.config.name),
                    Some(Command::Stop) => {
                        info!("[{}] Connect to {address} aborted", self.config.name);
                        return Next::Idle;
                    }
                    Some(Command::Reconfigure(new_address)) => {
                        self.address = Some(new_address);
                        return Next::Connect;
                    }
                    None => return Next::Exit,
                },
            }
        }
    }

    async fn connected(&mut self, mut stream: MeterStream) -> Next {
        if !self.framer.buffered().is_empty() {
            debug!("[{}] Discarding {} bytes left from the previous connection", self.config.name, self.framer.buffered().len());
            self.framer.clear();
        }
        self.set_state(ConnectionState::Connected).await;

        let idle_timeout = self.config.idle_timeout;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            tokio::select! {
                read = timeout(idle_timeout, stream.read(&mut buf)) => match read {
                    Ok(Ok(0)) => return Next::BackOff(ConnectionError::Closed),
                    Ok(Ok(n)) => self.handle_bytes(&buf[..n]),
                    Ok(Err(e)) => return Next::BackOff(ConnectionError::Transport(e)),
                    Err(_) => return Next::BackOff(ConnectionError::Timeout(idle_timeout)),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Start(_)) => debug!("[{}] Already connected", self.config.name),
                    Some(Command::Stop) => {
                        info!("[{}] Connection closed on request", self.config.name);
                        return Next::Idle;
                    }
                    Some(Command::Reconfigure(address)) => {
                        info!("[{}] Switching to {address}", self.config.name);
                        self.address = Some(address);
                        return Next::Connect;
                    }
                    None => return Next::Exit,
                },
            }
        }
    }

    async fn back_off(&mut self, error: ConnectionError) -> Next {
        warn!("[{}] {error}, retrying in {:?}", self.config.name, self.retry.delay());
        self.emit(SupervisorEvent::TransportError(error.to_string())).await;
        self.set_state(ConnectionState::BackingOff).await;
        self.retry.arm();

        loop {
            tokio::select! {
                _ = self.retry.fired() => return Next::Connect,
                command = self.commands.recv() => match command {
                    Some(Command::Start(_)) => debug!("[{}] Retry already scheduled", self.config.name),
                    Some(Command::Stop) => {
                        self.retry.cancel();
                        return Next::Idle;
                    }
                    Some(Command::Reconfigure(address)) => {
                        self.retry.cancel();
                        self.address = Some(address);
                        return Next::Connect;
                    }
                    None => return Next::Exit,
                },
            }
        }
    }

    fn handle_bytes(&mut self, chunk: &[u8]) {
        for frame in self.framer.push(chunk) {
            match frame {
                Ok(text) => match telegram::decode(&text) {
                    Ok(snapshot) => self.offer(SupervisorEvent::Snapshot(snapshot)),
                    Err(e) => {
                        warn!("[{}] Telegram not decodable: {e}", self.config.name);
                        self.offer(SupervisorEvent::DecodeError {
                            reason: e.to_string(),
                            raw: text,
                        });
                    }
                },
                Err(e) => {
                    error!("[{}] {e}", self.config.name);
                    self.offer(SupervisorEvent::DecodeError {
                        reason: e.to_string(),
                        raw: String::new(),
                    });
                }
            }
        }
    }

    async fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }

        info!("[{}] {} -> {}", self.config.name, self.state, state);
        self.state = state;
        self.emit(SupervisorEvent::ConnectionState(state)).await;
    }

    /// State changes and transport errors wait for room in the queue.
    async fn emit(&mut self, event: SupervisorEvent) {
        if self.events.send(event).await.is_err() {
            debug!("[{}] Nobody listens for events anymore", self.config.name);
        }
    }

    /// Telegrams never wait for the receiver, the socket and the command
    /// channel keep being served while it lags behind.
    fn offer(&self, event: SupervisorEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("[{}] Event queue full, dropping {}", self.config.name, event.kind());
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[{}] Nobody listens for events anymore", self.config.name);
            }
        }
    }
}
