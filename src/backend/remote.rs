//! Remote transcription backend speaking JSON lines over TCP.
//!
//! A writer thread drains a FIFO queue of outgoing messages, so audio
//! fed before `flush_and_stop` is always on the wire before the flush.
//! A reader thread parses server messages and forwards them as
//! [`BackendEvent`]s.

use crate::backend::protocol::{self, ClientMessage, ServerMessage};
use crate::backend::{BackendEvent, TranscriptionBackend};
use crate::error::{Result, VoxdError};
use crate::session::SessionConfig;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Shared slot the reader thread publishes through. Lets the event
/// receiver be registered (or replaced) after the connection is up.
#[derive(Clone, Default)]
struct EventRelay(Arc<std::sync::Mutex<Option<Sender<BackendEvent>>>>);

impl EventRelay {
    fn set(&self, sender: Sender<BackendEvent>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(sender);
        }
    }

    /// Returns false once a registered receiver has gone away.
    /// Events before any receiver is registered are dropped.
    fn send(&self, event: BackendEvent) -> bool {
        let Ok(slot) = self.0.lock() else {
            return false;
        };
        match slot.as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => true,
        }
    }
}

pub struct RemoteBackend {
    addr: String,
    events: EventRelay,
    connected: Arc<AtomicBool>,
    outbox: Option<Sender<ClientMessage>>,
    stream: Option<TcpStream>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl RemoteBackend {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            events: EventRelay::default(),
            connected: Arc::new(AtomicBool::new(false)),
            outbox: None,
            stream: None,
            writer: None,
            reader: None,
        }
    }

    /// Connect to the server and spawn the writer and reader threads.
    ///
    /// May be called before or after `set_event_sender`; events raised
    /// while no receiver is registered are dropped.
    pub fn connect(&mut self) -> Result<()> {
        let events = self.events.clone();

        let stream = TcpStream::connect(&self.addr).map_err(|e| VoxdError::Transport {
            message: format!("failed to connect to {}: {}", self.addr, e),
        })?;
        stream.set_nodelay(true).ok();

        let read_half = stream.try_clone().map_err(|e| VoxdError::Transport {
            message: format!("failed to clone stream: {}", e),
        })?;

        self.connected.store(true, Ordering::SeqCst);
        events.send(BackendEvent::ConnectionChanged(true));

        let (outbox_tx, outbox_rx) = unbounded();
        self.writer = Some(spawn_writer(
            stream.try_clone().map_err(|e| VoxdError::Transport {
                message: format!("failed to clone stream: {}", e),
            })?,
            outbox_rx,
            Arc::clone(&self.connected),
        ));
        self.reader = Some(spawn_reader(
            read_half,
            events,
            Arc::clone(&self.connected),
        ));

        self.outbox = Some(outbox_tx);
        self.stream = Some(stream);
        Ok(())
    }

    fn enqueue(&self, message: ClientMessage) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(VoxdError::Transport {
                message: format!("not connected to {}", self.addr),
            });
        }
        match &self.outbox {
            Some(outbox) => outbox.send(message).map_err(|_| VoxdError::Transport {
                message: "connection writer has shut down".to_string(),
            }),
            None => Err(VoxdError::Transport {
                message: format!("not connected to {}", self.addr),
            }),
        }
    }

    /// Close the connection and join the worker threads.
    pub fn disconnect(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.outbox = None;
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn spawn_writer(
    mut stream: TcpStream,
    outbox: Receiver<ClientMessage>,
    connected: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        // recv fails once the outbox sender is dropped at disconnect.
        while let Ok(message) = outbox.recv() {
            let line = match protocol::to_line(&message) {
                Ok(line) => line,
                Err(_) => continue,
            };
            if stream.write_all(line.as_bytes()).is_err() {
                connected.store(false, Ordering::SeqCst);
                return;
            }
        }
    })
}

fn spawn_reader(
    stream: TcpStream,
    events: EventRelay,
    connected: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            let event = match protocol::parse_server_line(&line) {
                Ok(ServerMessage::Started { ok, message }) => {
                    BackendEvent::SessionStarted { ok, message }
                }
                Ok(ServerMessage::Partial { text }) => BackendEvent::Partial(text),
                Ok(ServerMessage::Final { text }) => BackendEvent::Final(text),
                Ok(ServerMessage::Error { message }) => BackendEvent::Error(message),
                Err(e) => BackendEvent::Error(e.to_string()),
            };
            if !events.send(event) {
                break;
            }
        }
        // EOF or read error: the server went away.
        let was_connected = connected.swap(false, Ordering::SeqCst);
        if was_connected {
            events.send(BackendEvent::ConnectionChanged(false));
        }
    })
}

impl TranscriptionBackend for RemoteBackend {
    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_event_sender(&mut self, events: Sender<BackendEvent>) {
        self.events.set(events);
    }

    fn start_session(&mut self, config: &SessionConfig) -> Result<()> {
        self.enqueue(ClientMessage::StartSession {
            language: config.language.clone(),
            prompt: config.prompt.clone(),
            vocabulary: config.vocabulary.clone(),
            free_speak: config.free_speak,
        })
    }

    fn feed_audio(&mut self, samples: &[i16]) -> Result<()> {
        self.enqueue(ClientMessage::Audio {
            pcm: protocol::encode_pcm(samples),
        })
    }

    fn flush_and_stop(&mut self) -> Result<()> {
        self.enqueue(ClientMessage::Flush)
    }

    fn stop_immediately(&mut self) -> Result<()> {
        self.enqueue(ClientMessage::Abort)
    }
}
