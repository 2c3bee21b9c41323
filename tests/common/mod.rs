//! Scripted rcon server used by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};

use raptor::{Packet, PacketType};
use tokio::{
    io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf},
    net::TcpListener,
};

#[derive(Clone, Default)]
pub struct StubServer {
    pub password: String,
    /// command -> fragments sent back for it
    pub responses: HashMap<String, Vec<String>>,
    /// Send an empty SERVERDATA_RESPONSE_VALUE before the auth result.
    pub echo_before_auth: bool,
    /// Answer the login with this id no matter what.
    pub auth_reply_id: Option<u32>,
    /// Send a packet with this id before every command response.
    pub stray_id: Option<u32>,
    /// Never answer this command.
    pub silent_on: Option<String>,
    /// Send half a packet and disconnect on this command.
    pub hang_up_on: Option<String>,
    pub reply_delay: Option<Duration>,
    /// Answer this command with a packet whose body is not ascii.
    pub garble_on: Option<String>,
}

impl StubServer {
    pub fn new(password: &str) -> Self {
        StubServer {
            password: password.to_owned(),
            ..Default::default()
        }
    }

    pub fn respond(mut self, command: &str, fragments: &[&str]) -> Self {
        self.responses.insert(
            command.to_owned(),
            fragments.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    /// Serves one client over an in-memory pipe and returns the client end.
    pub fn spawn_duplex(self) -> DuplexStream {
        let (client, server) = duplex(256 * 1024);
        tokio::spawn(self.serve(server));
        client
    }

    /// Binds a loopback listener and serves every client that connects.
    pub async fn spawn_tcp(self) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(self.clone().serve(stream));
            }
        });

        port
    }

    /// Answers the login, then hangs up.
    pub async fn serve_login<S>(self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(packet) = read_packet(&mut stream).await {
            let bytes: Vec<u8> = self.auth_replies(&packet).iter().flat_map(Packet::pack).collect();
            let _ = stream.write_all(&bytes).await;
        }
    }

    pub async fn serve<S>(self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(packet) = read_packet(&mut stream).await {
            let replies = match packet.packet_type() {
                PacketType::Auth => self.auth_replies(&packet),
                PacketType::Exec if packet.body().is_empty() => vec![response(packet.id(), "")],
                PacketType::Exec => {
                    let command = packet.body();
                    if self.silent_on.as_deref() == Some(command) {
                        std::future::pending::<()>().await;
                    }
                    if self.hang_up_on.as_deref() == Some(command) {
                        let half = response(packet.id(), "cut off").pack();
                        let _ = stream.write_all(&half[..half.len() / 2]).await;
                        return;
                    }
                    if self.garble_on.as_deref() == Some(command) {
                        let _ = stream.write_all(&garbled_frame(packet.id())).await;
                        continue;
                    }
                    if let Some(delay) = self.reply_delay {
                        tokio::time::sleep(delay).await;
                    }
                    self.command_replies(&packet)
                }
                PacketType::Response => Vec::new(),
            };

            let bytes: Vec<u8> = replies.iter().flat_map(Packet::pack).collect();
            if stream.write_all(&bytes).await.is_err() {
                return;
            }
        }
    }

    fn auth_replies(&self, packet: &Packet) -> Vec<Packet> {
        let mut replies = Vec::new();
        if self.echo_before_auth {
            replies.push(response(packet.id(), ""));
        }

        let id = self.auth_reply_id.unwrap_or(if packet.body() == self.password {
            packet.id()
        } else {
            u32::MAX
        });
        replies.push(Packet::new(id, PacketType::AUTH_RESPONSE, "").unwrap());
        replies
    }

    fn command_replies(&self, packet: &Packet) -> Vec<Packet> {
        let mut replies = Vec::new();
        if let Some(stray) = self.stray_id {
            replies.push(response(stray, "stray"));
        }

        match self.responses.get(packet.body()) {
            Some(fragments) => {
                replies.extend(fragments.iter().map(|f| response(packet.id(), f)));
            }
            None => {
                let body = format!("Unknown command: {}", packet.body());
                replies.push(response(packet.id(), &body));
            }
        }
        replies
    }
}

fn garbled_frame(id: u32) -> Vec<u8> {
    let body = [b'o', b'k', 0xe9];
    let mut frame = Vec::new();
    frame.extend_from_slice(&(body.len() as u32 + 10).to_le_bytes());
    frame.extend_from_slice(&id.to_le_bytes());
    frame.extend_from_slice(&PacketType::Response.to_le_bytes());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&[0, 0]);
    frame
}

fn response(id: u32, body: &str) -> Packet {
    Packet::new(id, PacketType::Response, body).unwrap()
}

async fn read_packet<S: AsyncRead + Unpin>(stream: &mut S) -> Option<Packet> {
    let mut size = [0u8; 4];
    stream.read_exact(&mut size).await.ok()?;

    let mut frame = vec![0u8; u32::from_le_bytes(size) as usize + 4];
    frame[..4].copy_from_slice(&size);
    stream.read_exact(&mut frame[4..]).await.ok()?;

    Packet::unpack(&frame).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Write(usize),
    Read(usize),
}

/// Stream wrapper that logs every successful read and write.
pub struct Recorder<S> {
    inner: S,
    events: Arc<Mutex<Vec<Event>>>,
}

impl<S> Recorder<S> {
    pub fn new(inner: S) -> (Self, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Recorder {
                inner,
                events: events.clone(),
            },
            events,
        )
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Recorder<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                self.events.lock().unwrap().push(Event::Read(read));
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Recorder<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = poll {
            self.events.lock().unwrap().push(Event::Write(written));
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Merges runs of the same event kind, summing their byte counts.
pub fn collapse(events: &[Event]) -> Vec<Event> {
    let mut merged: Vec<Event> = Vec::new();
    for event in events {
        match (merged.last_mut(), event) {
            (Some(Event::Write(total)), Event::Write(n)) => *total += n,
            (Some(Event::Read(total)), Event::Read(n)) => *total += n,
            _ => merged.push(*event),
        }
    }
    merged
}
