use crate::{
    dns::{DNSPacket, MAX_TCP_MESSAGE_SIZE, enums::ResponseCode},
    error::{DnsError, Result},
    plugin::{Handler, ResponseWriter, Transport},
};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Largest datagram read from a client.
const UDP_RECV_BUFFER: usize = 4096;

/// Writes responses for one datagram back to its sender.
pub struct UdpWriter {
    sock: Arc<UdpSocket>,
    peer: SocketAddr,
    sent: usize,
}

impl UdpWriter {
    pub fn new(sock: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self {
            sock,
            peer,
            sent: 0,
        }
    }
}

#[async_trait]
impl ResponseWriter for UdpWriter {
    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    fn transport(&self) -> Transport {
        Transport::Udp
    }

    async fn write_msg(&mut self, msg: &DNSPacket) -> Result<()> {
        let data = msg.serialize()?;
        self.sock.send_to(&data, self.peer).await?;
        self.sent += 1;
        Ok(())
    }

    fn hijack(&mut self) {
        trace!("Ignoring hijack of UDP exchange with {}", self.peer);
    }
}

/// Writes length-prefixed responses on a TCP connection.
pub struct TcpWriter<'a> {
    stream: &'a mut TcpStream,
    peer: SocketAddr,
    sent: usize,
    hijacked: bool,
}

impl<'a> TcpWriter<'a> {
    pub fn new(stream: &'a mut TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            sent: 0,
            hijacked: false,
        }
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }
}

#[async_trait]
impl ResponseWriter for TcpWriter<'_> {
    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    async fn write_msg(&mut self, msg: &DNSPacket) -> Result<()> {
        let data = msg.serialize()?;
        if data.len() > MAX_TCP_MESSAGE_SIZE {
            return Err(DnsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("response of {} octets does not fit a TCP frame", data.len()),
            )));
        }

        let mut frame = BytesMut::with_capacity(2 + data.len());
        frame.put_u16(data.len() as u16);
        frame.put_slice(&data);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        self.sent += 1;
        Ok(())
    }

    fn hijack(&mut self) {
        self.hijacked = true;
    }
}

/// Writers that know whether anything went out yet.
trait SentCount: ResponseWriter {
    fn sent(&self) -> usize;
}

impl SentCount for UdpWriter {
    fn sent(&self) -> usize {
        self.sent
    }
}

impl SentCount for TcpWriter<'_> {
    fn sent(&self) -> usize {
        self.sent
    }
}

/// Parses `data` and runs it through `handler`. Failures that left the
/// client without an answer are turned into REFUSED or SERVFAIL.
async fn handle_query<W: SentCount>(handler: &dyn Handler, w: &mut W, data: &[u8]) {
    let packet = match DNSPacket::parse(data) {
        Ok(packet) => packet,
        Err(e) => {
            debug!("Malformed packet from {}: {}", w.remote_addr(), e);
            return;
        }
    };
    if packet.header.qr {
        debug!("Ignoring response packet from {}", w.remote_addr());
        return;
    }

    let rcode = match handler.serve_dns(w, &packet).await {
        Ok(rcode) => {
            trace!("Query id={} from {} answered {}", packet.header.id, w.remote_addr(), rcode);
            return;
        }
        Err(DnsError::NoNextHandler(from)) => {
            debug!("No handler after {} for query from {}", from, w.remote_addr());
            ResponseCode::Refused
        }
        Err(e) => {
            warn!("Failed to handle query from {}: {}", w.remote_addr(), e);
            ResponseCode::ServerFailure
        }
    };

    if w.sent() > 0 {
        return;
    }
    let mut response = DNSPacket::reply(&packet);
    response.header.rcode = rcode.to_u8();
    if let Err(e) = w.write_msg(&response).await {
        error!("Failed to send {} to {}: {}", rcode, w.remote_addr(), e);
    }
}

/// Run UDP server with graceful shutdown support
pub async fn run_udp_server(
    bind_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    shutdown_rx: broadcast::Receiver<()>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sock = Arc::new(UdpSocket::bind(bind_addr).await?);
    info!("UDP DNS server listening on {}", bind_addr);
    serve_udp(sock, handler, shutdown_rx).await
}

/// Serves queries on an already bound socket until shutdown.
pub async fn serve_udp(
    sock: Arc<UdpSocket>,
    handler: Arc<dyn Handler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = vec![0u8; UDP_RECV_BUFFER];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("UDP server received shutdown signal");
                break;
            }

            result = sock.recv_from(&mut buf) => {
                let (read_bytes, src_addr) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("UDP receive error: {}", e);
                        continue;
                    }
                };

                let query_data = buf[..read_bytes].to_vec();
                let handler = Arc::clone(&handler);
                let mut writer = UdpWriter::new(Arc::clone(&sock), src_addr);

                tokio::spawn(async move {
                    handle_query(handler.as_ref(), &mut writer, &query_data).await;
                });
            }
        }
    }

    Ok(())
}

/// Run TCP server with graceful shutdown support
pub async fn run_tcp_server(
    bind_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    idle_timeout: Duration,
    shutdown_rx: broadcast::Receiver<()>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("TCP DNS server listening on {}", bind_addr);
    serve_tcp(listener, handler, idle_timeout, shutdown_rx).await
}

/// Accepts connections on an already bound listener until shutdown.
pub async fn serve_tcp(
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    idle_timeout: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("TCP server received shutdown signal");
                break;
            }

            result = listener.accept() => {
                let (stream, src_addr) = result?;
                let handler = Arc::clone(&handler);

                tokio::spawn(async move {
                    if let Err(e) =
                        handle_tcp_connection(stream, src_addr, handler, idle_timeout).await
                    {
                        warn!("TCP connection error from {}: {}", src_addr, e);
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle_tcp_connection(
    mut stream: TcpStream,
    src_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    idle_timeout: Duration,
) -> Result<()> {
    let mut length_buf = [0u8; 2];

    loop {
        match tokio::time::timeout(idle_timeout, stream.read_exact(&mut length_buf)).await {
            Err(_) => {
                debug!("Closing idle TCP connection from {}", src_addr);
                break;
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("TCP connection closed by client {}", src_addr);
                break;
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(_)) => {}
        }

        let message_length = u16::from_be_bytes(length_buf) as usize;
        let mut message_buf = vec![0u8; message_length];
        match tokio::time::timeout(idle_timeout, stream.read_exact(&mut message_buf)).await {
            Err(_) => {
                debug!("TCP client {} stalled mid-message, closing", src_addr);
                break;
            }
            Ok(result) => {
                result?;
            }
        }

        let mut writer = TcpWriter::new(&mut stream, src_addr);
        handle_query(handler.as_ref(), &mut writer, &message_buf).await;

        if writer.is_hijacked() {
            debug!("TCP connection from {} hijacked, closing", src_addr);
            break;
        }
    }

    stream.shutdown().await.ok();
    Ok(())
}
