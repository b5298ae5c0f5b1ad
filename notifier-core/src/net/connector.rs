//! Protocol client adapter
//!
//! An [`XmppConnector`] runs one protocol client for an
//! [`Effect::OpenClient`](crate::login::Effect::OpenClient) and reports its
//! progress through a [`ClientReporter`]. The login service aborts the task
//! when the client is torn down.
//!
//! [`StreamConnector`] opens the transport (directly or through an HTTP
//! CONNECT tunnel), sends the stream header and waits for
//! `<stream:features/>`. TLS and SASL are left to the embedding client.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use async_http_proxy::HttpError;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::login::{ClientError, ClientEvent, ClientId, ConnectRequest, Input, TransportFault, XmppErrorCode};

/// Default time allowed for opening the transport
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const STREAM_ERROR: &[u8] = b"error";
const STREAM_FEATURES: &[u8] = b"features";

/// Sends the events of one client back to the login service
#[derive(Debug, Clone)]
pub struct ClientReporter {
    client: ClientId,
    inputs: mpsc::UnboundedSender<Input>,
}

impl ClientReporter {
    pub fn new(client: ClientId, inputs: mpsc::UnboundedSender<Input>) -> Self {
        Self { client, inputs }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn report(&self, event: ClientEvent) {
        // The service is gone; nobody is interested any more
        let _ = self.inputs.send(Input::Client {
            client: self.client,
            event,
        });
    }
}

/// Runs protocol clients
#[async_trait]
pub trait XmppConnector: Send + Sync {
    /// Run a client until it closes
    ///
    /// Must finish by reporting [`ClientEvent::Closed`].
    async fn run(&self, request: ConnectRequest, reporter: ClientReporter);
}

/// Plain TCP connector with optional HTTP CONNECT tunnelling
#[derive(Debug, Clone)]
pub struct StreamConnector {
    connect_timeout: Duration,
}

impl StreamConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Open the TCP transport for `request`
    #[tracing::instrument(skip(self, request), fields(candidate = %request.settings))]
    pub async fn open_transport(&self, request: &ConnectRequest) -> Result<TcpStream, ClientError> {
        let settings = &request.settings;

        match &request.proxy {
            Some(proxy) => {
                let mut stream = self
                    .connect_tcp((proxy.host.as_str(), proxy.port))
                    .await?;

                let target = connect_target(settings.address);
                let tunnel = match proxy.basic_auth() {
                    Some((username, password)) => {
                        timeout(
                            self.connect_timeout,
                            async_http_proxy::http_connect_tokio_with_basic_auth(
                                &mut stream,
                                &target,
                                settings.port,
                                username,
                                password,
                            ),
                        )
                        .await
                    }
                    None => {
                        timeout(
                            self.connect_timeout,
                            async_http_proxy::http_connect_tokio(&mut stream, &target, settings.port),
                        )
                        .await
                    }
                };

                match tunnel {
                    Err(_) => Err(ClientError::new(XmppErrorCode::NetworkTimeout, 0)),
                    Ok(Err(e)) => {
                        warn!(proxy = %proxy.url(), error = %e, "HTTP CONNECT tunnel failed");
                        match e {
                            HttpError::HttpCode200(407) => Err(ClientError::socket(0)
                                .with_fault(TransportFault::ProxyAuthenticationRequired)),
                            _ => Err(ClientError::new(XmppErrorCode::ConnectionClosed, 0)),
                        }
                    }
                    Ok(Ok(())) => Ok(stream),
                }
            }
            None => self.connect_tcp((settings.address, settings.port)).await,
        }
    }

    async fn connect_tcp<A>(&self, addr: A) -> Result<TcpStream, ClientError>
    where
        A: tokio::net::ToSocketAddrs,
    {
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Err(_) => Err(ClientError::new(XmppErrorCode::NetworkTimeout, 0)),
            Ok(Err(e)) => Err(io_error(&e)),
            Ok(Ok(stream)) => Ok(stream),
        }
    }

    /// Open the stream and follow it until it ends
    ///
    /// Returns why the stream ended.
    async fn drive(&self, stream: TcpStream, request: &ConnectRequest, reporter: &ClientReporter) -> ClientError {
        let (read_half, mut write_half) = stream.into_split();

        if let Err(e) = write_half.write_all(stream_header(request).as_bytes()).await {
            return io_error(&e);
        }

        let mut reader = Reader::from_reader(BufReader::new(read_half));
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = false;

        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut opened = false;
        // Raw `<stream:error>` being collected
        let mut capture: Option<Writer<Vec<u8>>> = None;

        loop {
            let event = match reader.read_event_into_async(&mut buf).await {
                Ok(event) => event,
                Err(quick_xml::Error::Io(e)) => return io_error(&e),
                Err(e) => {
                    warn!("Malformed stream: {}", e);
                    return ClientError::new(XmppErrorCode::Xml, 0);
                }
            };

            match &event {
                Event::Start(e) => {
                    depth += 1;
                    if depth == 2 && capture.is_none() {
                        match e.local_name().as_ref() {
                            STREAM_ERROR => capture = Some(Writer::new(Vec::new())),
                            STREAM_FEATURES if !opened => {
                                opened = true;
                                info!(client = %reporter.client(), "Stream open");
                                reporter.report(ClientEvent::Open);
                            }
                            _ => {}
                        }
                    }
                }
                Event::Empty(e) if depth == 1 && capture.is_none() => match e.local_name().as_ref() {
                    STREAM_ERROR => return ClientError::stream(raw_element(&event)),
                    STREAM_FEATURES if !opened => {
                        opened = true;
                        info!(client = %reporter.client(), "Stream open");
                        reporter.report(ClientEvent::Open);
                    }
                    _ => {}
                },
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        debug!(client = %reporter.client(), "Server closed the stream");
                        return ClientError::new(XmppErrorCode::ConnectionClosed, 0);
                    }
                }
                Event::Eof => {
                    return ClientError::new(XmppErrorCode::ConnectionClosed, 0);
                }
                _ => {}
            }

            if let Some(writer) = capture.as_mut() {
                if writer.write_event(event.borrow()).is_err() {
                    return ClientError::new(XmppErrorCode::Xml, 0);
                }
                if depth == 1 {
                    let raw = String::from_utf8_lossy(writer.get_ref()).to_string();
                    return ClientError::stream(raw);
                }
            }

            buf.clear();
        }
    }
}

impl Default for StreamConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl XmppConnector for StreamConnector {
    async fn run(&self, request: ConnectRequest, reporter: ClientReporter) {
        let error = match self.open_transport(&request).await {
            Ok(stream) => {
                reporter.report(ClientEvent::Opening);
                self.drive(stream, &request, &reporter).await
            }
            Err(error) => error,
        };

        debug!(client = %reporter.client(), error = %error, "Client finished");
        reporter.report(ClientEvent::Closed(error));
    }
}

/// Opening `<stream:stream>` tag for `request`
pub fn stream_header(request: &ConnectRequest) -> String {
    let to = request
        .credentials
        .domain()
        .unwrap_or(request.settings.host.as_str());

    format!(
        "<?xml version='1.0'?><stream:stream to='{}' xmlns='jabber:client' \
         xmlns:stream='http://etherx.jabber.org/streams' version='1.0' xml:lang='{}'>",
        to, request.lang
    )
}

/// Host part of a CONNECT request line
fn connect_target(address: IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

fn raw_element(event: &Event<'_>) -> String {
    let mut writer = Writer::new(Vec::new());
    if writer.write_event(event.borrow()).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(writer.get_ref()).to_string()
}

/// Socket error with the negated OS error number as subcode
fn io_error(error: &io::Error) -> ClientError {
    let subcode = error.raw_os_error().map_or(-1, |code| -code);
    debug!(%error, subcode, "Socket error");
    ClientError::socket(subcode)
}
