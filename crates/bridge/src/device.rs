//! Transporte do dispositivo serial.
//!
//! `tcp://host:porta` conecta numa ponte serial-TCP; qualquer outro endereço
//! é tratado como caminho de tty aberto em leitura/escrita. Parâmetros de
//! linha (baud, paridade) de um tty ficam a cargo do SO ou do `stty`.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Erros do transporte do dispositivo.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Endereço de dispositivo inválido: {0:?}")]
    InvalidAddress(String),

    #[error("Falha ao abrir {address}: {source}")]
    Open {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Erro de leitura: {0}")]
    Read(#[source] io::Error),

    #[error("Erro de escrita: {0}")]
    Write(#[source] io::Error),

    #[error("Dispositivo não está aberto")]
    NotOpen,
}

/// Contrato mínimo com o dispositivo: abrir, ler, escrever, fechar.
///
/// `read` retornando `Ok(0)` significa fim de stream (desconexão).
pub trait DeviceTransport: Send + 'static {
    fn open(&mut self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, DeviceError>> + Send;

    /// Envia um comando ao dispositivo.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Libera o handle. Chamar sem handle aberto não faz nada.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    fn describe(&self) -> String;
}

// ──────────────────────────────────────────────
// Endereço
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddress {
    Tcp(String),
    Tty(PathBuf),
}

impl DeviceAddress {
    pub fn parse(raw: &str) -> Result<Self, DeviceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DeviceError::InvalidAddress(raw.to_string()));
        }
        match raw.strip_prefix("tcp://") {
            Some(target) => match target.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(DeviceAddress::Tcp(target.to_string()))
                }
                _ => Err(DeviceError::InvalidAddress(raw.to_string())),
            },
            None => Ok(DeviceAddress::Tty(PathBuf::from(raw))),
        }
    }
}

// ──────────────────────────────────────────────
// Implementação serial / TCP
// ──────────────────────────────────────────────

enum Stream {
    Tcp(TcpStream),
    Tty(tokio::fs::File),
}

/// Dispositivo real: tty local ou ponte serial-TCP.
pub struct SerialDevice {
    address: String,
    baud_rate: u32,
    stream: Option<Stream>,
}

impl SerialDevice {
    pub fn new(address: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            address: address.into(),
            baud_rate,
            stream: None,
        }
    }
}

impl DeviceTransport for SerialDevice {
    async fn open(&mut self) -> Result<(), DeviceError> {
        self.stream = None;
        let open_err = |source| DeviceError::Open {
            address: self.address.clone(),
            source,
        };

        let stream = match DeviceAddress::parse(&self.address)? {
            DeviceAddress::Tcp(target) => {
                let stream = TcpStream::connect(&target).await.map_err(open_err)?;
                let _ = stream.set_nodelay(true);
                info!("Conectado à ponte serial-TCP {target}");
                Stream::Tcp(stream)
            }
            DeviceAddress::Tty(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)
                    .await
                    .map_err(open_err)?;
                info!(
                    "Porta serial {} aberta (baud {} configurado externamente)",
                    path.display(),
                    self.baud_rate
                );
                Stream::Tty(file)
            }
        };

        self.stream = Some(stream);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let n = match self.stream.as_mut() {
            Some(Stream::Tcp(s)) => s.read(buf).await,
            Some(Stream::Tty(f)) => f.read(buf).await,
            None => return Err(DeviceError::NotOpen),
        }
        .map_err(DeviceError::Read)?;
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let result = match self.stream.as_mut() {
            Some(Stream::Tcp(s)) => s.write_all(data).await,
            Some(Stream::Tty(f)) => match f.write_all(data).await {
                Ok(()) => f.flush().await,
                Err(e) => Err(e),
            },
            None => return Err(DeviceError::NotOpen),
        };
        result.map_err(DeviceError::Write)
    }

    async fn close(&mut self) {
        match self.stream.take() {
            Some(Stream::Tcp(mut s)) => {
                let _ = s.shutdown().await;
                debug!("Conexão TCP do dispositivo encerrada");
            }
            Some(Stream::Tty(_)) => debug!("Porta serial fechada"),
            None => {}
        }
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.address, self.baud_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn parses_tcp_and_tty_addresses() {
        assert_eq!(
            DeviceAddress::parse("tcp://127.0.0.1:4001").unwrap(),
            DeviceAddress::Tcp("127.0.0.1:4001".into())
        );
        assert_eq!(
            DeviceAddress::parse("/dev/ttyUSB0").unwrap(),
            DeviceAddress::Tty("/dev/ttyUSB0".into())
        );
        assert!(DeviceAddress::parse("").is_err());
        assert!(DeviceAddress::parse("tcp://host").is_err());
        assert!(DeviceAddress::parse("tcp://:80").is_err());
    }

    #[tokio::test]
    async fn tcp_bridge_reads_and_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"Furnace_Temp:1.00\n").await.unwrap();
            let mut echo = [0u8; 4];
            sock.read_exact(&mut echo).await.unwrap();
            echo
        });

        let mut device = SerialDevice::new(format!("tcp://{addr}"), 9600);
        device.open().await.unwrap();

        let mut buf = [0u8; 64];
        let mut received = Vec::new();
        while !received.ends_with(b"\n") {
            let n = device.read(&mut buf).await.unwrap();
            assert!(n > 0);
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"Furnace_Temp:1.00\n");

        device.write(b"ping").await.unwrap();
        assert_eq!(&peer.await.unwrap(), b"ping");

        // Peer encerrou: leitura retorna EOF
        assert_eq!(device.read(&mut buf).await.unwrap(), 0);

        device.close().await;
        assert!(matches!(device.read(&mut buf).await, Err(DeviceError::NotOpen)));
        assert!(matches!(device.write(b"x").await, Err(DeviceError::NotOpen)));
    }

    #[tokio::test]
    async fn open_failure_reports_address() {
        let mut device = SerialDevice::new("/nonexistent/tty-factory", 9600);
        let err = device.open().await.unwrap_err();
        assert!(matches!(err, DeviceError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/tty-factory"));
    }

    #[tokio::test]
    async fn invalid_address_fails_on_open() {
        let mut device = SerialDevice::new("tcp://nowhere", 9600);
        assert!(matches!(
            device.open().await,
            Err(DeviceError::InvalidAddress(_))
        ));
    }
}
