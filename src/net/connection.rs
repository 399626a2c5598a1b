use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{Duration, Instant},
};
use tracing::debug;

use super::{Host, NetError, Result};
use crate::{
    commands::{
        admin_command,
        buffer::{ProtoHeader, MAX_BUFFER_SIZE},
    },
    policies::ClientPolicy,
    ResultCode,
};

/// A single TCP connection to a server node, exchanging whole message frames.
#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    active: bool,
    // duration after which the connection is considered idle
    idle_timeout: Option<Duration>,
    idle_deadline: Option<Instant>,
}

impl Connection {
    /// Open a connection and authenticate it, if the policy carries credentials. Both steps
    /// together are bounded by the policy's connect timeout.
    pub(crate) async fn connect(host: &Host, policy: &ClientPolicy) -> Result<Self> {
        let connect = async {
            let stream = TcpStream::connect(host.address()).await?;
            stream.set_nodelay(true)?;

            let mut conn = Self {
                stream,
                active: true,
                idle_timeout: policy.idle_timeout,
                idle_deadline: None,
            };
            if let Some((user, password)) = &policy.user_password {
                conn.authenticate(user, password).await?;
            }
            conn.refresh();
            Ok(conn)
        };

        match tokio::time::timeout(policy.timeout, connect).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(NetError::Authenticate(code))) => Err(NetError::Authenticate(code)),
            Ok(Err(err)) => {
                debug!(%host, %err, "failed opening connection");
                Err(NetError::FailedOpening(host.clone()))
            }
            Err(_) => Err(NetError::FailedOpening(host.clone())),
        }
    }

    /// Whether the connection can still be used. Connections that saw an error or stayed idle
    /// past their deadline are not.
    pub(crate) fn is_usable(&self) -> bool {
        self.active
            && self
                .idle_deadline
                .map_or(true, |deadline| Instant::now() < deadline)
    }

    pub(crate) async fn close(&mut self) {
        self.active = false;
        self.stream.shutdown().await.ok();
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.refresh();
        Ok(())
    }

    /// Read the next frame, returning the protocol header together with its body.
    pub(crate) async fn read_frame(&mut self) -> Result<Bytes> {
        let mut header = [0; ProtoHeader::SIZE];
        self.stream.read_exact(&mut header).await?;

        let proto = ProtoHeader::read_from(&mut &header[..])?;
        debug_assert!(proto.size <= MAX_BUFFER_SIZE);

        let mut frame = BytesMut::zeroed(ProtoHeader::SIZE + proto.size);
        frame[..ProtoHeader::SIZE].copy_from_slice(&header);
        self.stream
            .read_exact(&mut frame[ProtoHeader::SIZE..])
            .await?;

        self.refresh();
        Ok(frame.freeze())
    }

    async fn authenticate(&mut self, user: &str, password: &str) -> Result<()> {
        self.write_all(&admin_command::login_request(user, password))
            .await?;
        let frame = self.read_frame().await?;

        match admin_command::result_code(frame)? {
            ResultCode::Ok | ResultCode::SecurityNotEnabled => Ok(()),
            code => {
                self.close().await;
                Err(NetError::Authenticate(code))
            }
        }
    }

    fn refresh(&mut self) {
        self.idle_deadline = self.idle_timeout.map(|timeout| Instant::now() + timeout);
    }
}
