//! 监听端口绑定：端口被占用时依次尝试后续端口，次数有上限。

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("no free port in {first}..={last}")]
    Exhausted { first: u16, last: u16 },
    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// 从 `port` 开始最多尝试 `max_attempts` 个连续端口。
///
/// 只有 `AddrInUse` 会触发重试，其他错误立即返回。
pub fn bind_with_retry(
    host: IpAddr,
    port: u16,
    max_attempts: u16,
) -> Result<TcpListener, BindError> {
    let mut last = port;
    for offset in 0..max_attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        last = candidate;
        let addr = SocketAddr::new(host, candidate);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                listener
                    .set_nonblocking(true)
                    .map_err(|source| BindError::Io { addr, source })?;
                return Ok(listener);
            }
            Err(err) if err.kind() == ErrorKind::AddrInUse => {
                warn!("Port {candidate} is already in use. Trying another port...");
            }
            Err(source) => return Err(BindError::Io { addr, source }),
        }
    }
    Err(BindError::Exhausted { first: port, last })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn binds_requested_port_when_free() {
        let probe = TcpListener::bind((LOCALHOST, 0)).expect("probe");
        let port = probe.local_addr().expect("addr").port();
        drop(probe);

        let listener = bind_with_retry(LOCALHOST, port, 1).expect("bind");
        assert_eq!(listener.local_addr().expect("addr").port(), port);
    }

    #[test]
    fn moves_past_a_taken_port() {
        let taken = TcpListener::bind((LOCALHOST, 0)).expect("occupy");
        let port = taken.local_addr().expect("addr").port();
        if port == u16::MAX {
            return;
        }

        let listener = bind_with_retry(LOCALHOST, port, 20).expect("bind");
        assert!(listener.local_addr().expect("addr").port() > port);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let taken = TcpListener::bind((LOCALHOST, 0)).expect("occupy");
        let port = taken.local_addr().expect("addr").port();

        let result = bind_with_retry(LOCALHOST, port, 1);
        assert!(matches!(
            result,
            Err(BindError::Exhausted { first, last }) if first == port && last == port
        ));
    }
}
