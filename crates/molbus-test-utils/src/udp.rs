use tokio::net::UdpSocket;

/// Binds two loopback UDP sockets and connects `a` to `b`'s address, so `a`
/// can `send`/`recv` directly without specifying a destination each time.
pub async fn loopback_pair() -> (UdpSocket, UdpSocket) {
    let a = UdpSocket::bind("127.0.0.1:0").await.expect("bind loopback socket");
    let b = UdpSocket::bind("127.0.0.1:0").await.expect("bind loopback socket");
    a.connect(b.local_addr().expect("local_addr")).await.expect("connect loopback pair");
    (a, b)
}

/// Binds a fresh, unconnected loopback UDP socket (for discovery/rewind
/// sockets that must `recv_from`/`send_to` multiple peers).
pub async fn bind_loopback() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind loopback socket")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_pair_can_exchange_datagrams() {
        let (a, b) = loopback_pair().await;
        a.send(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }
}
