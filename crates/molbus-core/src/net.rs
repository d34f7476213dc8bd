use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use molbus_protocol::Address;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;

/// Binds a UDP socket for `address`, joining its multicast group on
/// `interface` if `address.host` is a multicast IPv4 address. Plain
/// unicast addresses are bound directly.
///
/// `address.interface`, when set, must be the dotted-quad address of the
/// local interface to join on (not an interface name); the protocol's
/// `inet:` address format leaves the exact meaning of the interface
/// component to the deployment, and this is the interpretation used here.
pub fn bind_event_socket(address: &Address) -> std::io::Result<UdpSocket> {
    let host: Ipv4Addr = address
        .host
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "address host must be an IPv4 address"))?;
    let port = address.port.unwrap_or(0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;

    if host.is_multicast() {
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket.bind(&bind_addr.into())?;
        let iface: Ipv4Addr = match &address.interface {
            Some(iface) => iface
                .parse()
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "interface must be an IPv4 address"))?,
            None => Ipv4Addr::UNSPECIFIED,
        };
        socket.join_multicast_v4(&host, &iface)?;
    } else {
        let bind_addr = SocketAddrV4::new(host, port);
        socket.bind(&bind_addr.into())?;
    }

    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Resolves `address` to a [`SocketAddr`] for use as a send destination.
pub fn resolve(address: &Address) -> std::io::Result<SocketAddr> {
    let port = address.port.unwrap_or(0);
    format!("{}:{port}", address.host)
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "unparseable address"))
}
