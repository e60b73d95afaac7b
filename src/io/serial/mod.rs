// src/io/serial/mod.rs
//
// Serial transport for the transmitter link.
//
// Features:
// - Newline-delimited framing (framer)
// - Transport manager owning the port and the link state (transport)
// - serialport conversions and port listing (utils)

pub mod framer;
pub mod transport;
pub(crate) mod utils;

pub use framer::{LineFrame, LineFramer};
pub use transport::{
    serial_transport_factory, LineTransport, SerialSettings, SerialTransport, TransportFactory,
    TransportManager,
};
pub use utils::{list_serial_ports, Parity, SerialPortInfo};
