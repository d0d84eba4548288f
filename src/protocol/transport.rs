use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::wire::WireMessage;

/// Upper bound on a framed message, prefix excluded. Generous enough for a
/// full-resolution image plus its float depth map.
const MAX_MESSAGE_BYTES: u32 = 64 * 1024 * 1024;

/// Writes one message with a big-endian u32 length prefix.
pub fn send_message<W: Write>(stream: &mut W, message: &WireMessage) -> io::Result<()> {
    let bytes = message.encode();
    stream.write_u32::<BigEndian>(bytes.len() as u32)?;
    stream.write_all(&bytes)?;
    stream.flush()
}

/// Reads one framed message. A clean peer disconnect before the length
/// prefix returns `Ok(None)`; a disconnect inside a frame is an error.
pub fn recv_message<R: Read>(stream: &mut R) -> io::Result<Option<WireMessage>> {
    let len = match stream.read_u32::<BigEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_MESSAGE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_MESSAGE_BYTES} byte limit"),
        ));
    }
    let mut buf = vec![0; len as usize];
    stream.read_exact(&mut buf)?;
    Ok(Some(WireMessage::decode(&buf)))
}

/// Blocking request-reply client with one request in flight at a time.
pub struct WireClient {
    stream: TcpStream,
}

impl WireClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<WireClient> {
        Ok(WireClient {
            stream: TcpStream::connect(addr)?,
        })
    }

    pub fn request(&mut self, message: &WireMessage) -> io::Result<WireMessage> {
        send_message(&mut self.stream, message)?;
        match recv_message(&mut self.stream)? {
            Some(reply) => Ok(reply),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection before replying",
            )),
        }
    }
}
