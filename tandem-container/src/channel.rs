//! Uni-directional pipes between the caller and its setup processes
//!
//! Each process listens on its own receiver; the other side holds the sender.
//! Both ends are close-on-exec, so once the init process execs, the caller
//! sees end-of-file on its receiver. That EOF is how a successful exec is
//! reported.

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use tandem_core::{Error, Result};

use crate::message::{Message, MESSAGE_LEN};

/// Create a close-on-exec channel
pub fn channel() -> Result<(Sender, Receiver)> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;

    Ok((
        Sender {
            file: Some(File::from(write)),
        },
        Receiver {
            file: Some(File::from(read)),
        },
    ))
}

/// Write end of a channel
#[derive(Debug)]
pub struct Sender {
    file: Option<File>,
}

impl Sender {
    /// Send one message
    pub fn send(&mut self, msg: Message) -> Result<()> {
        let file = self.file.as_mut().ok_or(Error::ChannelSend)?;
        file.write_all(&msg.encode()?)?;
        Ok(())
    }

    /// Close this end; the copy left behind by a fork stays open
    pub fn close(&mut self) {
        self.file = None;
    }
}

/// Read end of a channel
#[derive(Debug)]
pub struct Receiver {
    file: Option<File>,
}

impl Receiver {
    /// Receive one message, `None` once every sender has been closed
    pub fn recv(&mut self) -> Result<Option<Message>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let mut buf = [0; MESSAGE_LEN];
        let mut filled = 0;
        while filled < MESSAGE_LEN {
            match file.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(Error::namespace(format!(
                        "Setup pipe closed after {filled} of {MESSAGE_LEN} bytes"
                    )));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Message::decode(&buf).map(Some)
    }

    /// Close this end
    pub fn close(&mut self) {
        self.file = None;
    }
}
