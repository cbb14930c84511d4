//! Effect server v1 message format parser.

use byteorder::ReadBytesExt;
use std::io::{self, Read};
use thiserror::Error;

use crate::protocol::{CMD_SET_LIGHT, LIGHT_TYPE_RGB, PROTOCOL_VERSION};

/// Command code for the tag ("nick") command.
const CMD_NICK: u8 = 0;

/// Abstract commands found in a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set nick for the next commands.
    Nick { nick: String },
    /// Set an RGB light's state.
    RgbLight { id: u8, red: u8, green: u8, blue: u8 },
}

/// A fully decoded packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    /// Last tag seen in the packet, if any.
    pub tag: Option<String>,
    /// Light commands in packet order as `(id, [r, g, b])`.
    pub lights: Vec<(u8, [u8; 3])>,
}

pub type ParserResult<T> = Result<T, ParserError>;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid protocol version {0}")]
    InvalidProtocolVersion(u8),
    #[error("unsupported light type {0}")]
    UnsupportedLightType(u8),
    #[error("unknown command {0}")]
    UnknownCommand(u8),
    #[error("truncated packet: {0}")]
    IoError(#[from] io::Error),
}

/// Command buffer and message parser.
#[derive(Default)]
pub struct CommandParser {
    /// Commands parsed so far.
    pub cmds: Vec<Command>,
}

impl CommandParser {
    pub fn new() -> CommandParser {
        CommandParser { cmds: vec![] }
    }

    pub fn read_from(&mut self, buf: &mut dyn Read) -> ParserResult<()> {
        // Clear temp command buffer.
        self.cmds.clear();
        self.read_header(buf)?;
        while self.read_cmd(buf)? {}
        Ok(())
    }

    fn read_header(&mut self, buf: &mut dyn Read) -> ParserResult<()> {
        match buf.read_u8()? {
            ver if ver == PROTOCOL_VERSION.0 => Ok(()),
            ver => Err(ParserError::InvalidProtocolVersion(ver)),
        }
    }

    /// Read the next command, if there is any data left. Returns Ok(false) on end-of-data.
    fn read_cmd(&mut self, buf: &mut dyn Read) -> ParserResult<bool> {
        let cmd = match buf.read_u8() {
            Ok(cmd) => cmd,
            // Running out of data right before a command is ok.
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        match cmd {
            CMD_NICK => self.read_cmd_nick(buf)?,
            CMD_SET_LIGHT => self.read_cmd_light(buf)?,
            other => return Err(ParserError::UnknownCommand(other)),
        }
        Ok(true)
    }

    /// Tag bytes up to the NUL terminator, decoded lossily.
    fn read_cmd_nick(&mut self, buf: &mut dyn Read) -> ParserResult<()> {
        let mut raw = Vec::new();
        while let byte @ 1..=255 = buf.read_u8()? {
            raw.push(byte);
        }
        self.cmds.push(Command::Nick {
            nick: String::from_utf8_lossy(&raw).into_owned(),
        });
        Ok(())
    }

    /// `id, light type, r, g, b`; only RGB lights are understood.
    fn read_cmd_light(&mut self, buf: &mut dyn Read) -> ParserResult<()> {
        let mut fields = [0; 5];
        buf.read_exact(&mut fields)?;
        let [id, light_type, red, green, blue] = fields;
        if light_type != LIGHT_TYPE_RGB {
            return Err(ParserError::UnsupportedLightType(light_type));
        }
        self.cmds.push(Command::RgbLight { id, red, green, blue });
        Ok(())
    }

    /// Collapse the parsed commands into a `Packet`.
    pub fn packet(&self) -> Packet {
        let mut packet = Packet::default();
        for cmd in &self.cmds {
            match cmd {
                Command::Nick { nick } => packet.tag = Some(nick.clone()),
                Command::RgbLight { id, red, green, blue } => {
                    packet.lights.push((*id, [*red, *green, *blue]))
                }
            }
        }
        packet
    }
}

/// Decode a whole datagram.
pub fn decode_packet(mut data: &[u8]) -> ParserResult<Packet> {
    let mut parser = CommandParser::new();
    parser.read_from(&mut data)?;
    Ok(parser.packet())
}
