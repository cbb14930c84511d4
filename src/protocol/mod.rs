//! Effect server v1 message format encoder.

use byteorder::WriteBytesExt;

/// Protocol version written at the start of every packet.
pub const PROTOCOL_VERSION: (u8, u8) = (1, 0);

/// Command code for setting a light.
pub const CMD_SET_LIGHT: u8 = 1;

/// Light type byte for plain RGB lights.
pub const LIGHT_TYPE_RGB: u8 = 0;

/// Bytes taken by one light command.
pub const LIGHT_CMD_LEN: usize = 6;

/// 8-bit red, green and blue channels.
pub type Rgb = [u8; 3];

/// Raw parameters for a single light command.
///
/// Anything outside 0..=255 gets clamped when the packet is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightCommand {
    /// The light's logical address.
    pub index: i64,
    pub red: i64,
    pub green: i64,
    pub blue: i64,
}

impl LightCommand {
    pub fn new(index: i64, red: i64, green: i64, blue: i64) -> LightCommand {
        LightCommand { index, red, green, blue }
    }

    /// Command for light `index` showing `rgb`.
    pub fn from_rgb(index: usize, rgb: Rgb) -> LightCommand {
        LightCommand::new(
            index as i64,
            i64::from(rgb[0]),
            i64::from(rgb[1]),
            i64::from(rgb[2]),
        )
    }
}

/// Clamp any integer into a byte.
pub fn clamp_byte(value: i64) -> u8 {
    value.max(0).min(255) as u8
}

/// Apply an intensity (0..255) to a base color.
pub fn scale(rgb: Rgb, intensity: i64) -> Rgb {
    let factor = f64::from(clamp_byte(intensity)) / 255.0;
    let channel = |c: u8| clamp_byte((f64::from(c) * factor).round() as i64);
    [channel(rgb[0]), channel(rgb[1]), channel(rgb[2])]
}

fn ascii_tag(tag: &str) -> impl Iterator<Item = u8> + '_ {
    tag.chars().filter(char::is_ascii).map(|c| c as u8)
}

/// Exact size of an encoded packet.
pub fn packet_len(tag: &str, command_count: usize) -> usize {
    2 + ascii_tag(tag).count() + 1 + command_count * LIGHT_CMD_LEN
}

/// Build a packet for the effect server.
///
/// Non-ASCII characters in the tag are dropped. Commands are written in
/// the order given.
pub fn encode_packet(tag: &str, commands: &[LightCommand]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(packet_len(tag, commands.len()));
    write_packet(&mut buf, tag, commands);
    buf
}

fn write_packet(buf: &mut Vec<u8>, tag: &str, commands: &[LightCommand]) {
    // Writing into a Vec can't fail, so the io::Results are dropped below.
    buf.write_u8(PROTOCOL_VERSION.0).ok();
    buf.write_u8(PROTOCOL_VERSION.1).ok();
    buf.extend(ascii_tag(tag));
    // terminate the tag with a null
    buf.write_u8(0).ok();

    for cmd in commands {
        buf.write_u8(CMD_SET_LIGHT).ok();
        buf.write_u8(clamp_byte(cmd.index)).ok();
        buf.write_u8(LIGHT_TYPE_RGB).ok();
        buf.write_u8(clamp_byte(cmd.red)).ok();
        buf.write_u8(clamp_byte(cmd.green)).ok();
        buf.write_u8(clamp_byte(cmd.blue)).ok();
    }
}
