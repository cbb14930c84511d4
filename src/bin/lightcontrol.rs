//! Line-oriented light controller console.
//!
//! ```text
//! color <light> <r> <g> <b>      color <light> #rrggbb
//! intensity <light> <0..255>
//! settings <ip> <port> <tag> <lights>   ("-" leaves a text field empty)
//! send | show | quit
//! ```

use anyhow::Context;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::info;

use effectcontrol_rs::client::UdpClient;
use effectcontrol_rs::config::{self, Root};
use effectcontrol_rs::controller::{self, ControlError, ControllerHandle};
use effectcontrol_rs::model::{self, LightState, SettingsUpdate};
use effectcontrol_rs::protocol::Rgb;

#[derive(Debug, PartialEq)]
enum Command {
    Color(usize, Rgb),
    Intensity(usize, i64),
    Settings(SettingsUpdate),
    Send,
    Show,
    Quit,
}

fn parse_light(word: Option<&str>) -> Result<usize, String> {
    let word = word.ok_or("missing light number")?;
    word.parse()
        .map_err(|_| format!("bad light number {:?}", word))
}

fn parse_channel(word: &str) -> Result<u8, String> {
    word.parse()
        .map_err(|_| format!("bad color channel {:?}", word))
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let cmd = match words.next() {
        Some(cmd) => cmd,
        None => return Ok(None),
    };

    let command = match cmd {
        "color" => {
            let light = parse_light(words.next())?;
            let args: Vec<&str> = words.collect();
            let rgb = match args.as_slice() {
                [hex] => model::parse_hex_rgb(hex).ok_or_else(|| format!("bad color {:?}", hex))?,
                [r, g, b] => [parse_channel(*r)?, parse_channel(*g)?, parse_channel(*b)?],
                _ => return Err("usage: color <light> <r> <g> <b> | #rrggbb".to_string()),
            };
            Command::Color(light, rgb)
        }
        "intensity" => {
            let light = parse_light(words.next())?;
            let value = words.next().ok_or("missing intensity")?;
            // Slider positions may come in as floats; the fraction is dropped.
            let value: f64 = value
                .parse()
                .map_err(|_| format!("bad intensity {:?}", value))?;
            Command::Intensity(light, value as i64)
        }
        "settings" => {
            let args: Vec<&str> = words.collect();
            let field = |s: &str| if s == "-" { String::new() } else { s.to_string() };
            match args.as_slice() {
                [ip, port, tag, lights] => Command::Settings(
                    SettingsUpdate::parse(&field(*ip), *port, &field(*tag), *lights)
                        .map_err(|err| err.to_string())?,
                ),
                _ => return Err("usage: settings <ip> <port> <tag> <lights>".to_string()),
            }
        }
        "send" => Command::Send,
        "show" => Command::Show,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {:?}", other)),
    };
    Ok(Some(command))
}

async fn show(handle: &ControllerHandle) -> anyhow::Result<()> {
    let snapshot = handle.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot.settings)?);
    for light in &snapshot.lights {
        println!("  light {:<2} {} {:3}", light.index, light.hex(), light.intensity);
    }
    Ok(())
}

/// Returns false when the console should exit.
async fn execute(handle: &ControllerHandle, command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Color(light, rgb) => handle.set_light_color(light, rgb)?,
        Command::Intensity(light, value) => handle.set_light_intensity(light, value)?,
        Command::Settings(update) => match handle.update_settings(update).await {
            // Rejections show up on the status line.
            Ok(()) | Err(ControlError::Validation(_)) => {}
            Err(err) => return Err(err.into()),
        },
        Command::Send => handle.send_now()?,
        Command::Show => show(handle).await?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    effectcontrol_rs::init_logging();

    let root = match std::env::args().nth(1) {
        Some(path) => config::read_config(&path).with_context(|| format!("reading {}", path))?,
        None => Root::default(),
    };
    let state = LightState::new(root.settings()?);
    let client = UdpClient::new().context("unable to create UDP socket")?;
    let (handle, task) = controller::spawn(state, client, root.debounce_window());

    let mut status = handle.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            println!("{}", *status.borrow());
        }
    });

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(command)) => {
                if !execute(&handle, command).await? {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => eprintln!("{}", err),
        }
    }

    handle.shutdown().ok();
    let state = task.await?;
    info!("exiting with {} lights", state.lights().len());
    Ok(())
}
