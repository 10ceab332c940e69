//! Line-based console for driving a peer without a renderer.
//!
//! ```text
//! keys <u|d|l|r...>      hold exactly these keys ("keys" alone releases all)
//! buy <n>                buy drones at the castle you stand in
//! spell <name>           buy a spell at the castle you stand in
//! cast <name> <x> <y>    cast a spell at a map position
//! deposit <n>            leave drones in the castle
//! withdraw <n>           take drones out of the castle
//! pause | resume         host only
//! quit
//! ```

use crate::error::ConsoleError;
use crate::runtime::Command;
use shared::{ControlState, GarrisonDirection, SpellId, Vector2};

pub const HELP: &str = "commands: keys <udlr>, buy <n>, spell <name>, cast <name> <x> <y>, \
deposit <n>, withdraw <n>, pause, resume, quit";

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Command>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "keys" => Command::Controls(parse_keys(args.first().copied().unwrap_or(""))?),
        "buy" => Command::BuyUnits {
            n: parse_count("buy", &args)?,
        },
        "spell" => {
            let [name] = args.as_slice() else {
                return Err(ConsoleError::BadArguments {
                    command: "spell",
                    expected: "a spell name",
                });
            };
            Command::BuySpell {
                spell: parse_spell(name)?,
            }
        }
        "cast" => {
            let bad = || ConsoleError::BadArguments {
                command: "cast",
                expected: "a spell name and x y coordinates",
            };
            let [name, x, y] = args.as_slice() else {
                return Err(bad());
            };
            let x: f32 = x.parse().map_err(|_| bad())?;
            let y: f32 = y.parse().map_err(|_| bad())?;
            Command::CastSpell {
                position: Vector2::new(x, y),
                spell: parse_spell(name)?,
                reply: None,
            }
        }
        "deposit" => Command::Garrison {
            n: parse_count("deposit", &args)?,
            direction: GarrisonDirection::Deposit,
        },
        "withdraw" => Command::Garrison {
            n: parse_count("withdraw", &args)?,
            direction: GarrisonDirection::Withdraw,
        },
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "quit" | "exit" => Command::Shutdown,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_keys(keys: &str) -> Result<ControlState, ConsoleError> {
    let mut state = ControlState::default();
    for key in keys.chars() {
        match key.to_ascii_lowercase() {
            'u' | 'w' => state.up = true,
            'd' | 's' => state.down = true,
            'l' | 'a' => state.left = true,
            'r' => state.right = true,
            _ => {
                return Err(ConsoleError::BadArguments {
                    command: "keys",
                    expected: "letters from u, d, l, r",
                })
            }
        }
    }
    Ok(state)
}

fn parse_count(command: &'static str, args: &[&str]) -> Result<u32, ConsoleError> {
    let bad = ConsoleError::BadArguments {
        command,
        expected: "a positive count",
    };
    match args {
        [n] => n.parse().ok().filter(|n| *n > 0).ok_or(bad),
        _ => Err(bad),
    }
}

fn parse_spell(name: &str) -> Result<SpellId, ConsoleError> {
    match name.to_ascii_lowercase().as_str() {
        "explosion" => Ok(SpellId::Explosion),
        "speedup" | "speed-up" => Ok(SpellId::SpeedUp),
        "speeddown" | "speed-down" => Ok(SpellId::SpeedDown),
        "teleport" => Ok(SpellId::Teleport),
        _ => Err(ConsoleError::UnknownSpell(name.to_string())),
    }
}
