use std::time::Duration;

use crate::bot::error::Error;
use crate::constants::timeouts::parse_duration;

pub const HELP_TEXT: &str = "!help\n\
!ban <jid|nick> [reason]\n\
!tempban <jid|nick> <10m|2h|1d|1w> [reason]\n\
!unban <jid|nick>\n\
!banlist\n\
!bansearch <text>\n\
!why <jid|nick>\n\
!room add|remove <room> / !room list\n\
!sync\n\
!syncadmins\n\
!syncbans\n\
!status\n\
!whoami";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Ban {
        subject: String,
        reason: Option<String>,
    },
    TempBan {
        subject: String,
        duration: Duration,
        reason: Option<String>,
    },
    Unban {
        subject: String,
    },
    BanList,
    BanSearch {
        query: String,
    },
    Why {
        subject: String,
    },
    RoomAdd {
        room: String,
    },
    RoomRemove {
        room: String,
    },
    RoomList,
    Sync,
    SyncAdmins,
    SyncBans,
    Status,
    WhoAmI,
}

impl Command {
    /// Commands that change bans, rooms, or room affiliations
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Ban { .. }
                | Command::TempBan { .. }
                | Command::Unban { .. }
                | Command::RoomAdd { .. }
                | Command::RoomRemove { .. }
                | Command::Sync
                | Command::SyncBans
        )
    }
}

/// Parse a chat line. `None` when the line is not a known command.
pub fn parse(body: &str) -> Option<Result<Command, Error>> {
    let body = body.trim();
    if !body.starts_with('!') {
        return None;
    }
    let mut parts = body.split_whitespace();
    let name = parts.next()?;
    let args: Vec<&str> = parts.collect();

    let command = match name {
        "!help" => Ok(Command::Help),
        "!ban" => match args.as_slice() {
            [subject, rest @ ..] => Ok(Command::Ban {
                subject: subject.to_string(),
                reason: join_reason(rest),
            }),
            [] => Err(usage("!ban <jid|nick> [reason]")),
        },
        "!tempban" => match args.as_slice() {
            [subject, duration, rest @ ..] => match parse_duration(duration) {
                Some(duration) => Ok(Command::TempBan {
                    subject: subject.to_string(),
                    duration,
                    reason: join_reason(rest),
                }),
                None => Err(Error::invalid(format!(
                    "bad duration '{}', use a number followed by m, h, d or w",
                    duration
                ))),
            },
            _ => Err(usage("!tempban <jid|nick> <10m|2h|1d|1w> [reason]")),
        },
        "!unban" => match args.as_slice() {
            [subject] => Ok(Command::Unban {
                subject: subject.to_string(),
            }),
            _ => Err(usage("!unban <jid|nick>")),
        },
        "!banlist" => Ok(Command::BanList),
        "!bansearch" => {
            if args.is_empty() {
                Err(usage("!bansearch <text>"))
            } else {
                Ok(Command::BanSearch {
                    query: args.join(" "),
                })
            }
        }
        "!why" => match args.as_slice() {
            [subject] => Ok(Command::Why {
                subject: subject.to_string(),
            }),
            _ => Err(usage("!why <jid|nick>")),
        },
        "!room" => match args.as_slice() {
            ["add", room] => Ok(Command::RoomAdd {
                room: room.to_string(),
            }),
            ["remove", room] => Ok(Command::RoomRemove {
                room: room.to_string(),
            }),
            ["list"] => Ok(Command::RoomList),
            _ => Err(usage("!room add|remove <room> / !room list")),
        },
        "!sync" => Ok(Command::Sync),
        "!syncadmins" => Ok(Command::SyncAdmins),
        "!syncbans" => Ok(Command::SyncBans),
        "!status" => Ok(Command::Status),
        "!whoami" => Ok(Command::WhoAmI),
        _ => return None,
    };

    Some(command)
}

fn join_reason(rest: &[&str]) -> Option<String> {
    if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    }
}

fn usage(text: &str) -> Error {
    Error::invalid(format!("usage: {}", text))
}
