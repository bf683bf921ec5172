use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use crate::bot::data::Data;
use crate::bot::error::Error;
use crate::commands::parser::{self, Command, HELP_TEXT};
use crate::commands::{ban, info, room, sync};
use crate::db::models::Expiry;
use crate::utils::jid::bare_jid;

/// Handle one chat line from `room`/`nick`, returning the reply to post.
///
/// Outside the control room only `!help` is answered. Mutating commands
/// require the sender to be an owner or admin of the control room as of
/// the last admin refresh; anything else is rejected with a reply.
pub async fn dispatch(
    data: &Data,
    room: &str,
    nick: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Option<String> {
    let command = match parser::parse(body)? {
        Ok(command) => command,
        Err(e) => {
            return in_control_room(data, room).then(|| format!("❌ {}", e));
        }
    };

    if command == Command::Help {
        return Some(HELP_TEXT.to_string());
    }
    if !in_control_room(data, room) {
        return None;
    }

    let sender = data.identities.occupant(room, nick).and_then(|o| o.jid);
    if command.is_mutating() {
        let Some(sender) = sender.as_deref().filter(|jid| data.admins.is_admin(jid)) else {
            info!("Rejected {:?} from {} ({:?}): not an admin", command, nick, sender);
            return Some(reply(Err(denial(data))));
        };
        return Some(reply(run_mutating(data, sender, command, now).await));
    }

    Some(reply(run_read_only(data, room, nick, command, now).await))
}

fn denial(data: &Data) -> Error {
    if data.admins.is_empty() {
        Error::PermissionDenied("the admin list is not loaded, run !syncadmins.".to_string())
    } else {
        Error::PermissionDenied("you are not an admin of the control room.".to_string())
    }
}

fn in_control_room(data: &Data, room: &str) -> bool {
    bare_jid(room) == bare_jid(&data.control_room())
}

fn reply(result: Result<String, Error>) -> String {
    match result {
        Ok(text) => text,
        Err(
            e @ (Error::InvalidCommand(_) | Error::UnresolvedIdentity(_) | Error::PermissionDenied(_)),
        ) => format!("❌ {}", e),
        Err(e) => {
            error!("Command failed: {}", e);
            format!("❌ Failed: {}", e)
        }
    }
}

async fn run_mutating(
    data: &Data,
    issuer: &str,
    command: Command,
    now: DateTime<Utc>,
) -> Result<String, Error> {
    match command {
        Command::Ban { subject, reason } => {
            ban::ban(data, issuer, &subject, Expiry::Permanent, reason.as_deref(), now).await
        }
        Command::TempBan {
            subject,
            duration,
            reason,
        } => {
            let length = Duration::from_std(duration)
                .map_err(|_| Error::invalid("duration is too long"))?;
            let until = now
                .checked_add_signed(length)
                .ok_or_else(|| Error::invalid("duration is too long"))?;
            ban::ban(data, issuer, &subject, Expiry::At(until), reason.as_deref(), now).await
        }
        Command::Unban { subject } => ban::unban(data, issuer, &subject, now).await,
        Command::RoomAdd { room: address } => room::add(data, &address, now).await,
        Command::RoomRemove { room: address } => room::remove(data, &address).await,
        Command::Sync => sync::sync(data, now).await,
        Command::SyncBans => sync::sync_bans(data, now).await,
        other => Err(Error::custom(format!("{:?} is not a mutating command", other))),
    }
}

async fn run_read_only(
    data: &Data,
    room: &str,
    nick: &str,
    command: Command,
    now: DateTime<Utc>,
) -> Result<String, Error> {
    match command {
        Command::BanList => info::ban_list(data, now).await,
        Command::BanSearch { query } => info::ban_search(data, &query, now).await,
        Command::Why { subject } => info::why(data, &subject, now).await,
        Command::RoomList => room::list(data).await,
        Command::SyncAdmins => sync::sync_admins(data).await,
        Command::Status => info::status(data, now).await,
        Command::WhoAmI => Ok(info::who_am_i(data, room, nick)),
        Command::Help => Ok(HELP_TEXT.to_string()),
        other => Err(Error::custom(format!("{:?} needs authorization", other))),
    }
}
