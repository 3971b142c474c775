//! REPL utilities for the `warden` tool.
//!
//! A line is parsed into a [`Command`] and then run against an
//! [`AdminClient`] with [`run`].
//!
//! # Example
//! ```rust
//! use warden::cli::Command;
//!
//! let cmd: Command = "drop-user bob".try_into().unwrap();
//! assert_eq!(cmd, Command::DropUser { user: "bob".into() });
//! ```
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::{AdminClient, AdminError, cluster::Cluster, session::PasswordHasher};

/// List of possible errors from reading a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,

    #[error("failed to read command: {0}")]
    Input(#[from] io::Error),
}

/// Admin commands a user can type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `.exit`
    Exit,
    CreateUser {
        user: String,
        password: String,
        roles: Vec<String>,
    },
    DropUser {
        user: String,
    },
    /// Targets the session user when `user` is `None`.
    SetPassword {
        password: String,
        user: Option<String>,
    },
    ChangePassword {
        password: String,
        user: Option<String>,
    },
    GrantRoles {
        user: String,
        roles: Vec<String>,
    },
    RevokeRoles {
        user: String,
        roles: Vec<String>,
    },
    ReplaceRoles {
        user: String,
        roles: Vec<String>,
    },
    CreateRole {
        role: String,
        privileges: Vec<u8>,
    },
    QueryUser {
        user: Option<String>,
    },
    QueryUsers,
}

fn arguments<'a>(
    command: &str,
    parts: &[&'a str],
    required: usize,
    usage: &str,
) -> Result<Vec<&'a str>, CommandError> {
    if parts.len() < required {
        return Err(CommandError::InvalidCommandArguments {
            command: command.to_string(),
            reason: format!("usage: {command} {usage}"),
        });
    }
    Ok(parts.to_vec())
}

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err(CommandError::Empty);
        };
        let parts: Vec<&str> = words.collect();

        match command {
            ".exit" => Ok(Command::Exit),
            "create-user" => {
                let args = arguments(command, &parts, 2, "<user> <password> [role...]")?;
                Ok(Command::CreateUser {
                    user: args[0].to_string(),
                    password: args[1].to_string(),
                    roles: owned(&args[2..]),
                })
            }
            "drop-user" => {
                let args = arguments(command, &parts, 1, "<user>")?;
                Ok(Command::DropUser {
                    user: args[0].to_string(),
                })
            }
            "set-password" | "change-password" => {
                let args = arguments(command, &parts, 1, "<password> [user]")?;
                let password = args[0].to_string();
                let user = args.get(1).map(|s| s.to_string());
                if command == "set-password" {
                    Ok(Command::SetPassword { password, user })
                } else {
                    Ok(Command::ChangePassword { password, user })
                }
            }
            "grant-roles" | "revoke-roles" | "replace-roles" => {
                let args = arguments(command, &parts, 2, "<user> <role...>")?;
                let user = args[0].to_string();
                let roles = owned(&args[1..]);
                Ok(match command {
                    "grant-roles" => Command::GrantRoles { user, roles },
                    "revoke-roles" => Command::RevokeRoles { user, roles },
                    _ => Command::ReplaceRoles { user, roles },
                })
            }
            "create-role" => {
                let args = arguments(command, &parts, 2, "<role> <privilege-code...>")?;
                let privileges = args[1..]
                    .iter()
                    .map(|code| code.parse::<u8>())
                    .collect::<Result<Vec<u8>, _>>()
                    .map_err(|_| CommandError::InvalidCommandArguments {
                        command: command.to_string(),
                        reason: "privilege codes should be integers between 0 and 255".to_string(),
                    })?;
                Ok(Command::CreateRole {
                    role: args[0].to_string(),
                    privileges,
                })
            }
            "query-user" => Ok(Command::QueryUser {
                user: parts.first().map(|s| s.to_string()),
            }),
            "query-users" => Ok(Command::QueryUsers),
            _ => Err(CommandError::UnrecognizedCommand(line.trim().to_string())),
        }
    }
}

/// Prompt user for a valid admin command. End of input reads as `.exit`.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }
    Command::try_from(s.as_str())
}

/// Runs `command` and prints its outcome to `out`.
pub fn run<C, H, W>(
    client: &mut AdminClient<C, H>,
    command: Command,
    out: &mut W,
) -> Result<(), AdminError>
where
    C: Cluster,
    H: PasswordHasher,
    W: Write,
{
    match command {
        Command::Exit => return Ok(()),
        Command::CreateUser {
            user,
            password,
            roles,
        } => client.create_user(&user, &password, &roles)?,
        Command::DropUser { user } => client.drop_user(&user)?,
        Command::SetPassword { password, user } => {
            client.set_password(user.as_deref(), &password)?
        }
        Command::ChangePassword { password, user } => {
            client.change_password(user.as_deref(), &password)?
        }
        Command::GrantRoles { user, roles } => client.grant_roles(&user, &roles)?,
        Command::RevokeRoles { user, roles } => client.revoke_roles(&user, &roles)?,
        Command::ReplaceRoles { user, roles } => client.replace_roles(&user, &roles)?,
        Command::CreateRole { role, privileges } => client.create_role(&role, &privileges)?,
        Command::QueryUser { user } => {
            match client.query_user(user.as_deref())? {
                Some(user) => writeln!(out, "{user}")?,
                None => writeln!(out, "no such user")?,
            }
            return Ok(());
        }
        Command::QueryUsers => {
            for user in client.query_users()? {
                writeln!(out, "{user}")?;
            }
            return Ok(());
        }
    }
    writeln!(out, "ok")?;
    Ok(())
}
