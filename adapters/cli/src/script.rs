use std::{error::Error, fmt};

use glam::Vec3;
use restraint_warden_core::{ActorId, Choice, EntityKind};

/// Delimiter that starts a comment running to the end of the line.
const COMMENT: char = '#';

/// Single instruction of a sandbox script.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Directive {
    /// Sets the terrain height.
    Ground(f32),
    /// Adds a named landmark.
    Landmark { position: Vec3, name: String },
    /// Adds a circular safe area.
    SafeArea { center: Vec3, radius: f32 },
    /// Adds a spherical obstacle.
    Obstacle { center: Vec3, radius: f32 },
    /// Adds a construction entity.
    Structure {
        kind: EntityKind,
        position: Vec3,
        prefab: String,
    },
    /// Connects an actor.
    Spawn {
        actor: ActorId,
        position: Vec3,
        name: String,
    },
    /// Grants a permission node.
    Grant { actor: ActorId, node: String },
    /// Revokes a permission node.
    Revoke { actor: ActorId, node: String },
    /// Restrains an actor.
    Restrain(ActorId),
    /// Frees an actor as a captor would.
    Unrestrain(ActorId),
    /// Puts the prisoner hood on an actor.
    Hood(ActorId),
    /// Moves an actor outside the engine.
    Place { actor: ActorId, position: Vec3 },
    /// Disconnects an actor and notifies the engine.
    Disconnect(ActorId),
    /// Kills an actor and notifies the engine.
    Kill(ActorId),
    /// Enables a scripted host failure, or clears them all.
    Fail(Option<FailureKind>),
    /// Runs one engine step at an absolute time in seconds.
    At(f64),
    /// Advances the clock by a number of seconds in small steps.
    Run(f64),
    /// Records a victim's choice.
    Choose { actor: ActorId, choice: Choice },
    /// Issues an administrative command.
    Admin { caller: ActorId, args: Vec<String> },
    /// Regenerates the world under a new identifier.
    ResetWorld(String),
}

/// Host failure that can be scripted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Teleport,
    WritePosition,
    Geometry,
    RaycastMiss,
    Spawn,
    StickyFlag,
}

/// Errors raised while parsing a script line.
#[derive(Debug, PartialEq)]
pub(crate) enum ScriptError {
    /// The directive keyword is unknown.
    UnknownDirective(String),
    /// The directive is missing an argument.
    MissingArgument(&'static str),
    /// An argument could not be parsed.
    InvalidArgument { name: &'static str, value: String },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDirective(keyword) => write!(f, "unknown directive '{keyword}'"),
            Self::MissingArgument(name) => write!(f, "missing argument <{name}>"),
            Self::InvalidArgument { name, value } => {
                write!(f, "could not parse <{name}> from '{value}'")
            }
        }
    }
}

impl Error for ScriptError {}

/// Parses one script line; blank lines and comments yield `None`.
pub(crate) fn parse_line(line: &str) -> Result<Option<Directive>, ScriptError> {
    let content = line.split(COMMENT).next().unwrap_or_default();
    let mut words = Words(content.split_whitespace());
    let Some(keyword) = words.0.next() else {
        return Ok(None);
    };

    let directive = match keyword.to_ascii_lowercase().as_str() {
        "ground" => Directive::Ground(words.number("height")?),
        "landmark" => Directive::Landmark {
            position: words.vector()?,
            name: words.rest("name")?,
        },
        "safe-area" => Directive::SafeArea {
            center: words.vector()?,
            radius: words.number("radius")?,
        },
        "obstacle" => Directive::Obstacle {
            center: words.vector()?,
            radius: words.number("radius")?,
        },
        "structure" => Directive::Structure {
            kind: words.entity_kind()?,
            position: words.vector()?,
            prefab: words.rest("prefab")?,
        },
        "spawn" => Directive::Spawn {
            actor: words.actor()?,
            position: words.vector()?,
            name: words.rest("name")?,
        },
        "grant" => Directive::Grant {
            actor: words.actor()?,
            node: words.word("node")?.to_owned(),
        },
        "revoke" => Directive::Revoke {
            actor: words.actor()?,
            node: words.word("node")?.to_owned(),
        },
        "restrain" => Directive::Restrain(words.actor()?),
        "unrestrain" => Directive::Unrestrain(words.actor()?),
        "hood" => Directive::Hood(words.actor()?),
        "place" => Directive::Place {
            actor: words.actor()?,
            position: words.vector()?,
        },
        "disconnect" => Directive::Disconnect(words.actor()?),
        "kill" => Directive::Kill(words.actor()?),
        "fail" => Directive::Fail(words.failure()?),
        "at" => Directive::At(words.number("seconds")?),
        "run" => Directive::Run(words.number("seconds")?),
        "choice" => Directive::Choose {
            actor: words.actor()?,
            choice: words.choice()?,
        },
        "admin" => Directive::Admin {
            caller: words.actor()?,
            args: words.0.by_ref().map(str::to_owned).collect(),
        },
        "reset-world" => Directive::ResetWorld(words.word("world_id")?.to_owned()),
        other => return Err(ScriptError::UnknownDirective(other.to_owned())),
    };
    Ok(Some(directive))
}

struct Words<'a>(std::str::SplitWhitespace<'a>);

impl<'a> Words<'a> {
    fn word(&mut self, name: &'static str) -> Result<&'a str, ScriptError> {
        self.0.next().ok_or(ScriptError::MissingArgument(name))
    }

    fn rest(&mut self, name: &'static str) -> Result<String, ScriptError> {
        let rest: Vec<&str> = self.0.by_ref().collect();
        if rest.is_empty() {
            return Err(ScriptError::MissingArgument(name));
        }
        Ok(rest.join(" "))
    }

    fn number<T: std::str::FromStr>(&mut self, name: &'static str) -> Result<T, ScriptError> {
        let value = self.word(name)?;
        value.parse().map_err(|_| ScriptError::InvalidArgument {
            name,
            value: value.to_owned(),
        })
    }

    fn vector(&mut self) -> Result<Vec3, ScriptError> {
        Ok(Vec3::new(
            self.number("x")?,
            self.number("y")?,
            self.number("z")?,
        ))
    }

    fn actor(&mut self) -> Result<ActorId, ScriptError> {
        self.number("actor").map(ActorId::new)
    }

    fn choice(&mut self) -> Result<Choice, ScriptError> {
        let value = self.word("choice")?;
        match Choice::parse(value) {
            Some(choice) if choice != Choice::None => Ok(choice),
            _ => Err(ScriptError::InvalidArgument {
                name: "choice",
                value: value.to_owned(),
            }),
        }
    }

    fn entity_kind(&mut self) -> Result<EntityKind, ScriptError> {
        let value = self.word("kind")?;
        match value.to_ascii_lowercase().as_str() {
            "building" => Ok(EntityKind::BuildingBlock),
            "decaying" => Ok(EntityKind::Decaying),
            "other" => Ok(EntityKind::Other),
            _ => Err(ScriptError::InvalidArgument {
                name: "kind",
                value: value.to_owned(),
            }),
        }
    }

    fn failure(&mut self) -> Result<Option<FailureKind>, ScriptError> {
        let value = self.word("failure")?;
        let kind = match value.to_ascii_lowercase().as_str() {
            "none" => return Ok(None),
            "teleport" => FailureKind::Teleport,
            "write" => FailureKind::WritePosition,
            "geometry" => FailureKind::Geometry,
            "raycast" => FailureKind::RaycastMiss,
            "spawn" => FailureKind::Spawn,
            "sticky" => FailureKind::StickyFlag,
            _ => {
                return Err(ScriptError::InvalidArgument {
                    name: "failure",
                    value: value.to_owned(),
                })
            }
        };
        Ok(Some(kind))
    }
}
