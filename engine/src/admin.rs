//! Administrative command surface.

use std::fmt;

use restraint_warden_core::{
    host::Host, ActorId, Command, Destination, DiscardReason, Event, Notice, Timestamp, WornItem,
    PERMISSION_ADMIN,
};
use tracing::{info, warn};

use crate::Warden;

/// Reply line produced by an administrative command.
///
/// The [`fmt::Display`] implementation yields the default English text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminMessage {
    /// The caller lacks the admin permission.
    NoPermission,
    /// The command was malformed.
    Usage,
    /// No actor matched the lookup.
    NotFound,
    /// Tracking status of an actor.
    Status {
        /// Display name of the actor.
        name: String,
        /// Whether the actor is restrained.
        restrained: bool,
        /// Whether an episode is tracked.
        tracked: bool,
        /// Whole seconds since the episode started, zero when untracked.
        elapsed_secs: u64,
        /// Whether the tracked episode is a debug session.
        debug: bool,
    },
    /// Tracking state of an actor was reset.
    Reset {
        /// Display name of the actor.
        name: String,
    },
    /// The cache target was not recognised.
    CacheUsage,
    /// Cached safe spots were cleared.
    CacheCleared {
        /// Labels of the destinations whose spot was cleared.
        cleared: Vec<&'static str>,
    },
    /// Heading of a wear listing.
    WearHeader {
        /// Display name of the inspected actor.
        name: String,
    },
    /// Single worn item.
    WearLine(WornItem),
    /// The inspected actor wears nothing.
    WearNone,
    /// The wear container could not be read.
    WearError,
    /// Debug-session notice addressed to the caller.
    Notice(Notice),
}

impl fmt::Display for AdminMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPermission => f.write_str("You don't have permission to use that command."),
            Self::Usage => f.write_str(
                "Usage: /hcl status <nameOrId>  OR  /hcl reset <nameOrId>  OR  /hcl debug  OR  \
                 /hcl debugoff  OR  /hcl clearcache [outpost|bandit|all]  OR  /hcl wear <nameOrId>",
            ),
            Self::NotFound => f.write_str("Player not found."),
            Self::Status {
                name,
                restrained,
                tracked,
                elapsed_secs,
                debug,
            } => write!(
                f,
                "{name} restrained={restrained}, tracked={tracked}, elapsed={elapsed_secs}s, debug={debug}"
            ),
            Self::Reset { name } => write!(f, "Tracking state reset for {name}."),
            Self::CacheUsage => f.write_str(
                "Usage: /hcl clearcache [outpost|bandit|all]  OR  /hcl wear <nameOrId>",
            ),
            Self::CacheCleared { cleared } => {
                if cleared.is_empty() {
                    f.write_str(
                        "Cleared cached safe teleport spot for: none (no cached spot existed). \
                         It will be re-learned on the next rescue.",
                    )
                } else {
                    write!(
                        f,
                        "Cleared cached safe teleport spot for: {}. It will be re-learned on the next rescue.",
                        cleared.join(", ")
                    )
                }
            }
            Self::WearHeader { name } => write!(f, "Wear items for {name}:"),
            Self::WearLine(item) => write!(f, "- {} (itemid {})", item.shortname, item.item_id),
            Self::WearNone => f.write_str("- (none)"),
            Self::WearError => f.write_str("- (error reading wear container)"),
            Self::Notice(notice) => fmt::Display::fmt(notice, f),
        }
    }
}

/// Outcome of an administrative command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdminReply {
    /// Lines addressed to the caller, in order.
    pub messages: Vec<AdminMessage>,
    /// Events produced while executing the command.
    pub events: Vec<Event>,
}

impl AdminReply {
    fn single(message: AdminMessage) -> Self {
        Self {
            messages: vec![message],
            events: Vec::new(),
        }
    }
}

impl Warden {
    /// Executes an administrative command issued by `caller`.
    ///
    /// `args` holds the sub-command followed by its arguments.
    pub fn execute_admin<H>(
        &mut self,
        caller: ActorId,
        args: &[&str],
        now: Timestamp,
        host: &mut H,
    ) -> AdminReply
    where
        H: Host + ?Sized,
    {
        if !host.has_permission(caller, PERMISSION_ADMIN) {
            return AdminReply::single(AdminMessage::NoPermission);
        }
        let Some(sub) = args.first() else {
            return AdminReply::single(AdminMessage::Usage);
        };

        match sub.to_lowercase().as_str() {
            "debug" => self.start_debug(caller, now, host),
            "debugoff" => self.stop_debug(caller, now, host),
            "clearcache" => {
                let which = args.get(1).copied().unwrap_or("all");
                match self.clear_cache(which) {
                    Some(cleared) => AdminReply::single(AdminMessage::CacheCleared { cleared }),
                    None => AdminReply::single(AdminMessage::CacheUsage),
                }
            }
            sub @ ("status" | "reset" | "wear") => {
                let Some(query) = args.get(1) else {
                    return AdminReply::single(AdminMessage::Usage);
                };
                let Some(target) = find_actor(&*host, query) else {
                    return AdminReply::single(AdminMessage::NotFound);
                };
                match sub {
                    "status" => AdminReply::single(self.status(target, now, &*host)),
                    "reset" => self.reset(target, host),
                    _ => AdminReply {
                        messages: wear_listing(target, &*host),
                        events: Vec::new(),
                    },
                }
            }
            _ => AdminReply::single(AdminMessage::Usage),
        }
    }

    /// Clears the cached safe spot of the named destination, or of both.
    ///
    /// Every cleared spot is blacklisted. Returns the labels of the
    /// destinations that had a spot, or `None` when `which` is not recognised.
    pub fn clear_cache(&mut self, which: &str) -> Option<Vec<&'static str>> {
        let which = which.trim().to_lowercase();
        let targets: &[Destination] = match which.as_str() {
            "" | "all" => &Destination::ALL,
            "outpost" | "1" => &[Destination::Outpost],
            "bandit" | "banditcamp" | "2" => &[Destination::BanditCamp],
            _ => return None,
        };

        let mut cleared = Vec::new();
        for destination in targets {
            if let Some(spot) = self.store.evict_cached_spot(*destination) {
                self.store.add_to_blacklist(*destination, spot);
                cleared.push(destination.label());
            }
        }
        info!(?cleared, "cached safe spots cleared");
        Some(cleared)
    }

    fn start_debug<H>(&mut self, caller: ActorId, now: Timestamp, host: &mut H) -> AdminReply
    where
        H: Host + ?Sized,
    {
        if !self.config.debug_enabled {
            return AdminReply::single(AdminMessage::Notice(Notice::DebugDisabled));
        }

        if let Err(error) = host.apply_debug_restraint(caller) {
            warn!(actor = %caller, %error, "debug restraint could not be applied");
        }
        if let Err(error) = host.resync(caller) {
            warn!(actor = %caller, %error, "failed to resync debug actor");
        }

        let mut events = Vec::new();
        let limit = self.config.debug_limit();
        self.tracker.start_debug(caller, now, limit, &mut events);
        self.immunity.revoke(caller);
        info!(actor = %caller, limit_secs = limit.as_secs(), "debug episode started");
        AdminReply {
            messages: vec![AdminMessage::Notice(Notice::DebugStarted {
                seconds: limit.as_secs(),
            })],
            events,
        }
    }

    fn stop_debug<H>(&mut self, caller: ActorId, now: Timestamp, host: &mut H) -> AdminReply
    where
        H: Host + ?Sized,
    {
        let mut events = Vec::new();
        host.hide_choice_prompt(caller);
        let _ = self
            .tracker
            .discard(caller, DiscardReason::DebugStopped, &mut events);
        self.execute(vec![Command::Release { actor: caller }], now, host);
        AdminReply {
            messages: vec![AdminMessage::Notice(Notice::DebugStopped)],
            events,
        }
    }

    fn status<H>(&self, target: ActorId, now: Timestamp, host: &H) -> AdminMessage
    where
        H: Host + ?Sized,
    {
        let episode = self.tracker.episode(target);
        AdminMessage::Status {
            name: host.display_name(target).unwrap_or_default(),
            restrained: host.is_restrained(target),
            tracked: episode.is_some(),
            elapsed_secs: episode.map_or(0, |episode| episode.elapsed(now).as_secs()),
            debug: episode.is_some_and(|episode| episode.is_debug()),
        }
    }

    fn reset<H>(&mut self, target: ActorId, host: &mut H) -> AdminReply
    where
        H: Host + ?Sized,
    {
        let mut events = Vec::new();
        host.hide_choice_prompt(target);
        let _ = self
            .tracker
            .discard(target, DiscardReason::AdminReset, &mut events);
        self.immunity.revoke(target);
        AdminReply {
            messages: vec![AdminMessage::Reset {
                name: host.display_name(target).unwrap_or_default(),
            }],
            events,
        }
    }
}

/// Resolves a numeric identifier, else a case-insensitive display-name
/// substring among connected actors.
fn find_actor<H>(host: &H, query: &str) -> Option<ActorId>
where
    H: Host + ?Sized,
{
    if query.is_empty() {
        return None;
    }
    if let Ok(id) = query.parse::<u64>() {
        let actor = ActorId::new(id);
        if host.display_name(actor).is_some() {
            return Some(actor);
        }
    }
    let needle = query.to_lowercase();
    host.connected_actors().into_iter().find(|actor| {
        host.display_name(*actor)
            .is_some_and(|name| name.to_lowercase().contains(&needle))
    })
}

fn wear_listing<H>(target: ActorId, host: &H) -> Vec<AdminMessage>
where
    H: Host + ?Sized,
{
    let mut messages = vec![AdminMessage::WearHeader {
        name: host.display_name(target).unwrap_or_default(),
    }];
    match host.worn_items(target) {
        Ok(items) if items.is_empty() => messages.push(AdminMessage::WearNone),
        Ok(items) => messages.extend(items.into_iter().map(AdminMessage::WearLine)),
        Err(error) => {
            warn!(actor = %target, %error, "failed to read wear container");
            messages.push(AdminMessage::WearError);
        }
    }
    messages
}
