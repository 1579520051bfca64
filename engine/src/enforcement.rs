//! Enforcement of an expired episode.

use glam::Vec3;
use restraint_warden_core::{host::Host, ActorId, Command, Event, Notice, Timestamp};
use restraint_warden_store::LogEntry;
use restraint_warden_system_chaos::Enforcement;
use restraint_warden_system_episodes::Expiry;
use tracing::{info, warn};

use crate::Warden;

impl Warden {
    /// Releases the victim of an expired episode and runs every consequence.
    pub(crate) fn enforce<H>(
        &mut self,
        expiry: Expiry,
        now: Timestamp,
        host: &mut H,
        events: &mut Vec<Event>,
    ) where
        H: Host + ?Sized,
    {
        let actor = expiry.actor;
        if !host.is_connected(actor) {
            return;
        }

        let enforcement = Enforcement {
            victim: actor,
            origin: host.position(actor).unwrap_or_default(),
            origin_in_safe_area: host.is_in_safe_area(actor),
            choice: expiry.choice,
        };

        self.execute(
            vec![Command::HidePrompt { actor }, Command::Release { actor }],
            now,
            host,
        );
        self.relocate(actor, now, host, events);
        host.notify(actor, &Notice::Released);

        if !expiry.debug {
            self.immunity.grant(actor, now, self.config.immunity());
        }

        let chaos_triggered = self
            .chaos
            .trigger(&enforcement, now, host, &mut self.store, events);

        let name = host.display_name(actor).unwrap_or_default();
        self.store.append_log(LogEntry {
            at: now,
            victim: actor,
            victim_name: name.clone(),
            duration_secs: expiry.elapsed.as_secs(),
            destination: self.destination,
            choice: expiry.choice,
            chaos_triggered,
        });

        if !expiry.debug {
            info!(
                %actor,
                name,
                elapsed_secs = expiry.elapsed.as_secs(),
                destination = %self.destination,
                choice = ?expiry.choice,
                chaos_triggered,
                "restraint limit enforced"
            );
        }
        events.push(Event::LimitEnforced {
            actor,
            elapsed: expiry.elapsed,
            choice: expiry.choice,
            debug: expiry.debug,
        });
    }

    fn relocate<H>(&mut self, actor: ActorId, now: Timestamp, host: &mut H, events: &mut Vec<Event>)
    where
        H: Host + ?Sized,
    {
        let destination = self.destination;
        let Some(center) = self.destination_center(&*host) else {
            warn!(%actor, %destination, "destination landmark not found; actor not relocated");
            events.push(Event::DestinationUnavailable { actor, destination });
            return;
        };

        let mut commands = Vec::new();
        if self.config.teleport_only_within_safe_zone {
            self.search.begin(
                actor,
                destination,
                center,
                now,
                &*host,
                &mut self.store,
                &mut commands,
                events,
            );
        } else {
            self.search
                .teleport_to_center(actor, destination, center, &*host, &mut commands, events);
        }
        self.execute(commands, now, host);
    }

    fn destination_center<H>(&mut self, host: &H) -> Option<Vec3>
    where
        H: Host + ?Sized,
    {
        if let Some(center) = self.centers.get(&self.destination) {
            return Some(*center);
        }
        let center = self.destination.resolve(&host.landmarks())?;
        let _ = self.centers.insert(self.destination, center);
        Some(center)
    }
}
