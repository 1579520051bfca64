//! Engine configuration loaded from TOML.

use std::{fs, io, path::Path, time::Duration};

use glam::Vec3;
use restraint_warden_core::Destination;
use restraint_warden_store::BlacklistPolicy;
use restraint_warden_system_chaos::Config as ChaosConfig;
use restraint_warden_system_episodes::Config as EpisodeConfig;
use restraint_warden_system_spatial::Config as SpatialConfig;
use restraint_warden_system_teleport_search::Config as SearchConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors raised while reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("failed to access config file: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid configuration TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration could not be encoded.
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Every tunable of the engine.
///
/// Missing keys take their default; out-of-range values are clamped by
/// [`WardenConfig::clamped`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Master switch for the poll.
    pub enabled: bool,
    /// Seconds between polls, clamped to `1..=30`.
    pub check_interval_seconds: i64,
    /// Lifetime of cached exemption lookups; zero disables the cache.
    pub exempt_permission_cache_seconds: f32,
    /// Restraint limit in minutes, at least one.
    pub max_restrain_minutes: i64,
    /// Remaining seconds at which the victim is warned.
    pub warn_seconds_before_limit: i64,
    /// Whether the victim is warned.
    pub warn_victim: bool,
    /// Destination name: `outpost`, `bandit`, or their numeric codes.
    pub teleport_destination: String,
    /// Legacy destination key; only read.
    #[serde(rename = "destination", skip_serializing)]
    pub legacy_destination: Option<String>,
    /// Offset added to every grounded position.
    pub destination_offset: Vec3,
    /// Whether relocation searches for a spot inside the safe area.
    pub teleport_only_within_safe_zone: bool,
    /// Radius of the random candidate disc.
    pub safe_zone_search_radius: f32,
    /// Non-cache attempts, clamped to `1..=25`.
    pub safe_zone_search_attempts: i64,
    /// Clearance capsule radius, clamped to `0.1..=3`.
    pub teleport_clearance_radius: f32,
    /// Clearance capsule height, clamped to `0.5..=5`.
    pub teleport_clearance_height: f32,
    /// Radius within which structures reject a candidate.
    pub building_proximity_reject_radius: f32,
    /// Search timeout in seconds; zero disables it.
    pub teleport_attempt_timeout_seconds: f32,
    /// Whether confirmed landings are cached.
    pub cache_safe_teleport_spots: bool,
    /// Minimum distance to a blacklisted point; zero disables the blacklist.
    pub cache_blacklist_min_distance: f32,
    /// Blacklist capacity per destination; zero keeps every entry.
    pub blacklist_max_entries_per_destination: i64,
    /// Whether the prisoner hood is removed before enforcement.
    pub remove_hood_before_prompt: bool,
    /// Remaining seconds at which the hood is removed.
    pub hood_remove_seconds_before_limit: i64,
    /// Immunity after enforcement in seconds; zero disables it.
    pub victim_recuff_immunity_seconds: i64,
    /// Longest restraint gap merged into the running episode.
    pub episode_merge_window_seconds: i64,
    /// Whether the chaos effect may trigger.
    pub chaos_enabled: bool,
    /// Whether origins inside safe areas are spared.
    pub chaos_only_outside_safe_zones: bool,
    /// Fuse of the chaos effect in seconds.
    pub chaos_fuse_seconds: i64,
    /// Per-victim chaos cooldown in minutes; zero disables it.
    pub chaos_cooldown_minutes_per_victim: i64,
    /// Whether bystanders near the origin veto the effect.
    pub chaos_radius_check_players: bool,
    /// Radius of the bystander check.
    pub chaos_radius_check_meters: f32,
    /// Bystanders tolerated within the radius.
    pub chaos_max_players_in_radius: i64,
    /// Whether the punish-or-forgive prompt is offered.
    pub enable_punish_forgive_prompt: bool,
    /// Remaining seconds at which the prompt is shown.
    pub prompt_seconds_before_limit: i64,
    /// Whether administrators can start debug episodes.
    pub debug_enabled: bool,
    /// Debug episode limit in seconds, at least five.
    pub debug_test_seconds: i64,
    /// Seed of the candidate generator.
    pub rng_seed: u64,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 2,
            exempt_permission_cache_seconds: 10.0,
            max_restrain_minutes: 20,
            warn_seconds_before_limit: 60,
            warn_victim: true,
            teleport_destination: "outpost".to_owned(),
            legacy_destination: None,
            destination_offset: Vec3::new(0.0, 1.5, 0.0),
            teleport_only_within_safe_zone: true,
            safe_zone_search_radius: 25.0,
            safe_zone_search_attempts: 8,
            teleport_clearance_radius: 0.6,
            teleport_clearance_height: 1.8,
            building_proximity_reject_radius: 6.0,
            teleport_attempt_timeout_seconds: 3.0,
            cache_safe_teleport_spots: true,
            cache_blacklist_min_distance: 6.0,
            blacklist_max_entries_per_destination: 50,
            remove_hood_before_prompt: false,
            hood_remove_seconds_before_limit: 60,
            victim_recuff_immunity_seconds: 300,
            episode_merge_window_seconds: 60,
            chaos_enabled: false,
            chaos_only_outside_safe_zones: true,
            chaos_fuse_seconds: 10,
            chaos_cooldown_minutes_per_victim: 1_440,
            chaos_radius_check_players: false,
            chaos_radius_check_meters: 6.0,
            chaos_max_players_in_radius: 0,
            enable_punish_forgive_prompt: false,
            prompt_seconds_before_limit: 60,
            debug_enabled: true,
            debug_test_seconds: 60,
            rng_seed: 0x5eed_7e1e_9047_0001,
        }
    }
}

impl WardenConfig {
    /// Parses TOML text, folds in the legacy destination key, and clamps.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let parsed: Self = toml::from_str(text)?;
        Ok(parsed.with_legacy_destination().clamped())
    }

    /// Loads the configuration file.
    ///
    /// A missing file yields the defaults. An unparsable file is reported and
    /// replaced by the defaults. Read failures are returned.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => return Err(error.into()),
        };
        match Self::from_toml_str(&text) {
            Ok(config) => Ok(config),
            Err(error) => {
                warn!(%error, path = %path.display(), "config is invalid; loading default values");
                Ok(Self::default())
            }
        }
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Encodes the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns the configuration with every value forced into its valid range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        clamp_int("max_restrain_minutes", &mut self.max_restrain_minutes, 1, i64::MAX);
        clamp_int("check_interval_seconds", &mut self.check_interval_seconds, 1, 30);
        clamp_int("warn_seconds_before_limit", &mut self.warn_seconds_before_limit, 0, i64::MAX);
        clamp_int("chaos_fuse_seconds", &mut self.chaos_fuse_seconds, 0, i64::MAX);
        clamp_int("safe_zone_search_attempts", &mut self.safe_zone_search_attempts, 1, 25);
        clamp_float("safe_zone_search_radius", &mut self.safe_zone_search_radius, 0.0, f32::MAX);
        clamp_float("teleport_clearance_radius", &mut self.teleport_clearance_radius, 0.1, 3.0);
        clamp_float("teleport_clearance_height", &mut self.teleport_clearance_height, 0.5, 5.0);
        clamp_int(
            "prompt_seconds_before_limit",
            &mut self.prompt_seconds_before_limit,
            0,
            i64::MAX,
        );
        clamp_int("debug_test_seconds", &mut self.debug_test_seconds, 5, i64::MAX);
        clamp_int(
            "hood_remove_seconds_before_limit",
            &mut self.hood_remove_seconds_before_limit,
            0,
            i64::MAX,
        );
        clamp_float(
            "cache_blacklist_min_distance",
            &mut self.cache_blacklist_min_distance,
            0.0,
            f32::MAX,
        );
        clamp_float(
            "teleport_attempt_timeout_seconds",
            &mut self.teleport_attempt_timeout_seconds,
            0.0,
            f32::MAX,
        );
        clamp_float(
            "exempt_permission_cache_seconds",
            &mut self.exempt_permission_cache_seconds,
            0.0,
            f32::MAX,
        );
        clamp_int(
            "blacklist_max_entries_per_destination",
            &mut self.blacklist_max_entries_per_destination,
            0,
            i64::MAX,
        );
        self
    }

    fn with_legacy_destination(mut self) -> Self {
        let Some(legacy) = self.legacy_destination.take() else {
            return self;
        };
        if legacy.trim().is_empty() {
            return self;
        }
        let current = self.teleport_destination.trim();
        let legacy = Destination::parse_or_default(&legacy);
        if current.is_empty()
            || (current.eq_ignore_ascii_case("outpost") && legacy == Destination::BanditCamp)
        {
            self.teleport_destination = legacy.primary_token().to_owned();
        }
        self
    }

    /// Destination enforced actors are relocated to.
    #[must_use]
    pub fn destination(&self) -> Destination {
        Destination::parse_or_default(&self.teleport_destination)
    }

    /// Time between polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        secs(self.check_interval_seconds.clamp(1, 30))
    }

    /// Lifetime of cached exemption lookups.
    #[must_use]
    pub fn exemption_ttl(&self) -> Duration {
        fractional_secs(self.exempt_permission_cache_seconds)
    }

    /// Immunity granted after regular enforcement.
    #[must_use]
    pub fn immunity(&self) -> Duration {
        secs(self.victim_recuff_immunity_seconds)
    }

    /// Limit of debug episodes.
    #[must_use]
    pub fn debug_limit(&self) -> Duration {
        secs(self.debug_test_seconds.max(5))
    }

    /// Episode tracker configuration.
    #[must_use]
    pub fn episode_config(&self) -> EpisodeConfig {
        let mut config = EpisodeConfig::new(
            secs(self.max_restrain_minutes.max(1).saturating_mul(60)),
            secs(self.episode_merge_window_seconds),
        );
        if self.warn_victim {
            config = config.with_warning(secs(self.warn_seconds_before_limit));
        }
        if self.remove_hood_before_prompt {
            config = config.with_hood_removal(secs(self.hood_remove_seconds_before_limit));
        }
        if self.enable_punish_forgive_prompt {
            config = config.with_prompt(secs(self.prompt_seconds_before_limit));
        }
        config
    }

    /// Spatial validator configuration.
    #[must_use]
    pub fn spatial_config(&self) -> SpatialConfig {
        SpatialConfig::new(
            self.teleport_clearance_radius,
            self.teleport_clearance_height,
            self.building_proximity_reject_radius,
            self.destination_offset,
        )
    }

    /// Teleport search configuration.
    #[must_use]
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig::new(
            self.safe_zone_search_radius.max(0.0),
            u32::try_from(self.safe_zone_search_attempts.clamp(1, 25)).unwrap_or(1),
            fractional_secs(self.teleport_attempt_timeout_seconds),
            self.cache_safe_teleport_spots,
            self.rng_seed,
        )
    }

    /// Chaos subsystem configuration.
    #[must_use]
    pub fn chaos_config(&self) -> ChaosConfig {
        let mut config = ChaosConfig::new(
            self.chaos_enabled,
            secs(self.chaos_fuse_seconds),
            secs(self.chaos_cooldown_minutes_per_victim.saturating_mul(60)),
        )
        .with_outside_safe_areas_only(self.chaos_only_outside_safe_zones)
        .with_required_choice(self.enable_punish_forgive_prompt);
        if self.chaos_radius_check_players {
            config = config.with_crowd_limit(
                self.chaos_radius_check_meters,
                usize::try_from(self.chaos_max_players_in_radius).unwrap_or(0),
            );
        }
        config
    }

    /// Blacklist policy of the store.
    #[must_use]
    pub fn blacklist_policy(&self) -> BlacklistPolicy {
        BlacklistPolicy {
            min_distance: self.cache_blacklist_min_distance.max(0.0),
            capacity: usize::try_from(self.blacklist_max_entries_per_destination).unwrap_or(0),
        }
    }
}

fn clamp_int(key: &str, value: &mut i64, min: i64, max: i64) {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        warn!(key, from = *value, to = clamped, "config value out of range; clamped");
        *value = clamped;
    }
}

fn clamp_float(key: &str, value: &mut f32, min: f32, max: f32) {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != *value {
        warn!(key, from = *value, to = clamped, "config value out of range; clamped");
        *value = clamped;
    }
}

fn secs(value: i64) -> Duration {
    Duration::from_secs(u64::try_from(value).unwrap_or(0))
}

fn fractional_secs(value: f32) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f32(value).unwrap_or(Duration::MAX)
}
