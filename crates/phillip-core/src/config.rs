//! Runtime configuration shared by the poll loops and the sources.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Actor, GroupId, RawKind};

/// Well-known osu-web user group ids.
pub mod groups {
    use crate::model::GroupId;

    pub const GMT: GroupId = 4;
    pub const NAT: GroupId = 7;
    pub const ALUMNI: GroupId = 16;
    pub const FULL_BN: GroupId = 28;
    pub const PROBATION_BN: GroupId = 32;

    pub const DEFAULT: &[GroupId] = &[GMT, NAT, ALUMNI, FULL_BN, PROBATION_BN];
}

/// User id of BanchoBot, the site's automation account.
pub const SYSTEM_ACTOR_ID: u64 = 3;

/// Which raw kinds to request from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedFilter {
    pub nominate: bool,
    pub rank: bool,
    pub love: bool,
    pub nomination_reset: bool,
    pub disqualify: bool,
}

impl Default for FeedFilter {
    fn default() -> Self {
        Self {
            nominate: true,
            rank: true,
            love: true,
            nomination_reset: true,
            disqualify: true,
        }
    }
}

impl FeedFilter {
    /// Raw kinds to request. Nominations always bring their `qualify` markers
    /// along, since classification depends on them.
    pub fn kinds(&self) -> Vec<RawKind> {
        let mut kinds: Vec<RawKind> = [
            (self.nominate, RawKind::Nominate),
            (self.rank, RawKind::Rank),
            (self.love, RawKind::Love),
            (self.nomination_reset, RawKind::NominationReset),
            (self.disqualify, RawKind::Disqualify),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
        .collect();
        if self.nominate {
            kinds.push(RawKind::Qualify);
        }
        kinds
    }
}

/// Scheduling and filtering of the two poll loops.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub map_interval: Duration,
    pub roster_interval: Duration,
    pub groups: Vec<GroupId>,
    /// Suppress events triggered by the automation account.
    pub skip_system_actor: bool,
    pub system_actor_id: u64,
    pub disable_map_feed: bool,
    pub disable_group_feed: bool,
    pub filter: FeedFilter,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            map_interval: Duration::from_secs(5 * 60),
            roster_interval: Duration::from_secs(15 * 60),
            groups: groups::DEFAULT.to_vec(),
            skip_system_actor: true,
            system_actor_id: SYSTEM_ACTOR_ID,
            disable_map_feed: false,
            disable_group_feed: false,
            filter: FeedFilter::default(),
        }
    }
}

impl PollConfig {
    /// Check the configuration before any loop starts.
    pub fn validate(&self, has_dispatch_target: bool) -> Result<(), ConfigError> {
        if self.disable_map_feed && self.disable_group_feed {
            return Err(ConfigError::NothingToRun);
        }
        if !has_dispatch_target {
            return Err(ConfigError::NoDispatchTarget);
        }
        if !self.disable_map_feed && self.map_interval.is_zero() {
            return Err(ConfigError::InvalidInterval("map feed"));
        }
        if !self.disable_group_feed && self.roster_interval.is_zero() {
            return Err(ConfigError::InvalidInterval("group feed"));
        }
        Ok(())
    }

    /// Whether an event by `actor` should be kept from consumers.
    pub fn is_suppressed(&self, actor: Option<&Actor>) -> bool {
        self.skip_system_actor && actor.is_some_and(|a| a.id == self.system_actor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_requests_everything_plus_qualify() {
        let kinds = FeedFilter::default().kinds();
        assert_eq!(
            kinds,
            vec![
                RawKind::Nominate,
                RawKind::Rank,
                RawKind::Love,
                RawKind::NominationReset,
                RawKind::Disqualify,
                RawKind::Qualify,
            ]
        );
    }

    #[test]
    fn no_nominations_means_no_qualify_markers() {
        let filter = FeedFilter {
            nominate: false,
            love: false,
            ..FeedFilter::default()
        };
        assert_eq!(
            filter.kinds(),
            vec![RawKind::Rank, RawKind::NominationReset, RawKind::Disqualify]
        );
    }

    #[test]
    fn validate_requires_a_loop() {
        let config = PollConfig {
            disable_map_feed: true,
            disable_group_feed: true,
            ..PollConfig::default()
        };
        assert_eq!(config.validate(true), Err(ConfigError::NothingToRun));
    }

    #[test]
    fn validate_requires_dispatch_target() {
        assert_eq!(
            PollConfig::default().validate(false),
            Err(ConfigError::NoDispatchTarget)
        );
        assert_eq!(PollConfig::default().validate(true), Ok(()));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let config = PollConfig {
            map_interval: Duration::ZERO,
            ..PollConfig::default()
        };
        assert_eq!(
            config.validate(true),
            Err(ConfigError::InvalidInterval("map feed"))
        );
        let disabled = PollConfig {
            disable_map_feed: true,
            ..config
        };
        assert_eq!(disabled.validate(true), Ok(()));
    }

    #[test]
    fn system_actor_suppression() {
        let config = PollConfig::default();
        assert!(config.is_suppressed(Some(&Actor::new(3, "BanchoBot"))));
        assert!(!config.is_suppressed(Some(&Actor::unnamed(4))));
        assert!(!config.is_suppressed(None));

        let keep_all = PollConfig {
            skip_system_actor: false,
            ..PollConfig::default()
        };
        assert!(!keep_all.is_suppressed(Some(&Actor::unnamed(3))));
    }
}
