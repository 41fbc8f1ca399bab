//! Skill-based membership rules.
//!
//! A rule maps one skill tag to a chat team and a list of channels in that
//! team. Every rule whose skill the user declared is applied; overlapping
//! rules are merged so each team and (team, channel) pair shows up once.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Account setup step triggered by one of the user's skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Description, for human consumption.
    pub name: String,
    /// Skill tag that triggers the rule.
    pub skill: String,
    /// Team the user joins.
    pub team: String,
    /// Channels the user joins, in order.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// One membership add, in the order it has to be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Team(String),
    Channel { team: String, channel: String },
}

/// Memberships already granted during one provisioning run, keyed by team.
#[derive(Debug, Default)]
pub struct MembershipSet {
    teams: BTreeMap<String, BTreeSet<String>>,
}

impl MembershipSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a team; returns false if it was already recorded.
    pub fn insert_team(&mut self, team: &str) -> bool {
        if self.teams.contains_key(team) {
            return false;
        }
        self.teams.insert(team.to_string(), BTreeSet::new());
        true
    }

    /// Record a channel under its team; returns false if already recorded.
    pub fn insert_channel(&mut self, team: &str, channel: &str) -> bool {
        self.teams
            .entry(team.to_string())
            .or_default()
            .insert(channel.to_string())
    }

    pub fn contains_team(&self, team: &str) -> bool {
        self.teams.contains_key(team)
    }

    /// Channels recorded for a team, sorted.
    pub fn channels(&self, team: &str) -> Vec<&str> {
        self.teams
            .get(team)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Resolve the ordered membership adds for a user's skills.
///
/// Rules are evaluated in configuration order. A team is emitted before the
/// first of its channels, and nothing is emitted twice.
pub fn resolve_memberships(skills: &[String], rules: &[Rule]) -> Vec<Membership> {
    let mut seen = MembershipSet::new();
    let mut plan = Vec::new();

    for rule in rules {
        if !skills.iter().any(|s| *s == rule.skill) {
            continue;
        }
        if seen.insert_team(&rule.team) {
            plan.push(Membership::Team(rule.team.clone()));
        }
        for channel in &rule.channels {
            if seen.insert_channel(&rule.team, channel) {
                plan.push(Membership::Channel {
                    team: rule.team.clone(),
                    channel: channel.clone(),
                });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(skill: &str, team: &str, channels: &[&str]) -> Rule {
        Rule {
            name: format!("{} -> {}", skill, team),
            skill: skill.to_string(),
            team: team.to_string(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn skills(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn channel(team: &str, channel: &str) -> Membership {
        Membership::Channel {
            team: team.to_string(),
            channel: channel.to_string(),
        }
    }

    #[test]
    fn test_overlapping_rules_merge_channels() {
        let rules = vec![
            rule("go", "T1", &["c1", "c2"]),
            rule("go", "T1", &["c2", "c3"]),
        ];
        let plan = resolve_memberships(&skills(&["go"]), &rules);
        assert_eq!(
            plan,
            vec![
                Membership::Team("T1".to_string()),
                channel("T1", "c1"),
                channel("T1", "c2"),
                channel("T1", "c3"),
            ]
        );
    }

    #[test]
    fn test_duplicate_rule_adds_nothing() {
        let mut rules = vec![rule("go", "T1", &["c1", "c2"]), rule("ops", "T2", &["c9"])];
        let once = resolve_memberships(&skills(&["go", "ops"]), &rules);
        rules.push(rules[0].clone());
        rules.push(rules[1].clone());
        let twice = resolve_memberships(&skills(&["go", "ops"]), &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unmatched_skill_yields_nothing() {
        let rules = vec![rule("go", "T1", &["c1"])];
        assert!(resolve_memberships(&skills(&["rust"]), &rules).is_empty());
        assert!(resolve_memberships(&[], &rules).is_empty());
    }

    #[test]
    fn test_skill_match_is_exact() {
        let rules = vec![rule("go", "T1", &["c1"])];
        assert!(resolve_memberships(&skills(&["Go", "golang"]), &rules).is_empty());
    }

    #[test]
    fn test_same_channel_in_different_teams() {
        let rules = vec![
            rule("go", "T1", &["general"]),
            rule("ops", "T2", &["general"]),
        ];
        let plan = resolve_memberships(&skills(&["go", "ops"]), &rules);
        assert_eq!(
            plan,
            vec![
                Membership::Team("T1".to_string()),
                channel("T1", "general"),
                Membership::Team("T2".to_string()),
                channel("T2", "general"),
            ]
        );
    }

    #[test]
    fn test_rules_follow_configuration_order() {
        let rules = vec![rule("ops", "T2", &["c9"]), rule("go", "T1", &["c1"])];
        let plan = resolve_memberships(&skills(&["go", "ops"]), &rules);
        assert_eq!(plan[0], Membership::Team("T2".to_string()));
        assert_eq!(plan[2], Membership::Team("T1".to_string()));
    }

    #[test]
    fn test_membership_set_tracks_per_team() {
        let mut set = MembershipSet::new();
        assert!(set.insert_team("T1"));
        assert!(!set.insert_team("T1"));
        assert!(set.insert_channel("T1", "c1"));
        assert!(!set.insert_channel("T1", "c1"));
        assert!(set.insert_channel("T1", "c0"));
        assert_eq!(set.channels("T1"), vec!["c0", "c1"]);
        assert!(set.channels("T2").is_empty());
        assert!(!set.contains_team("T2"));
    }
}
