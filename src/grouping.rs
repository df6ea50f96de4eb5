//! Partitions a flat update list into the groups that become pull requests.
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::*;
use std::collections::BTreeMap;

use crate::{
    Result,
    config::GroupConfig,
    update::{PackageUpdate, Strategy, UpdateGroup, UpdateType},
};

/// Name of the default group collecting every non-major update.
pub const DEFAULT_NON_MAJOR_GROUP: &str = "Non-Major Updates";
/// Prefix of the default per-package major update groups.
pub const MAJOR_GROUP_PREFIX: &str = "Major Update - ";

struct CompiledGroup {
    name: String,
    matcher: GlobSet,
    strategy: Option<Strategy>,
}

pub struct GroupingEngine {
    groups: Vec<CompiledGroup>,
}

impl GroupingEngine {
    pub fn new(groups: &[GroupConfig]) -> Result<Self> {
        let mut compiled = vec![];

        for group in groups.iter() {
            let mut builder = GlobSetBuilder::new();
            for pattern in group.patterns.iter() {
                builder.add(Glob::new(pattern)?);
            }
            compiled.push(CompiledGroup {
                name: group.name.clone(),
                matcher: builder.build()?,
                strategy: group.strategy,
            });
        }

        Ok(Self { groups: compiled })
    }

    /// Configured groups claim updates first, in order. An update claimed
    /// by a group never falls through, even when the group's own strategy
    /// then filters it out. Whatever is left goes to default grouping.
    pub fn group(&self, updates: Vec<PackageUpdate>) -> Vec<UpdateGroup> {
        let mut pool = updates;
        let mut result = vec![];

        for group in self.groups.iter() {
            let (claimed, rest): (Vec<_>, Vec<_>) = pool
                .into_iter()
                .partition(|u| group.matcher.is_match(&u.name));
            pool = rest;

            let members = match group.strategy {
                Some(strategy) => claimed
                    .into_iter()
                    .filter(|u| strategy.allows(u.update_type))
                    .collect::<Vec<_>>(),
                None => claimed,
            };

            if members.is_empty() {
                debug!("group {} has no updates", group.name);
                continue;
            }

            info!("group {}: {} updates", group.name, members.len());
            result.push(UpdateGroup::new(&group.name, members));
        }

        result.extend(default_groups(pool));

        result
    }
}

/// One group per major-updated package and a single group holding every
/// non-major update.
pub fn default_groups(updates: Vec<PackageUpdate>) -> Vec<UpdateGroup> {
    let mut majors: BTreeMap<String, Vec<PackageUpdate>> = BTreeMap::new();
    let mut non_major = vec![];

    for update in updates.into_iter() {
        if update.update_type == UpdateType::Major {
            majors.entry(update.name.clone()).or_default().push(update);
        } else {
            non_major.push(update);
        }
    }

    let mut groups = majors
        .into_iter()
        .map(|(name, members)| {
            UpdateGroup::new(format!("{MAJOR_GROUP_PREFIX}{name}"), members)
        })
        .collect::<Vec<UpdateGroup>>();

    if !non_major.is_empty() {
        groups.push(UpdateGroup::new(DEFAULT_NON_MAJOR_GROUP, non_major));
    }

    groups
}
