//! Recognises the open pull request that already represents a group.
use log::*;
use regex::Regex;

use crate::{
    content::title,
    forge::{
        config::{BRANCH_PREFIX, COMPETING_BRANCH_PREFIXES},
        request::PullRequestRecord,
    },
    update::UpdateGroup,
};

/// Why a pull request was accepted as the group's existing PR. Variants are
/// ordered by strength of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    ExactTitle,
    Branch,
    SimilarTitle,
}

/// Branch name prefix shared by every branch of `group`; a timestamp
/// completes it.
pub fn branch_prefix(group: &UpdateGroup) -> String {
    format!("{BRANCH_PREFIX}/update-{}-", group.slug())
}

/// True when `pr` was opened by this engine and not by another bot.
pub fn is_own_pr(pr: &PullRequestRecord, bot_identity: &str) -> bool {
    let ours = pr.author == bot_identity
        || pr.head_branch.starts_with(&format!("{BRANCH_PREFIX}/"));

    let competing = COMPETING_BRANCH_PREFIXES
        .iter()
        .any(|p| pr.head_branch.starts_with(p));

    ours && !competing
}

fn match_kind(
    pr: &PullRequestRecord,
    group: &UpdateGroup,
    branch_regex: &Regex,
) -> Option<MatchKind> {
    if pr.title == group.title {
        return Some(MatchKind::ExactTitle);
    }

    if branch_regex.is_match(&pr.head_branch) {
        return Some(MatchKind::Branch);
    }

    if title::are_similar(&pr.title, &group.title) {
        return Some(MatchKind::SimilarTitle);
    }

    None
}

/// Picks the pull request representing `group` among `prs`. The strongest
/// evidence wins and ties go to the oldest (lowest numbered) pull request.
pub fn find_match<'a>(
    prs: &[&'a PullRequestRecord],
    group: &UpdateGroup,
    bot_identity: &str,
) -> Option<(&'a PullRequestRecord, MatchKind)> {
    let branch_regex =
        match Regex::new(&format!(r"^{}\d+$", regex::escape(&branch_prefix(group))))
        {
            Ok(re) => re,
            Err(err) => {
                error!("invalid branch pattern for group {}: {err}", group.name);
                return None;
            }
        };

    let mut matches = vec![];

    for pr in prs.iter().copied() {
        let kind = match_kind(pr, group, &branch_regex);

        if !is_own_pr(pr, bot_identity) {
            if kind.is_some() {
                warn!(
                    "possible duplicate of group {}: PR #{} ({}) is not managed by {bot_identity}",
                    group.name, pr.number, pr.head_branch
                );
            }
            continue;
        }

        if let Some(kind) = kind {
            matches.push((pr, kind));
        }
    }

    matches.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.number.cmp(&b.0.number)));

    if matches.len() > 1 {
        let numbers = matches
            .iter()
            .map(|(pr, _)| format!("#{}", pr.number))
            .collect::<Vec<String>>()
            .join(", ");
        warn!(
            "multiple pull requests match group {}: {numbers}: using #{}",
            group.name, matches[0].0.number
        );
    }

    matches.into_iter().next()
}
