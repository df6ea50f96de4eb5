//! Tracking issue that lists every update group and its pull request.
use log::*;

use crate::{
    Result,
    config::DEFAULT_LABEL,
    content::body::BODY_MARKER,
    forge::{
        manager::ForgeManager,
        request::{CreateIssueRequest, ListIssuesRequest, UpdateIssueRequest},
    },
    sync::{SyncOutcome, SyncReport},
    update::UpdateGroup,
};

pub const DASHBOARD_TITLE: &str = "Dependency Dashboard";
pub const DASHBOARD_LABEL: &str = "dashboard";

fn describe(outcome: Option<&SyncOutcome>) -> String {
    match outcome {
        Some(SyncOutcome::Created { pr_number })
        | Some(SyncOutcome::Refreshed { pr_number })
        | Some(SyncOutcome::Skipped {
            pr_number: Some(pr_number),
        }) => format!("#{pr_number}"),
        Some(SyncOutcome::Skipped { pr_number: None }) => "up to date".into(),
        Some(SyncOutcome::Failed { reason }) => format!("failed: {reason}"),
        None => "pending".into(),
    }
}

pub fn render(groups: &[UpdateGroup], report: &SyncReport) -> String {
    let rows = groups
        .iter()
        .map(|g| {
            format!(
                "| {} | {} | {} | {} |",
                g.name,
                g.update_type,
                g.updates.len(),
                describe(report.outcome_for(&g.name))
            )
        })
        .collect::<Vec<String>>()
        .join("\n");

    format!(
        "{BODY_MARKER}\n## {DASHBOARD_TITLE}\n\nPending dependency updates:\n\n| Group | Type | Updates | Pull Request |\n|---|---|---|---|\n{rows}\n"
    )
}

/// Creates, updates or closes the dashboard issue. Returns the issue number
/// when one is left open.
pub async fn publish(
    forge: &ForgeManager,
    groups: &[UpdateGroup],
    report: &SyncReport,
) -> Result<Option<u64>> {
    let existing = forge
        .list_issues(ListIssuesRequest {
            labels: vec![DASHBOARD_LABEL.into()],
            include_closed: false,
        })
        .await?
        .into_iter()
        .find(|issue| issue.open && issue.title == DASHBOARD_TITLE);

    if groups.is_empty() {
        if let Some(issue) = existing {
            info!("no pending updates: closing dashboard #{}", issue.number);
            forge.close_issue(issue.number).await?;
        }
        return Ok(None);
    }

    let body = render(groups, report);

    match existing {
        Some(issue) if issue.body == body => {
            debug!("dashboard #{} already current", issue.number);
            Ok(Some(issue.number))
        }
        Some(issue) => {
            info!("updating dashboard #{}", issue.number);
            forge
                .update_issue(UpdateIssueRequest {
                    issue_number: issue.number,
                    title: None,
                    body: Some(body),
                })
                .await?;
            Ok(Some(issue.number))
        }
        None => {
            let issue = forge
                .create_issue(CreateIssueRequest {
                    title: DASHBOARD_TITLE.into(),
                    body,
                    labels: vec![DASHBOARD_LABEL.into(), DEFAULT_LABEL.into()],
                })
                .await?;
            info!("created dashboard #{}", issue.number);
            Ok(Some(issue.number))
        }
    }
}
