//! Request validation for release creation and modification.
//!
//! Every check runs before anything is written; problems are collected into a
//! list of `{kind, offendingEntity}` issues rather than failing on the first.

use crate::error::{IssueKind, RelsyncError, Result, ValidationIssue};
use crate::types::{release_number, Release, ReleasePatch};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^M\d+\S*$").unwrap())
}

pub fn is_valid_release_name(name: &str) -> bool {
    name_re().is_match(name)
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Release must land at least a full day after code freeze, otherwise the
/// lifecycle state is indeterminate on release day.
pub fn dates_well_ordered(code_freeze: DateTime<Utc>, release: DateTime<Utc>) -> bool {
    release - code_freeze >= Duration::days(1)
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReleaseRequest {
    pub release_name: Option<String>,
    pub release_operator: Option<String>,
    pub code_freeze_date: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRelease {
    pub name: String,
    pub operator: String,
    pub code_freeze_date: DateTime<Utc>,
    pub release_date: DateTime<Utc>,
}

fn required<'a>(
    value: &'a Option<String>,
    field: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            issues.push(ValidationIssue::new(
                IssueKind::MissingField,
                format!("{entity}.{field}"),
            ));
            None
        }
    }
}

fn required_date(
    value: &Option<String>,
    field: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<DateTime<Utc>> {
    let raw = required(value, field, entity, issues)?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        issues.push(ValidationIssue::new(
            IssueKind::InvalidDate,
            format!("{entity}.{field}"),
        ));
    }
    parsed
}

/// Validate a batch of new releases against each other and the store.
///
/// Structural problems come back as `Validation`; a name that already exists
/// in the store comes back as `ReleaseExists`.
pub fn validate_new_releases(
    requests: &[NewReleaseRequest],
    existing: &[Release],
) -> Result<Vec<ValidatedRelease>> {
    if let Some(taken) = requests
        .iter()
        .filter_map(|r| r.release_name.as_deref().map(str::trim))
        .find(|name| existing.iter().any(|r| r.name == *name))
    {
        return Err(RelsyncError::ReleaseExists(taken.to_string()));
    }

    let mut issues = Vec::new();
    let mut validated = Vec::new();

    if requests.is_empty() {
        issues.push(ValidationIssue::new(IssueKind::MissingField, "releases"));
    }

    let mut seen = HashSet::new();
    let mut last_number = existing.iter().filter_map(Release::number).max();

    for (i, req) in requests.iter().enumerate() {
        let entity = req
            .release_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("releases[{i}]"));

        let name = required(&req.release_name, "releaseName", &entity, &mut issues);
        let operator = required(&req.release_operator, "releaseOperator", &entity, &mut issues);
        let cf = required_date(&req.code_freeze_date, "codeFreezeDate", &entity, &mut issues);
        let rd = required_date(&req.release_date, "releaseDate", &entity, &mut issues);

        if let Some(name) = name {
            if !is_valid_release_name(name) {
                issues.push(ValidationIssue::new(IssueKind::InvalidName, name));
            } else {
                if !seen.insert(name.to_string()) {
                    issues.push(ValidationIssue::new(IssueKind::DuplicateName, name));
                }
                let number = release_number(name);
                if let (Some(n), Some(last)) = (number, last_number) {
                    if n <= last {
                        issues.push(ValidationIssue::new(IssueKind::NonMonotonicNumbering, name));
                    }
                }
                if number.is_some() {
                    last_number = last_number.max(number);
                }
            }
        }

        if let (Some(cf), Some(rd)) = (cf, rd) {
            if !dates_well_ordered(cf, rd) {
                issues.push(ValidationIssue::new(
                    IssueKind::CodeFreezeNotBeforeRelease,
                    entity.clone(),
                ));
            }
        }

        if let (Some(name), Some(operator), Some(cf), Some(rd)) = (name, operator, cf, rd) {
            validated.push(ValidatedRelease {
                name: name.to_string(),
                operator: operator.to_string(),
                code_freeze_date: cf,
                release_date: rd,
            });
        }
    }

    if !issues.is_empty() {
        return Err(RelsyncError::Validation(issues));
    }
    Ok(validated)
}

// ---------------------------------------------------------------------------
// Modification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyReleaseRequest {
    pub release_name: Option<String>,
    pub release_operator: Option<String>,
    pub code_freeze_date: Option<String>,
    pub release_date: Option<String>,
    pub is_complete: Option<bool>,
}

impl ModifyReleaseRequest {
    /// Parse string fields into a patch. Dates that fail to parse are
    /// reported as `InvalidDate`.
    pub fn into_patch(self, entity: &str) -> Result<ReleasePatch> {
        let mut issues = Vec::new();
        let mut parse = |raw: Option<String>, field: &str| {
            raw.and_then(|s| {
                let parsed = parse_date(&s);
                if parsed.is_none() {
                    issues.push(ValidationIssue::new(
                        IssueKind::InvalidDate,
                        format!("{entity}.{field}"),
                    ));
                }
                parsed
            })
        };
        let code_freeze_date = parse(self.code_freeze_date, "codeFreezeDate");
        let release_date = parse(self.release_date, "releaseDate");
        if !issues.is_empty() {
            return Err(RelsyncError::Validation(issues));
        }
        Ok(ReleasePatch {
            name: self.release_name.map(|s| s.trim().to_string()),
            operator: self.release_operator,
            code_freeze_date,
            release_date,
            is_complete: self.is_complete,
            ..Default::default()
        })
    }
}

/// Check a patch against the release it modifies and the other releases.
pub fn validate_patch(
    current: &Release,
    patch: &ReleasePatch,
    others: &[Release],
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Some(name) = &patch.name {
        if !is_valid_release_name(name) {
            issues.push(ValidationIssue::new(IssueKind::InvalidName, name.clone()));
        } else if others
            .iter()
            .any(|r| r.id != current.id && &r.name == name)
        {
            issues.push(ValidationIssue::new(IssueKind::DuplicateName, name.clone()));
        }
    }
    if let Some(operator) = &patch.operator {
        if operator.trim().is_empty() {
            issues.push(ValidationIssue::new(
                IssueKind::MissingField,
                format!("{}.releaseOperator", current.name),
            ));
        }
    }

    let cf = patch.code_freeze_date.unwrap_or(current.code_freeze_date);
    let rd = patch.release_date.unwrap_or(current.release_date);
    if (patch.code_freeze_date.is_some() || patch.release_date.is_some())
        && !dates_well_ordered(cf, rd)
    {
        issues.push(ValidationIssue::new(
            IssueKind::CodeFreezeNotBeforeRelease,
            current.name.clone(),
        ));
    }

    issues
}
