//! Role assignment deltas shared by built-in role and user resources

use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChangeKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub kind: RoleChangeKind,
    pub uid: String,
}

impl RoleChange {
    pub fn add(uid: &str) -> Self {
        Self {
            kind: RoleChangeKind::Add,
            uid: uid.to_string(),
        }
    }

    pub fn remove(uid: &str) -> Self {
        Self {
            kind: RoleChangeKind::Remove,
            uid: uid.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleChangeError {
    #[error("Role '{0}' cannot be specified multiple times.")]
    Duplicate(String),
}

/// Role UIDs in list order, rejecting repeats
fn unique_roles(uids: &[String]) -> Result<Vec<&str>, RoleChangeError> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::with_capacity(uids.len());
    for uid in uids {
        if !seen.insert(uid.as_str()) {
            return Err(RoleChangeError::Duplicate(uid.clone()));
        }
        ordered.push(uid.as_str());
    }
    Ok(ordered)
}

/// Split stored and configured role lists into de-duplicated ordered sets
pub fn collect_roles<'a>(
    state: &'a [String],
    config: &'a [String],
) -> Result<(Vec<&'a str>, Vec<&'a str>), RoleChangeError> {
    Ok((unique_roles(state)?, unique_roles(config)?))
}

/// Changes turning the `state` assignment into the `config` one.
///
/// Adds come first in config order, then removes in state order.
pub fn role_changes(
    state: &[String],
    config: &[String],
) -> Result<Vec<RoleChange>, RoleChangeError> {
    let (state, config) = collect_roles(state, config)?;
    let in_state: HashSet<&str> = state.iter().copied().collect();
    let in_config: HashSet<&str> = config.iter().copied().collect();

    let adds = config
        .iter()
        .filter(|uid| !in_state.contains(*uid))
        .map(|uid| RoleChange::add(uid));
    let removes = state
        .iter()
        .filter(|uid| !in_config.contains(*uid))
        .map(|uid| RoleChange::remove(uid));

    Ok(adds.chain(removes).collect())
}
