//! AND/OR evaluation of grouped checks.
//!
//! Checks are bucketed by group key. Ungrouped checks share the `""` bucket.
//! Buckets run in first-seen order and must all pass; inside a bucket the
//! members are combined with the bucket's operator and always run one at a
//! time, in declaration order.

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// How the members of a bucket combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    /// Every member must pass.
    #[default]
    And,
    /// At least one member must pass.
    Or,
}

/// Group membership of a check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckGroup {
    keys: Vec<String>,
    operator: GroupOperator,
}

impl CheckGroup {
    /// Membership in the shared `""` bucket with AND semantics.
    pub fn ungrouped() -> Self {
        Self::default()
    }

    /// Membership in the given buckets with the given operator. Repeated
    /// keys collapse into one.
    pub fn new<I, S>(keys: I, operator: GroupOperator) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).unique().collect(),
            operator,
        }
    }

    /// Membership in one AND bucket.
    pub fn and(key: impl Into<String>) -> Self {
        Self::new([key], GroupOperator::And)
    }

    /// Membership in one OR bucket.
    pub fn or(key: impl Into<String>) -> Self {
        Self::new([key], GroupOperator::Or)
    }

    /// Explicit group keys; empty for ungrouped checks.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Operator of this check's buckets.
    pub fn operator(&self) -> GroupOperator {
        self.operator
    }

    fn bucket_keys(&self) -> Vec<&str> {
        if self.keys.is_empty() {
            vec![""]
        } else {
            self.keys.iter().map(String::as_str).collect()
        }
    }
}

/// Anything that can be placed into check buckets.
pub trait Groupable {
    /// Group membership. Defaults to the shared ungrouped bucket.
    fn group(&self) -> CheckGroup {
        CheckGroup::ungrouped()
    }
}

impl<T: Groupable + ?Sized> Groupable for Arc<T> {
    fn group(&self) -> CheckGroup {
        (**self).group()
    }
}

/// Why a check did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CheckFailure {
    /// Caller-facing explanation.
    pub reason: String,
}

impl CheckFailure {
    /// Create a failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of a single check.
pub type CheckResult = Result<(), CheckFailure>;

struct Bucket<'a, T> {
    key: String,
    operator: GroupOperator,
    members: Vec<&'a T>,
}

fn into_buckets<T: Groupable>(checks: &[T]) -> Vec<Bucket<'_, T>> {
    let mut buckets: IndexMap<String, Bucket<'_, T>> = IndexMap::new();

    for check in checks {
        let group = check.group();
        for key in group.bucket_keys() {
            let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
                key: key.to_string(),
                operator: group.operator(),
                members: Vec::new(),
            });
            if bucket.operator != group.operator() {
                warn!(
                    "Check bucket {:?} mixes AND and OR members; using {:?}",
                    key, bucket.operator
                );
            }
            bucket.members.push(check);
        }
    }

    buckets.into_values().collect()
}

impl<'a, T> Bucket<'a, T> {
    async fn evaluate<F, Fut>(&self, run: &mut F) -> CheckResult
    where
        F: FnMut(&'a T) -> Fut,
        Fut: Future<Output = CheckResult>,
    {
        match self.operator {
            GroupOperator::And => {
                for &check in &self.members {
                    run(check).await?;
                }
                Ok(())
            }
            GroupOperator::Or => {
                let mut last_failure = None;
                for &check in &self.members {
                    match run(check).await {
                        Ok(()) => return Ok(()),
                        Err(failure) => last_failure = Some(failure),
                    }
                }
                match last_failure {
                    Some(failure) => Err(failure),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Evaluate `checks` bucket by bucket, invoking `run` for each check that has
/// to be consulted.
///
/// Returns the failure of the check that decided the failing bucket: the first
/// failing member of an AND bucket, or the last member of an OR bucket where
/// nothing passed.
pub async fn evaluate_groups<'a, T, F, Fut>(checks: &'a [T], mut run: F) -> CheckResult
where
    T: Groupable,
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = CheckResult>,
{
    for bucket in into_buckets(checks) {
        if let Err(failure) = bucket.evaluate(&mut run).await {
            tracing::debug!("Check bucket {:?} failed: {}", bucket.key, failure);
            return Err(failure);
        }
    }
    Ok(())
}
