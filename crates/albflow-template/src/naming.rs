//! Logical id and stack name generation

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// CloudFormation stack names are limited to 128 characters
pub const MAX_STACK_NAME_LEN: usize = 128;

const DIGEST_LEN: usize = 20;

/// Identity of the account a stack is deployed into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountScope {
    /// Account id (12 digits for AWS)
    pub account_id: String,

    /// Region the deployment targets
    pub region: Option<String>,

    /// Caller ARN, informational only
    pub caller_arn: Option<String>,
}

impl AccountScope {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: None,
            caller_arn: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Build a template logical id: the alphanumeric part of `prefix`
/// followed by a digest of `parts`
///
/// The same inputs always yield the same id, so redeploying a stack keeps
/// its resources.
pub fn logical_name(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());

    let clean: String = prefix.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("{}{}", clean, &digest[..DIGEST_LEN])
}

/// Strip a display name down to a valid logical id fragment
pub fn sanitize_logical_id(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Stack name unique per account: `<base>-<account id>`
///
/// Characters outside `[A-Za-z0-9-]` become `-` and the result is capped
/// at [`MAX_STACK_NAME_LEN`]. Fails when the account id is empty or the
/// name does not start with a letter.
pub fn scoped_stack_name(base: &str, scope: &AccountScope) -> Result<String> {
    let account = sanitize_stack_part(&scope.account_id);
    if account.is_empty() {
        return Err(StackError::NameGeneration(
            "caller identity has no account id".to_string(),
        ));
    }

    // The account suffix always survives truncation
    let room = MAX_STACK_NAME_LEN.saturating_sub(account.len() + 1);
    let mut base = sanitize_stack_part(base);
    base.truncate(room);
    let base = base.trim_end_matches('-');
    if base.is_empty() {
        return Err(StackError::NameGeneration(
            "stack name has no usable characters".to_string(),
        ));
    }
    let name = format!("{}-{}", base, account);

    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => Ok(name),
        _ => Err(StackError::NameGeneration(format!(
            "'{}' does not start with a letter",
            name
        ))),
    }
}

/// Replace characters outside `[A-Za-z0-9-]` with `-`, collapsing runs
fn sanitize_stack_part(raw: &str) -> String {
    let mut part = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' };
        if c == '-' && part.ends_with('-') {
            continue;
        }
        part.push(c);
    }
    part.trim_matches('-').to_string()
}
