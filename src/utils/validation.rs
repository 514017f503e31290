// Request payload validation helpers

use once_cell::sync::Lazy;
use regex::Regex;

/// owner/repo, optionally with a path suffix for file-scoped generations
static REPO_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*/[A-Za-z0-9][A-Za-z0-9_.-]*(/[^\s]+)?$")
        .expect("repo ref regex")
});

/// Check a target repository reference for basic well-formedness.
pub fn is_valid_repo_ref(target: &str) -> bool {
    target.len() <= 512 && REPO_REF.is_match(target)
}
