//! Agent identifiers and the branch names derived from them.

use chrono::Utc;
use rand::Rng;

/// Longest slug kept in a branch name.
pub const MAX_SLUG_LEN: usize = 30;

/// Slug used when a task has no usable characters.
const EMPTY_SLUG: &str = "task";

/// `<prefix>-<YYYYMMDD>-<4 lowercase hex>`.
pub fn generate_id(prefix: &str) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: u16 = rand::thread_rng().gen();
    format!("{prefix}-{date}-{suffix:04x}")
}

/// Generate an ID that `taken` does not already contain.
pub fn generate_unique_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = generate_id(prefix);
        if !taken(&id) {
            return id;
        }
        log::debug!("id collision on {id}, regenerating");
    }
}

/// Reduce a free-form task description to `[a-z0-9-]`, at most
/// [`MAX_SLUG_LEN`] characters, never starting or ending with `-`.
pub fn slugify(task: &str) -> String {
    let mut slug = String::with_capacity(task.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in task.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// `<prefix>/<id>/<slug>`.
pub fn branch_name(prefix: &str, id: &str, task: &str) -> String {
    format!("{prefix}/{id}/{}", slugify(task))
}

/// Check `name` against git's ref-name rules.
///
/// Returns Ok(()) if valid, or Err with a description of the problem.
pub fn validate_branch_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("cannot be empty".to_string());
    }
    if name == "@" {
        return Err("cannot be '@'".to_string());
    }
    if name.starts_with('-') {
        return Err("cannot start with '-'".to_string());
    }
    if name.ends_with('/') || name.ends_with('.') {
        return Err("cannot end with '/' or '.'".to_string());
    }
    if name.contains("..") || name.contains("//") || name.contains("@{") {
        return Err("cannot contain '..', '//' or '@{'".to_string());
    }
    if name
        .chars()
        .any(|c| c.is_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return Err("contains a forbidden character".to_string());
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err(format!("component {component:?} starts with '.'"));
        }
        if component.ends_with(".lock") {
            return Err(format!("component {component:?} ends with '.lock'"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_slug(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= MAX_SLUG_LEN
            && !s.starts_with('-')
            && !s.ends_with('-')
            && !s.contains("--")
            && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Fix the Login bug!"), "fix-the-login-bug");
        assert_eq!(slugify("  --Add  OAuth2 // support--  "), "add-oauth2-support");
    }

    #[test]
    fn slugify_empty_and_symbols() {
        assert_eq!(slugify(""), "task");
        assert_eq!(slugify("!!! ??? ..."), "task");
        assert_eq!(slugify("日本語のタスク"), "task");
    }

    #[test]
    fn slugify_truncates_without_trailing_dash() {
        let slug = slugify("implement the very long feature name that goes on and on");
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        // 30th char lands on a dash here
        let head = "a".repeat(29);
        assert_eq!(slugify(&format!("{head} bbbb")), head);
    }

    #[test]
    fn slugify_properties_hold_for_mixed_input() {
        for task in [
            "Ünïcödé façade",
            "emoji 🚀 launch 🚀",
            "tabs\tand\nnewlines",
            "UPPER_snake_Case-123",
            "a",
            "-",
            "x".repeat(200).as_str(),
        ] {
            let slug = slugify(task);
            assert!(is_slug(&slug), "{task:?} -> {slug:?}");
        }
    }

    #[test]
    fn ids_have_expected_shape() {
        let id = generate_id("cwt");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3, "{id}");
        assert_eq!(parts[0], "cwt");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn thousand_ids_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = generate_unique_id("cwt", |candidate| seen.contains(candidate));
            assert!(seen.insert(id));
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn generated_branches_are_valid_refs() {
        for task in ["Fix login", "", "weird: ~^ chars?*[", "trailing dots..."] {
            let branch = branch_name("cwt", &generate_id("cwt"), task);
            assert!(validate_branch_name(&branch).is_ok(), "{branch}");
        }
    }

    #[test]
    fn branch_uses_given_prefix() {
        let id = generate_id("agent");
        let branch = branch_name("agent", &id, "Fix login");
        assert_eq!(branch, format!("agent/{id}/fix-login"));
        assert!(branch.starts_with("agent/agent-"));
    }

    #[test]
    fn rejects_bad_ref_names() {
        for bad in ["", "@", "-x", "a/", "a.", "a..b", "a//b", "a@{b", "a b", "a~b", "a/.hidden", "a/b.lock"] {
            assert!(validate_branch_name(bad).is_err(), "{bad:?}");
        }
        assert!(validate_branch_name("cwt/cwt-20260101-ab12/fix-login").is_ok());
    }
}
