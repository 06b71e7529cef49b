//! Default read-only policy (spec §3, §8).
//!
//! The policy is a pure predicate over `(source, name)`. It does not
//! consult the catalog — membership/source-match checks belong to the
//! validator (spec §4.5b); the policy only judges whether the *name*
//! itself is safe to invoke.

/// Substrings that mark a tool name as remote-mutating. Deliberately does
/// not include `_download_`: several read-only tools (`confluence_download_attachment`,
/// `github_download_job_logs`) fetch bytes without mutating upstream state,
/// and a blanket ban on "download" would block them too.
const MUTATING_FRAGMENTS: &[&str] = &[
    "_add_",
    "_create_",
    "_update_",
    "_transition_",
    "_delete_",
    "_remove_",
];

/// Tool names whose mutation isn't visible in the fragment list above but
/// which still write remote state (e.g. a verb-first name). Kept as an
/// explicit allowlist-of-exceptions rather than widening the fragment list,
/// so read-only lookalikes are never swept in by accident.
const EXTRA_MUTATING_NAMES: &[&str] = &["jira_add_attachment"];

fn is_mutating(name: &str) -> bool {
    MUTATING_FRAGMENTS.iter().any(|frag| name.contains(frag))
        || EXTRA_MUTATING_NAMES.contains(&name)
}

/// Given `(source, name)`, is the call allowed?
///
/// The default policy is read-only: local and upstream tools are both
/// subject to the same mutating-name check. Source is carried in the
/// signature (rather than collapsing to a name-only predicate) because a
/// future stricter policy may want to treat upstream tools more
/// conservatively than local ones.
pub trait Policy: Send + Sync {
    fn allows(&self, source: crate::tool::ToolSource, name: &str) -> bool;
}

/// The default, read-only policy described in spec §3.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyPolicy;

impl Policy for ReadOnlyPolicy {
    fn allows(&self, _source: crate::tool::ToolSource, name: &str) -> bool {
        if crate::tool::RESERVED_NAMES.contains(&name) {
            return false;
        }
        !is_mutating(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolSource;

    #[test]
    fn blocks_every_mutating_built_in_name() {
        let policy = ReadOnlyPolicy;
        for name in [
            "jira_add_comment",
            "jira_create_issue",
            "jira_update_issue",
            "jira_transition_issue",
            "jira_add_attachment",
            "some_delete_thing",
            "some_remove_thing",
        ] {
            assert!(
                !policy.allows(ToolSource::Local, name),
                "{name} should be blocked"
            );
        }
    }

    #[test]
    fn allows_read_only_lookalikes_of_download() {
        let policy = ReadOnlyPolicy;
        assert!(policy.allows(ToolSource::Local, "confluence_download_attachment"));
        assert!(policy.allows(ToolSource::Local, "github_download_job_logs"));
    }

    #[test]
    fn blocks_reserved_names() {
        let policy = ReadOnlyPolicy;
        assert!(!policy.allows(ToolSource::Local, "query"));
        assert!(!policy.allows(ToolSource::Local, "router"));
    }

    #[test]
    fn allows_plain_read_tools() {
        let policy = ReadOnlyPolicy;
        assert!(policy.allows(ToolSource::Local, "jira_get_issue"));
        assert!(policy.allows(ToolSource::Upstream, "list_pull_request_files"));
    }
}
