//! Parsing of version-delete conflict messages.
//!
//! Deleting a version that an alias still routes to fails with a conflict
//! whose message lists the referencing aliases, for example:
//!
//! ```text
//! Version to be deleted must not be referenced by an alias. Current list of
//! aliases referencing this version: [current, canary]
//! ```
//!
//! The list is only available as text, so this is the one place that scrapes
//! it. Callers must treat `None` as "unknown": do not retry, surface the error.

const MARKERS: [&str; 2] = [
    "aliases referencing this version:",
    "referenced by alias(es):",
];

/// Extract alias names from a conflict message.
///
/// Returns `None` when the message does not carry a bracketed alias list.
#[must_use]
pub fn referenced_aliases(message: &str) -> Option<Vec<String>> {
    let start = MARKERS
        .iter()
        .find_map(|marker| message.find(marker).map(|at| at + marker.len()))?;
    let list = message[start..].trim_start().strip_prefix('[')?;
    let end = list.find(']')?;

    Some(
        list[..end]
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_message() {
        let msg = "Version to be deleted must not be referenced by an alias. \
                   Current list of aliases referencing this version: [current]";
        assert_eq!(referenced_aliases(msg), Some(vec!["current".to_string()]));
    }

    #[test]
    fn short_form_with_several_names() {
        let msg = "version 5 is referenced by alias(es): [current, hoge ]";
        assert_eq!(
            referenced_aliases(msg),
            Some(vec!["current".to_string(), "hoge".to_string()])
        );
    }

    #[test]
    fn empty_list() {
        let msg = "Current list of aliases referencing this version: []";
        assert_eq!(referenced_aliases(msg), Some(vec![]));
    }

    #[test]
    fn unparseable() {
        assert_eq!(referenced_aliases("ConflictException"), None);
        assert_eq!(
            referenced_aliases("aliases referencing this version: current"),
            None
        );
        assert_eq!(
            referenced_aliases("aliases referencing this version: [current"),
            None
        );
    }
}
