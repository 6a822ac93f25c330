//! Builds the virtual tree from a group hierarchy.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{debug, Span};

use crate::node::{DirRole, NodeId, NodeTimes};
use crate::tree::ProjectedTree;
use kdfs_common::{Error, SensitiveBytes};
use kdfs_vault::{AttributeKey, Entry, Group};

/// How a group or entry whose name matches an existing sibling is projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Reuse the existing directory; files already present keep their content.
    Merge,
    /// Same-named groups still share a directory. Anything else gets its own
    /// directory with a ` (n)` suffix.
    #[default]
    Suffix,
}

impl CollisionPolicy {
    /// Whether a directory projected as `incoming` may reuse a sibling
    /// directory already projected as `existing`.
    pub fn reuses(self, existing: DirRole, incoming: DirRole) -> bool {
        match self {
            CollisionPolicy::Merge => true,
            CollisionPolicy::Suffix => {
                existing == DirRole::Group && incoming == DirRole::Group
            }
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionPolicy::Merge => f.write_str("merge"),
            CollisionPolicy::Suffix => f.write_str("suffix"),
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(CollisionPolicy::Merge),
            "suffix" => Ok(CollisionPolicy::Suffix),
            other => Err(Error::InvalidInput(format!(
                "Unknown collision policy '{}'",
                other
            ))),
        }
    }
}

/// Make a group name or entry title usable as a file name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" => "_".to_string(),
        "." | ".." => format!("_{}", cleaned),
        _ => cleaned,
    }
}

/// Single depth-first pass from groups to directories and files.
pub struct TreeProjector {
    policy: CollisionPolicy,
    span: Span,
}

impl TreeProjector {
    pub fn new(policy: CollisionPolicy, span: Span) -> Self {
        Self { policy, span }
    }

    pub fn project(&self, groups: &[Group], created: SystemTime) -> ProjectedTree {
        let mut tree = ProjectedTree::new(created);
        for group in groups {
            self.project_group(&mut tree, NodeId::ROOT, group);
        }
        tree
    }

    fn project_group(&self, tree: &mut ProjectedTree, parent: NodeId, group: &Group) {
        let name = sanitize_name(&group.name);
        let times = NodeTimes::from(&group.times);
        let dir = self.directory(tree, parent, &name, DirRole::Group, times);

        for child in &group.groups {
            self.project_group(tree, dir, child);
        }
        for entry in &group.entries {
            self.project_entry(tree, dir, entry);
        }
    }

    fn directory(
        &self,
        tree: &mut ProjectedTree,
        parent: NodeId,
        name: &str,
        role: DirRole,
        times: NodeTimes,
    ) -> NodeId {
        let policy = self.policy;
        tree.lookup_or_create_dir(parent, name, role, times, |existing| {
            policy.reuses(existing, role)
        })
    }

    fn project_entry(&self, tree: &mut ProjectedTree, parent: NodeId, entry: &Entry) {
        if entry.title.is_empty() {
            debug!(parent: &self.span, "Skipping entry without title");
            return;
        }

        let name = sanitize_name(&entry.title);
        let times = NodeTimes::from(&entry.times);
        let dir = self.directory(tree, parent, &name, DirRole::Entry, times);

        for key in AttributeKey::PROJECTED {
            let value = match entry.attribute(key) {
                Some(value) if !value.is_empty() => value,
                _ => continue,
            };
            let file_name = key.file_name();
            if tree
                .create_file(dir, &file_name, SensitiveBytes::from(value), times)
                .is_none()
            {
                debug!(
                    parent: &self.span,
                    file = %file_name,
                    "Keeping first value of merged entry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeError, NodeKind};
    use kdfs_common::TreePath;

    fn project(groups: &[Group], policy: CollisionPolicy) -> ProjectedTree {
        TreeProjector::new(policy, Span::none()).project(groups, SystemTime::UNIX_EPOCH)
    }

    fn read(tree: &ProjectedTree, path: &str) -> Vec<u8> {
        let id = tree.resolve(&TreePath::parse(path).unwrap()).unwrap();
        tree.get_node(id).unwrap().read(0, 4096).unwrap().to_vec()
    }

    fn names(tree: &ProjectedTree, path: &str) -> Vec<String> {
        let id = tree.resolve(&TreePath::parse(path).unwrap()).unwrap();
        tree.get_node(id)
            .unwrap()
            .children()
            .unwrap()
            .iter()
            .map(|c| tree.get_node(*c).unwrap().name().to_string())
            .collect()
    }

    fn bank() -> Entry {
        Entry::new("Bank")
            .with_field("UserName", "alice")
            .with_field("Password", "secret123")
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("a/b"), "a_b");
        assert_eq!(sanitize_name("nul\0byte"), "nul_byte");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(sanitize_name("."), "_.");
        assert_eq!(sanitize_name(".."), "_..");
        assert_eq!(sanitize_name("...").as_str(), "...");
    }

    #[test]
    fn test_passwords_bank_scenario() {
        let groups = vec![Group::new("Passwords").with_entry(bank())];
        let tree = project(&groups, CollisionPolicy::default());

        assert_eq!(read(&tree, "/Passwords/Bank/username"), b"alice");
        assert_eq!(read(&tree, "/Passwords/Bank/password"), b"secret123");
        assert_eq!(names(&tree, "/Passwords/Bank"), ["username", "password"]);
        assert_eq!(
            tree.resolve(&TreePath::parse("/Passwords/Bank/notes").unwrap()),
            Err(NodeError::NotFound)
        );
        assert_eq!(tree.file_count(), 2);
    }

    #[test]
    fn test_attribute_order_is_fixed() {
        let entry = Entry::new("Site")
            .with_field("URL", "https://example.com")
            .with_field("Notes", "n")
            .with_field("Password", "p")
            .with_field("UserName", "u")
            .with_field("Custom", "ignored");
        let tree = project(&[Group::new("g").with_entry(entry)], CollisionPolicy::Suffix);

        assert_eq!(
            names(&tree, "/g/Site"),
            ["username", "password", "notes", "url"]
        );
    }

    #[test]
    fn test_empty_title_and_empty_values_skipped() {
        let groups = vec![Group::new("g")
            .with_entry(Entry::new("").with_field("Password", "hidden"))
            .with_entry(Entry::new("Blank").with_field("UserName", ""))];
        let tree = project(&groups, CollisionPolicy::Suffix);

        assert_eq!(names(&tree, "/g"), ["Blank"]);
        assert!(names(&tree, "/g/Blank").is_empty());
        assert_eq!(tree.file_count(), 0);
    }

    #[test]
    fn test_empty_groups_become_directories() {
        let groups = vec![Group::new("outer").with_group(Group::new("inner")), Group::new("")];
        let tree = project(&groups, CollisionPolicy::Suffix);

        assert_eq!(names(&tree, "/"), ["outer", "_"]);
        let inner = tree
            .resolve(&TreePath::parse("/outer/inner").unwrap())
            .unwrap();
        assert_eq!(tree.get_node(inner).unwrap().kind(), NodeKind::Directory);
    }

    #[test]
    fn test_same_named_groups_merge() {
        let groups = vec![
            Group::new("Email").with_entry(Entry::new("Work").with_field("UserName", "w")),
            Group::new("Email").with_entry(Entry::new("Home").with_field("UserName", "h")),
        ];
        let tree = project(&groups, CollisionPolicy::Suffix);

        assert_eq!(names(&tree, "/"), ["Email"]);
        assert_eq!(names(&tree, "/Email"), ["Work", "Home"]);
    }

    #[test]
    fn test_suffix_policy_separates_entries() {
        let groups = vec![Group::new("g")
            .with_entry(bank())
            .with_entry(Entry::new("Bank").with_field("UserName", "bob"))];
        let tree = project(&groups, CollisionPolicy::Suffix);

        assert_eq!(names(&tree, "/g"), ["Bank", "Bank (1)"]);
        assert_eq!(read(&tree, "/g/Bank/username"), b"alice");
        assert_eq!(read(&tree, "/g/Bank (1)/username"), b"bob");
    }

    #[test]
    fn test_suffix_policy_keeps_groups_out_of_entries() {
        let groups = vec![
            Group::new("g").with_entry(Entry::new("Sub").with_field("UserName", "entry-user")),
            Group::new("g").with_group(
                Group::new("Sub").with_entry(Entry::new("Inner").with_field("UserName", "inner")),
            ),
        ];
        let tree = project(&groups, CollisionPolicy::Suffix);

        assert_eq!(names(&tree, "/g"), ["Sub", "Sub (1)"]);
        assert_eq!(names(&tree, "/g/Sub"), ["username"]);
        assert_eq!(names(&tree, "/g/Sub (1)"), ["Inner"]);
        assert_eq!(read(&tree, "/g/Sub (1)/Inner/username"), b"inner");
    }

    #[test]
    fn test_suffix_policy_keeps_entries_out_of_groups() {
        let groups = vec![Group::new("g")
            .with_group(Group::new("Bank").with_entry(Entry::new("Card")))
            .with_entry(bank())];
        let tree = project(&groups, CollisionPolicy::Suffix);

        assert_eq!(names(&tree, "/g"), ["Bank", "Bank (1)"]);
        assert_eq!(names(&tree, "/g/Bank"), ["Card"]);
        assert_eq!(read(&tree, "/g/Bank (1)/password"), b"secret123");
    }

    #[test]
    fn test_policy_reuse_rules() {
        use DirRole::{Entry as E, Group as G};

        assert!(CollisionPolicy::Suffix.reuses(G, G));
        assert!(!CollisionPolicy::Suffix.reuses(E, G));
        assert!(!CollisionPolicy::Suffix.reuses(G, E));
        assert!(!CollisionPolicy::Suffix.reuses(E, E));
        assert!(CollisionPolicy::Merge.reuses(E, G));
        assert!(CollisionPolicy::Merge.reuses(E, E));
    }

    #[test]
    fn test_merge_policy_keeps_first_value() {
        let groups = vec![Group::new("g")
            .with_entry(bank())
            .with_entry(
                Entry::new("Bank")
                    .with_field("UserName", "bob")
                    .with_field("URL", "https://bank.example"),
            )];
        let tree = project(&groups, CollisionPolicy::Merge);

        assert_eq!(names(&tree, "/g"), ["Bank"]);
        assert_eq!(read(&tree, "/g/Bank/username"), b"alice");
        assert_eq!(read(&tree, "/g/Bank/url"), b"https://bank.example");
    }

    #[test]
    fn test_entry_times_copied_to_files() {
        use chrono::{TimeZone, Utc};
        use kdfs_vault::Times;

        let modified = Utc.with_ymd_and_hms(2020, 5, 17, 12, 0, 0).unwrap();
        let entry = bank().with_times(Times::at(modified));
        let tree = project(&[Group::new("g").with_entry(entry)], CollisionPolicy::Suffix);

        let id = tree
            .resolve(&TreePath::parse("/g/Bank/password").unwrap())
            .unwrap();
        let attr = tree.get_node(id).unwrap().attr(&Default::default());
        assert_eq!(attr.mtime, SystemTime::from(modified));
        assert_eq!(attr.atime, SystemTime::from(modified));
        assert_eq!(attr.ctime, SystemTime::from(modified));
    }

    #[test]
    fn test_ctime_is_entry_creation() {
        use chrono::{TimeZone, Utc};
        use kdfs_vault::Times;

        let created = Utc.with_ymd_and_hms(2019, 1, 2, 3, 4, 5).unwrap();
        let modified = Utc.with_ymd_and_hms(2021, 6, 7, 8, 9, 10).unwrap();
        let entry = bank().with_times(Times {
            created,
            modified,
            accessed: modified,
        });
        let tree = project(&[Group::new("g").with_entry(entry)], CollisionPolicy::Suffix);

        let id = tree
            .resolve(&TreePath::parse("/g/Bank/username").unwrap())
            .unwrap();
        let attr = tree.get_node(id).unwrap().attr(&Default::default());
        assert_eq!(attr.ctime, SystemTime::from(created));
        assert_eq!(attr.mtime, SystemTime::from(modified));
    }

    #[test]
    fn test_collision_policy_parse() {
        assert_eq!("merge".parse::<CollisionPolicy>().unwrap(), CollisionPolicy::Merge);
        assert_eq!("suffix".parse::<CollisionPolicy>().unwrap(), CollisionPolicy::Suffix);
        assert!("other".parse::<CollisionPolicy>().is_err());
        assert_eq!(CollisionPolicy::default().to_string(), "suffix");
    }
}
