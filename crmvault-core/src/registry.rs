//! Module registry: which tables each CRM module owns, and the orders in which
//! those tables may be cleared and filled without breaking foreign keys.
//!
//! Everything here is plain data. Adding a table means adding it to a module,
//! to both order lists and, if it has no `id` column, to the conflict keys.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Column used as conflict key when a table declares none
pub const DEFAULT_CONFLICT_KEY: &[&str] = &["id"];

/// A named group of tables selected together for backup or restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub tables: &'static [&'static str],
}

/// A declared foreign key: `table.column` references `references.references_column`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
    pub references_column: &'static str,
}

/// A table whose rows point at binary objects in primary storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSource {
    pub table: &'static str,
    /// Column holding the object path
    pub path_column: &'static str,
    /// Column holding the bucket; the primary bucket applies when absent
    pub bucket_column: Option<&'static str>,
}

/// Immutable registry of modules, canonical orders and per-table keys
#[derive(Debug, Clone, Copy)]
pub struct ModuleRegistry {
    pub modules: &'static [ModuleDefinition],
    /// Children before parents
    pub delete_order: &'static [&'static str],
    /// Parents before children
    pub insert_order: &'static [&'static str],
    pub conflict_keys: &'static [(&'static str, &'static [&'static str])],
    pub foreign_keys: &'static [ForeignKey],
    pub attachments: &'static [AttachmentSource],
}

/// Tables split by whether a canonical order covers them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedTables {
    /// Tables in canonical order
    pub ordered: Vec<String>,
    /// Tables missing from the canonical list, sorted by name
    pub unordered: Vec<String>,
}

impl ModuleRegistry {
    /// The CRM's standard registry
    pub fn standard() -> &'static ModuleRegistry {
        &STANDARD_REGISTRY
    }

    /// Look up a module by key
    pub fn module(&self, key: &str) -> Option<&'static ModuleDefinition> {
        self.modules.iter().find(|m| m.key == key)
    }

    /// Keys of every registered module, in declaration order
    pub fn module_keys(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.key.to_string()).collect()
    }

    /// Deduplicated union of the tables owned by the given modules.
    ///
    /// Unknown module keys are ignored; see [`ModuleRegistry::unknown_modules`].
    pub fn resolve_tables<S: AsRef<str>>(&self, module_keys: &[S]) -> BTreeSet<String> {
        module_keys
            .iter()
            .filter_map(|key| self.module(key.as_ref()))
            .flat_map(|module| module.tables.iter())
            .map(|table| table.to_string())
            .collect()
    }

    /// Module keys the registry does not know
    pub fn unknown_modules<S: AsRef<str>>(&self, module_keys: &[S]) -> Vec<String> {
        module_keys
            .iter()
            .map(|key| key.as_ref())
            .filter(|key| self.module(key).is_none())
            .map(str::to_string)
            .collect()
    }

    /// Every table any module owns
    pub fn all_tables(&self) -> BTreeSet<String> {
        self.resolve_tables(&self.module_keys())
    }

    /// Whether some module owns this table
    pub fn is_registered(&self, table: &str) -> bool {
        self.modules.iter().any(|m| m.tables.iter().any(|t| *t == table))
    }

    /// Columns identifying "the same row" for upserts
    pub fn conflict_key(&self, table: &str) -> &'static [&'static str] {
        self.conflict_keys
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, key)| *key)
            .unwrap_or(DEFAULT_CONFLICT_KEY)
    }

    /// Column used in the non-null predicate of a full-table delete
    pub fn delete_guard_column(&self, table: &str) -> &'static str {
        self.conflict_key(table)
            .first()
            .copied()
            .unwrap_or("id")
    }

    /// Attachment source declared for a table
    pub fn attachment_source(&self, table: &str) -> Option<&'static AttachmentSource> {
        self.attachments.iter().find(|a| a.table == table)
    }

    /// Tables that reference binary objects
    pub fn attachment_tables(&self) -> BTreeSet<String> {
        self.attachments.iter().map(|a| a.table.to_string()).collect()
    }

    /// Order tables for deletion (children first)
    pub fn delete_sequence<'a, I>(&self, tables: I) -> OrderedTables
    where
        I: IntoIterator<Item = &'a String>,
    {
        order_by(self.delete_order, tables)
    }

    /// Order tables for writing (parents first)
    pub fn insert_sequence<'a, I>(&self, tables: I) -> OrderedTables
    where
        I: IntoIterator<Item = &'a String>,
    {
        order_by(self.insert_order, tables)
    }

    /// Check the registry's own invariants, returning every violation found
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut problems = Vec::new();
        let owned = self.all_tables();

        let mut seen_owner: HashMap<&str, &str> = HashMap::new();
        for module in self.modules {
            for table in module.tables {
                if let Some(previous) = seen_owner.insert(*table, module.key) {
                    problems.push(format!(
                        "table '{}' owned by both '{}' and '{}'",
                        table, previous, module.key
                    ));
                }
            }
        }

        for (name, order) in [("delete", self.delete_order), ("insert", self.insert_order)] {
            let mut seen = HashSet::new();
            for table in order {
                if !seen.insert(*table) {
                    problems.push(format!("table '{}' listed twice in {} order", table, name));
                }
                if !owned.contains(*table) {
                    problems.push(format!("{} order lists unowned table '{}'", name, table));
                }
            }
            for table in &owned {
                if !seen.contains(table.as_str()) {
                    problems.push(format!("table '{}' missing from {} order", table, name));
                }
            }
        }

        let position = |order: &[&str], table: &str| order.iter().position(|t| *t == table);
        for fk in self.foreign_keys {
            if fk.table == fk.references {
                continue;
            }
            if let (Some(child), Some(parent)) = (
                position(self.delete_order, fk.table),
                position(self.delete_order, fk.references),
            ) {
                if child > parent {
                    problems.push(format!(
                        "delete order clears '{}' before its child '{}'",
                        fk.references, fk.table
                    ));
                }
            }
            if let (Some(child), Some(parent)) = (
                position(self.insert_order, fk.table),
                position(self.insert_order, fk.references),
            ) {
                if child < parent {
                    problems.push(format!(
                        "insert order fills '{}' before its parent '{}'",
                        fk.table, fk.references
                    ));
                }
            }
        }

        for (table, _) in self.conflict_keys {
            if !owned.contains(*table) {
                problems.push(format!("conflict key declared for unowned table '{}'", table));
            }
        }
        for source in self.attachments {
            if !owned.contains(source.table) {
                problems.push(format!(
                    "attachment source declared for unowned table '{}'",
                    source.table
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

fn order_by<'a, I>(canonical: &[&str], tables: I) -> OrderedTables
where
    I: IntoIterator<Item = &'a String>,
{
    let wanted: BTreeSet<&str> = tables.into_iter().map(String::as_str).collect();
    let ordered: Vec<String> = canonical
        .iter()
        .filter(|t| wanted.contains(*t))
        .map(|t| t.to_string())
        .collect();
    let unordered = wanted
        .iter()
        .filter(|t| !canonical.iter().any(|c| c == *t))
        .map(|t| t.to_string())
        .collect();
    OrderedTables { ordered, unordered }
}

static STANDARD_REGISTRY: ModuleRegistry = ModuleRegistry {
    modules: &[
        ModuleDefinition {
            key: "users",
            label: "Users & Roles",
            tables: &["profiles", "roles", "user_roles"],
        },
        ModuleDefinition {
            key: "settings",
            label: "Settings & Lookups",
            tables: &["lead_sources", "lead_statuses", "app_settings"],
        },
        ModuleDefinition {
            key: "leads",
            label: "Leads",
            tables: &["leads", "lead_notes", "lead_activities", "lead_attachments"],
        },
        ModuleDefinition {
            key: "tasks",
            label: "Tasks",
            tables: &["tasks", "task_comments", "task_attachments"],
        },
        ModuleDefinition {
            key: "quotations",
            label: "Quotations",
            tables: &["quotations", "quotation_items"],
        },
        ModuleDefinition {
            key: "calendar",
            label: "Calendar",
            tables: &["calendar_events", "event_attendees"],
        },
        ModuleDefinition {
            key: "notifications",
            label: "Notifications",
            tables: &["notifications"],
        },
    ],
    delete_order: &[
        "notifications",
        "event_attendees",
        "calendar_events",
        "quotation_items",
        "quotations",
        "task_attachments",
        "task_comments",
        "tasks",
        "lead_attachments",
        "lead_activities",
        "lead_notes",
        "leads",
        "app_settings",
        "lead_statuses",
        "lead_sources",
        "user_roles",
        "roles",
        "profiles",
    ],
    insert_order: &[
        "profiles",
        "roles",
        "user_roles",
        "lead_sources",
        "lead_statuses",
        "app_settings",
        "leads",
        "lead_notes",
        "lead_activities",
        "lead_attachments",
        "tasks",
        "task_comments",
        "task_attachments",
        "quotations",
        "quotation_items",
        "calendar_events",
        "event_attendees",
        "notifications",
    ],
    conflict_keys: &[
        ("user_roles", &["user_id", "role_id"]),
        ("event_attendees", &["event_id", "profile_id"]),
        ("app_settings", &["key"]),
    ],
    foreign_keys: &[
        fk("user_roles", "user_id", "profiles"),
        fk("user_roles", "role_id", "roles"),
        fk("leads", "owner_id", "profiles"),
        fk("leads", "source_id", "lead_sources"),
        fk("leads", "status_id", "lead_statuses"),
        fk("lead_notes", "lead_id", "leads"),
        fk("lead_notes", "author_id", "profiles"),
        fk("lead_activities", "lead_id", "leads"),
        fk("lead_attachments", "lead_id", "leads"),
        fk("lead_attachments", "uploaded_by", "profiles"),
        fk("tasks", "lead_id", "leads"),
        fk("tasks", "assignee_id", "profiles"),
        fk("task_comments", "task_id", "tasks"),
        fk("task_comments", "author_id", "profiles"),
        fk("task_attachments", "task_id", "tasks"),
        fk("quotations", "lead_id", "leads"),
        fk("quotations", "created_by", "profiles"),
        fk("quotation_items", "quotation_id", "quotations"),
        fk("calendar_events", "owner_id", "profiles"),
        fk("calendar_events", "lead_id", "leads"),
        fk("calendar_events", "task_id", "tasks"),
        fk("event_attendees", "event_id", "calendar_events"),
        fk("event_attendees", "profile_id", "profiles"),
        fk("notifications", "user_id", "profiles"),
    ],
    attachments: &[
        AttachmentSource {
            table: "lead_attachments",
            path_column: "file_path",
            bucket_column: Some("bucket"),
        },
        AttachmentSource {
            table: "task_attachments",
            path_column: "file_path",
            bucket_column: Some("bucket"),
        },
    ],
};

/// Foreign key onto the parent's `id` column
pub const fn fk(
    table: &'static str,
    column: &'static str,
    references: &'static str,
) -> ForeignKey {
    ForeignKey {
        table,
        column,
        references,
        references_column: "id",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_is_consistent() {
        let registry = ModuleRegistry::standard();
        assert_eq!(registry.validate(), Ok(()));
    }

    #[test]
    fn test_resolve_tables_for_single_module() {
        let registry = ModuleRegistry::standard();
        let tables = registry.resolve_tables(&["tasks"]);
        let expected: BTreeSet<String> = ["tasks", "task_comments", "task_attachments"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(tables, expected);
    }

    #[test]
    fn test_resolve_tables_has_no_duplicates_and_only_declared_tables() {
        let registry = ModuleRegistry::standard();
        let keys = registry.module_keys();

        // every prefix and suffix of the module list, with repeats
        for i in 0..keys.len() {
            let mut selection: Vec<String> = keys[..=i].to_vec();
            selection.extend(keys[i..].iter().cloned());
            selection.push(keys[0].clone());

            let tables = registry.resolve_tables(&selection);
            let declared: usize = {
                let unique: BTreeSet<&String> = selection.iter().collect();
                unique
                    .iter()
                    .map(|k| registry.module(k).map(|m| m.tables.len()).unwrap_or(0))
                    .sum()
            };
            assert_eq!(tables.len(), declared);

            for table in &tables {
                assert!(selection.iter().any(|key| {
                    registry
                        .module(key)
                        .map(|m| m.tables.contains(&table.as_str()))
                        .unwrap_or(false)
                }));
            }
        }
    }

    #[test]
    fn test_unknown_modules_are_ignored_but_reported() {
        let registry = ModuleRegistry::standard();
        let tables = registry.resolve_tables(&["leads", "invoices"]);
        assert!(tables.contains("leads"));
        assert_eq!(tables.len(), 4);
        assert_eq!(registry.unknown_modules(&["leads", "invoices"]), vec!["invoices"]);
    }

    #[test]
    fn test_conflict_keys() {
        let registry = ModuleRegistry::standard();
        assert_eq!(registry.conflict_key("leads"), &["id"]);
        assert_eq!(registry.conflict_key("user_roles"), &["user_id", "role_id"]);
        assert_eq!(registry.delete_guard_column("app_settings"), "key");
        assert_eq!(registry.delete_guard_column("tasks"), "id");
    }

    #[test]
    fn test_sequences_respect_canonical_order() {
        let registry = ModuleRegistry::standard();
        let tables = registry.resolve_tables(&["tasks", "leads"]);

        let deletes = registry.delete_sequence(&tables);
        assert!(deletes.unordered.is_empty());
        let tasks_at = deletes.ordered.iter().position(|t| t == "tasks").unwrap();
        let leads_at = deletes.ordered.iter().position(|t| t == "leads").unwrap();
        assert!(tasks_at < leads_at);

        let inserts = registry.insert_sequence(&tables);
        let tasks_at = inserts.ordered.iter().position(|t| t == "tasks").unwrap();
        let leads_at = inserts.ordered.iter().position(|t| t == "leads").unwrap();
        assert!(leads_at < tasks_at);
    }

    #[test]
    fn test_unordered_tables_are_split_out() {
        let registry = ModuleRegistry::standard();
        let tables: Vec<String> = vec!["leads".into(), "legacy_imports".into()];
        let sequence = registry.insert_sequence(&tables);
        assert_eq!(sequence.ordered, vec!["leads"]);
        assert_eq!(sequence.unordered, vec!["legacy_imports"]);
    }

    #[test]
    fn test_validate_reports_broken_orders() {
        static BROKEN: ModuleRegistry = ModuleRegistry {
            modules: &[ModuleDefinition {
                key: "m",
                label: "M",
                tables: &["parent", "child", "orphan"],
            }],
            delete_order: &["parent", "child"],
            insert_order: &["child", "parent", "orphan"],
            conflict_keys: &[],
            foreign_keys: &[fk("child", "parent_id", "parent")],
            attachments: &[],
        };

        let problems = BROKEN.validate().unwrap_err();
        assert!(problems.iter().any(|p| p.contains("missing from delete order")));
        assert!(problems.iter().any(|p| p.contains("delete order clears 'parent'")));
        assert!(problems.iter().any(|p| p.contains("insert order fills 'child'")));
    }

    #[test]
    fn test_attachment_sources() {
        let registry = ModuleRegistry::standard();
        let tables = registry.attachment_tables();
        assert!(tables.contains("lead_attachments"));
        assert!(tables.contains("task_attachments"));
        let source = registry.attachment_source("task_attachments").unwrap();
        assert_eq!(source.path_column, "file_path");
        assert!(registry.attachment_source("tasks").is_none());
    }
}
