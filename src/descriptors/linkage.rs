//! Dependency ordering for collected descriptor files
//!
//! Files arrive in arbitrary order (bundle order, or whatever a reflection
//! server hands back). The pool only accepts a file once every file it
//! imports has been added, so the collected set is sorted depth-first with
//! dependencies emitted before their dependents.

use crate::error::{BridgeError, Result};
use prost_types::FileDescriptorProto;
use std::collections::HashMap;

/// Visit state of a file during the depth-first walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Collected descriptor files keyed by name, remembering first-seen order
#[derive(Debug, Default, Clone)]
pub struct DescriptorSet {
    order: Vec<String>,
    files: HashMap<String, FileDescriptorProto>,
}

impl DescriptorSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, keeping the first record seen for a given name.
    /// Returns false when the name was already present.
    pub fn insert(&mut self, file: FileDescriptorProto) -> bool {
        let name = file.name().to_string();
        if self.files.contains_key(&name) {
            return false;
        }
        self.order.push(name.clone());
        self.files.insert(name, file);
        true
    }

    /// Insert every file of an iterator, returning how many were new
    pub fn extend<I: IntoIterator<Item = FileDescriptorProto>>(&mut self, files: I) -> usize {
        let mut added = 0;
        for file in files {
            if self.insert(file) {
                added += 1;
            }
        }
        added
    }

    /// Whether a file with this name has been collected
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Number of collected files
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Names of dependencies referenced by collected files but not collected themselves,
    /// in first-referenced order
    pub fn missing_dependencies(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for name in &self.order {
            for dep in &self.files[name].dependency {
                if !self.files.contains_key(dep) && !missing.contains(dep) {
                    missing.push(dep.clone());
                }
            }
        }
        missing
    }

    /// Consume the set, yielding files in first-seen order
    pub fn into_files(self) -> Vec<FileDescriptorProto> {
        let Self { order, mut files } = self;
        order.into_iter().filter_map(|name| files.remove(&name)).collect()
    }

    /// Sort the collected files into linkage order
    pub fn into_linkage_order(self) -> Result<Vec<FileDescriptorProto>> {
        let Self { order, mut files } = self;
        let mut marks: HashMap<String, Mark> = HashMap::with_capacity(order.len());
        let mut sorted_names = Vec::with_capacity(order.len());

        for name in &order {
            let mut path = Vec::new();
            visit(name, &files, &mut marks, &mut path, &mut sorted_names)?;
        }

        Ok(sorted_names
            .into_iter()
            .filter_map(|name| files.remove(&name))
            .collect())
    }
}

fn visit(
    name: &str,
    files: &HashMap<String, FileDescriptorProto>,
    marks: &mut HashMap<String, Mark>,
    path: &mut Vec<String>,
    sorted: &mut Vec<String>,
) -> Result<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            let start = path.iter().position(|p| p == name).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(BridgeError::DependencyCycle { cycle });
        }
        None => {}
    }

    // Callers only pass names that are keys of `files`.
    let file = &files[name];
    marks.insert(name.to_string(), Mark::InProgress);
    path.push(name.to_string());

    for dep in &file.dependency {
        if !files.contains_key(dep) {
            return Err(BridgeError::missing_dependency(name, dep.as_str()));
        }
        visit(dep, files, marks, path, sorted)?;
    }

    path.pop();
    marks.insert(name.to_string(), Mark::Done);
    sorted.push(name.to_string());
    Ok(())
}

/// Sort files into linkage order. Duplicate names keep their first record.
pub fn linkage_order(files: Vec<FileDescriptorProto>) -> Result<Vec<FileDescriptorProto>> {
    let mut set = DescriptorSet::new();
    set.extend(files);
    set.into_linkage_order()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, deps: &[&str]) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    fn names(files: &[FileDescriptorProto]) -> Vec<&str> {
        files.iter().map(|f| f.name()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let ordered = linkage_order(vec![
            file("api.proto", &["types.proto", "common.proto"]),
            file("types.proto", &["common.proto"]),
            file("common.proto", &[]),
        ])
        .unwrap();

        assert_eq!(names(&ordered), vec!["common.proto", "types.proto", "api.proto"]);
    }

    #[test]
    fn test_already_ordered_input_is_stable() {
        let ordered = linkage_order(vec![
            file("a.proto", &[]),
            file("b.proto", &["a.proto"]),
            file("c.proto", &[]),
        ])
        .unwrap();

        assert_eq!(names(&ordered), vec!["a.proto", "b.proto", "c.proto"]);
    }

    #[test]
    fn test_diamond_visits_shared_dependency_once() {
        let ordered = linkage_order(vec![
            file("top.proto", &["left.proto", "right.proto"]),
            file("left.proto", &["base.proto"]),
            file("right.proto", &["base.proto"]),
            file("base.proto", &[]),
        ])
        .unwrap();

        assert_eq!(ordered.len(), 4);
        assert_eq!(ordered[0].name(), "base.proto");
        assert_eq!(ordered[3].name(), "top.proto");
    }

    #[test]
    fn test_missing_dependency_is_reported() {
        let err = linkage_order(vec![file("svc.proto", &["google/protobuf/empty.proto"])])
            .unwrap_err();

        match err {
            BridgeError::MissingDependency { file, dependency } => {
                assert_eq!(file, "svc.proto");
                assert_eq!(dependency, "google/protobuf/empty.proto");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_is_reported() {
        let err = linkage_order(vec![
            file("a.proto", &["b.proto"]),
            file("b.proto", &["c.proto"]),
            file("c.proto", &["a.proto"]),
        ])
        .unwrap_err();

        match err {
            BridgeError::DependencyCycle { cycle } => {
                assert_eq!(cycle, vec!["a.proto", "b.proto", "c.proto", "a.proto"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let err = linkage_order(vec![file("loop.proto", &["loop.proto"])]).unwrap_err();
        assert!(matches!(err, BridgeError::DependencyCycle { .. }));
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let mut set = DescriptorSet::new();
        assert!(set.insert(file("a.proto", &[])));
        assert!(!set.insert(file("a.proto", &["never.proto"])));
        assert_eq!(set.len(), 1);
        assert!(set.missing_dependencies().is_empty());
    }

    #[test]
    fn test_missing_dependencies_listed_once() {
        let mut set = DescriptorSet::new();
        set.extend(vec![
            file("a.proto", &["x.proto", "y.proto"]),
            file("b.proto", &["x.proto"]),
        ]);
        assert_eq!(set.missing_dependencies(), vec!["x.proto", "y.proto"]);
    }
}
