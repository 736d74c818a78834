//! Folder tree queries.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::types::{FileRecord, Folder, Item};

fn children_index(folders: &[Folder]) -> HashMap<&str, Vec<&str>> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for folder in folders {
        if let Some(parent) = folder.parent_id.as_deref() {
            children.entry(parent).or_default().push(folder.id.as_str());
        }
    }
    children
}

/// Descendants of `root`, children before their parents. `root` excluded.
pub(crate) fn descendants_post_order(folders: &[Folder], root: &str) -> Vec<String> {
    let children = children_index(folders);
    let mut seen = HashSet::from([root]);
    let mut stack = vec![root];
    let mut pre_order = Vec::new();
    while let Some(id) = stack.pop() {
        for &child in children.get(id).into_iter().flatten() {
            if seen.insert(child) {
                pre_order.push(child);
                stack.push(child);
            }
        }
    }
    // Every folder is pushed after its parent, so the reverse lists
    // children first.
    pre_order.into_iter().rev().map(str::to_string).collect()
}

/// Whether `ancestor` is `folder` or lies on its parent chain.
pub(crate) fn is_self_or_ancestor(folders: &[Folder], ancestor: &str, folder: &str) -> bool {
    let mut current = Some(folder);
    let mut seen = HashSet::new();
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        if !seen.insert(id) {
            return false;
        }
        current = folders
            .iter()
            .find(|f| f.id == id)
            .and_then(|f| f.parent_id.as_deref());
    }
    false
}

/// Folders from the root down to `id`. Empty for an unknown id.
pub(crate) fn folder_path(folders: &[Folder], id: &str) -> Vec<Folder> {
    let by_id: HashMap<&str, &Folder> = folders.iter().map(|f| (f.id.as_str(), f)).collect();
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut current = by_id.get(id).copied();
    while let Some(folder) = current {
        if !seen.insert(folder.id.as_str()) {
            break;
        }
        path.push(folder.clone());
        current = folder
            .parent_id
            .as_deref()
            .and_then(|parent| by_id.get(parent).copied());
    }
    path.reverse();
    path
}

struct SizeIndex<'a> {
    direct: HashMap<&'a str, u64>,
    children: HashMap<&'a str, Vec<&'a str>>,
    totals: HashMap<&'a str, u64>,
    in_progress: HashSet<&'a str>,
}

impl<'a> SizeIndex<'a> {
    /// Subtree total of `root`, memoising every folder below it.
    ///
    /// A folder reached again while still open (a parent cycle) counts as 0.
    fn total(&mut self, root: &'a str) -> u64 {
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.totals.contains_key(id) {
                continue;
            }
            if expanded {
                let children = self.children.get(id).map(Vec::as_slice).unwrap_or_default();
                let total = self.direct.get(id).copied().unwrap_or(0)
                    + children
                        .iter()
                        .filter_map(|child| self.totals.get(child))
                        .sum::<u64>();
                self.in_progress.remove(id);
                self.totals.insert(id, total);
                continue;
            }
            if !self.in_progress.insert(id) {
                continue;
            }
            stack.push((id, true));
            for &child in self.children.get(id).into_iter().flatten() {
                if !self.totals.contains_key(child) && !self.in_progress.contains(child) {
                    stack.push((child, false));
                }
            }
        }
        self.totals.get(root).copied().unwrap_or(0)
    }
}

/// Total attachment bytes per folder, descendants included.
///
/// Each folder subtree is summed once.
pub(crate) fn folder_sizes(
    folders: &[Folder],
    items: &[Item],
    files: &[FileRecord],
) -> BTreeMap<String, u64> {
    let mut item_bytes: HashMap<&str, u64> = HashMap::new();
    for file in files {
        *item_bytes.entry(file.item_id.as_str()).or_default() += file.size;
    }

    let mut direct: HashMap<&str, u64> = HashMap::new();
    for item in items {
        if let Some(folder) = item.folder_id.as_deref() {
            *direct.entry(folder).or_default() +=
                item_bytes.get(item.id.as_str()).copied().unwrap_or(0);
        }
    }

    let mut index = SizeIndex {
        direct,
        children: children_index(folders),
        totals: HashMap::new(),
        in_progress: HashSet::new(),
    };
    folders
        .iter()
        .map(|folder| (folder.id.clone(), index.total(folder.id.as_str())))
        .collect()
}
