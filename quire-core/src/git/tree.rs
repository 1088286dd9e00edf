//! Tree editing directly in the object database.
//!
//! The repository is bare, so every change is expressed as a new tree built
//! from the parent commit's tree. Paths are `/`-separated and already
//! validated by the caller.

use git2::{ErrorCode, ObjectType, Oid, Repository, Tree, TreeWalkMode, TreeWalkResult};

use crate::error::StorageError;
use crate::model::ListEntry;

const FILE_MODE: i32 = 0o100644;
const DIR_MODE: i32 = 0o040000;

/// Blob id at `path`, or `None` if the path is absent or not a file.
pub(crate) fn blob_id(tree: &Tree, path: &str) -> Result<Option<Oid>, git2::Error> {
    match tree.get_path(std::path::Path::new(path)) {
        Ok(entry) if entry.kind() == Some(ObjectType::Blob) => Ok(Some(entry.id())),
        Ok(_) => Ok(None),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Raw bytes of the file at `path`.
pub(crate) fn read_blob(
    repo: &Repository,
    tree: &Tree,
    path: &str,
) -> Result<Option<Vec<u8>>, git2::Error> {
    match blob_id(tree, path)? {
        Some(id) => Ok(Some(repo.find_blob(id)?.content().to_vec())),
        None => Ok(None),
    }
}

fn subtree<'r>(
    repo: &'r Repository,
    tree: Option<&Tree>,
    name: &str,
) -> Result<Option<Tree<'r>>, git2::Error> {
    match tree.and_then(|t| t.get_name(name)) {
        Some(entry) if entry.kind() == Some(ObjectType::Tree) => {
            Ok(Some(repo.find_tree(entry.id())?))
        }
        _ => Ok(None),
    }
}

fn entry_kind(tree: Option<&Tree>, name: &str) -> Option<ObjectType> {
    tree.and_then(|t| t.get_name(name)).and_then(|entry| entry.kind())
}

/// Writes a tree equal to `tree` with `blob` stored at `components`.
/// Replacing a file with a directory, or a directory with a file, is a
/// conflict.
pub(crate) fn upsert(
    repo: &Repository,
    tree: Option<&Tree>,
    components: &[&str],
    blob: Oid,
) -> Result<Oid, StorageError> {
    if components.is_empty() {
        return Err(git2::Error::from_str("cannot write an empty path").into());
    }
    upsert_at(repo, tree, components, 0, blob)
}

fn upsert_at(
    repo: &Repository,
    tree: Option<&Tree>,
    components: &[&str],
    depth: usize,
    blob: Oid,
) -> Result<Oid, StorageError> {
    let name = components[depth];
    let is_leaf = depth + 1 == components.len();
    let mut builder = repo.treebuilder(tree)?;

    match (entry_kind(tree, name), is_leaf) {
        (Some(ObjectType::Tree), true) => {
            return Err(StorageError::conflict(
                components.join("/"),
                "a directory already exists at this path",
            ));
        }
        (Some(ObjectType::Blob), false) => {
            return Err(StorageError::conflict(
                components.join("/"),
                format!("{} is a file", components[..=depth].join("/")),
            ));
        }
        _ => {}
    }

    if is_leaf {
        builder.insert(name, blob, FILE_MODE)?;
    } else {
        let child = subtree(repo, tree, name)?;
        let child_oid = upsert_at(repo, child.as_ref(), components, depth + 1, blob)?;
        builder.insert(name, child_oid, DIR_MODE)?;
    }

    Ok(builder.write()?)
}

/// Writes a tree equal to `tree` without the entry at `components`.
/// Directories left empty are pruned.
pub(crate) fn remove(
    repo: &Repository,
    tree: &Tree,
    components: &[&str],
) -> Result<Oid, git2::Error> {
    let Some((name, rest)) = components.split_first() else {
        return Err(git2::Error::from_str("cannot remove an empty path"));
    };
    let mut builder = repo.treebuilder(Some(tree))?;

    if rest.is_empty() {
        builder.remove(name)?;
    } else if let Some(child) = subtree(repo, Some(tree), name)? {
        let child_oid = remove(repo, &child, rest)?;
        if repo.find_tree(child_oid)?.is_empty() {
            builder.remove(name)?;
        } else {
            builder.insert(name, child_oid, DIR_MODE)?;
        }
    }

    builder.write()
}

/// Immediate children of `dir` (empty string for the root).
pub(crate) fn list_dir(
    repo: &Repository,
    tree: &Tree,
    dir: &str,
) -> Result<Vec<ListEntry>, git2::Error> {
    let target = if dir.is_empty() {
        tree.clone()
    } else {
        match tree.get_path(std::path::Path::new(dir)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Tree) => repo.find_tree(entry.id())?,
            Ok(_) => return Ok(Vec::new()),
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
    };

    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    };

    Ok(target
        .iter()
        .filter_map(|entry| {
            let path = format!("{}{}", prefix, entry.name()?);
            match entry.kind() {
                Some(ObjectType::Tree) => Some(ListEntry::dir(path)),
                Some(ObjectType::Blob) => Some(ListEntry::file(path)),
                _ => None,
            }
        })
        .collect())
}

/// Every file path in `tree`, depth-first.
pub(crate) fn file_paths(tree: &Tree) -> Result<Vec<String>, git2::Error> {
    let mut paths = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            if let Some(name) = entry.name() {
                paths.push(format!("{}{}", root, name));
            }
        }
        TreeWalkResult::Ok
    })?;
    Ok(paths)
}
