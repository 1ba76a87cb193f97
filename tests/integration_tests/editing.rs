use std::{fs, io};

use discedit::materialize::materialize;
use discedit::{DiscTree, EditSession};
use tempfile::tempdir;

#[test]
fn test_import_directory_mirrors_host_tree() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let host = temp_dir.path().join("payload");
    fs::create_dir_all(host.join("nested"))?;
    fs::write(host.join("top.txt"), b"top level")?;
    fs::write(host.join("nested").join("deep.txt"), b"nested file")?;

    let mut session = EditSession::default();
    let root = session.root();
    let imported = session.import_directory(&host, root)?.unwrap();

    let tree = session.tree();
    assert_eq!(tree.children(root), &[imported]);
    assert_eq!(tree.get(imported).unwrap().name(), "payload");
    let children = tree.children(imported);
    assert_eq!(children.len(), 2);

    let files: Vec<_> = children.iter().filter(|&&c| !tree.is_directory(c)).collect();
    let dirs: Vec<_> = children.iter().filter(|&&c| tree.is_directory(c)).collect();
    assert_eq!(files.len(), 1);
    assert_eq!(dirs.len(), 1);

    let nested = *dirs[0];
    assert_eq!(tree.children(nested).len(), 1);
    let deep = tree.get(tree.children(nested)[0]).unwrap();
    assert_eq!(deep.name(), "deep.txt");
    assert!(!deep.is_directory());
    assert_eq!(tree.read_data(tree.children(nested)[0])?, b"nested file");
    assert!(session.is_modified());
    Ok(())
}

#[test]
fn test_second_file_with_same_name_overwrites() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let first = temp_dir.path().join("one");
    let second = temp_dir.path().join("two");
    fs::create_dir_all(&first)?;
    fs::create_dir_all(&second)?;
    fs::write(first.join("X"), b"1")?;
    fs::write(second.join("X"), b"22222")?;

    let mut session = EditSession::default();
    let root = session.root();
    session.add_file(&first.join("X"), root)?;
    session.add_file(&second.join("X"), root)?;

    let tree = session.tree();
    assert_eq!(tree.children(root).len(), 1);
    let node = tree.get(tree.children(root)[0]).unwrap();
    assert_eq!(node.name(), "X");
    assert_eq!(node.size(), 5);
    Ok(())
}

#[test]
fn test_duplicate_folder_leaves_one_child() {
    let mut session = EditSession::default();
    let root = session.root();
    assert!(session.add_folder("Docs", root).is_some());
    assert!(session.add_folder("docs", root).is_none());
    assert_eq!(session.tree().children(root).len(), 1);
}

#[test]
fn test_remove_subtree_and_root() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let host = temp_dir.path().join("bundle");
    fs::create_dir_all(host.join("a").join("b"))?;
    fs::write(host.join("a").join("b").join("c.txt"), b"c")?;
    fs::write(host.join("d.txt"), b"d")?;

    let mut session = EditSession::default();
    let root = session.root();
    let keep = session.add_folder("keep", root).unwrap();
    let bundle = session.import_directory(&host, root)?.unwrap();
    assert_eq!(session.tree().descendant_count(root), 6);

    assert!(session.remove(bundle));
    assert_eq!(session.tree().descendant_count(root), 1);
    assert_eq!(session.tree().children(root), &[keep]);

    assert!(!session.remove(root));
    assert!(session.tree().contains(root));
    Ok(())
}

#[test]
fn test_pending_tree_round_trip() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let host = temp_dir.path().join("site");
    fs::create_dir_all(host.join("css"))?;
    fs::create_dir_all(host.join("img").join("icons"))?;
    let files: [(&str, Vec<u8>); 3] = [
        ("index.html", b"<html></html>".to_vec()),
        ("css/site.css", b"body { margin: 0 }".to_vec()),
        ("img/icons/logo.bin", (0..5000u32).map(|i| (i * 7 % 256) as u8).collect()),
    ];
    for (rel, content) in &files {
        fs::write(host.join(rel), content)?;
    }

    let mut session = EditSession::default();
    let root = session.root();
    session.import_directory(&host, root)?.unwrap();

    let staging = tempdir()?;
    materialize(session.tree(), staging.path())?;
    for (rel, content) in &files {
        assert_eq!(&fs::read(staging.path().join("site").join(rel))?, content);
    }
    assert!(staging.path().join("site/img/icons").is_dir());
    Ok(())
}

#[test]
fn test_fresh_tree_is_root_only() {
    let tree = DiscTree::new();
    assert!(tree.children(tree.root()).is_empty());
    assert!(!tree.is_modified());
    assert_eq!(tree.parent(tree.root()), None);
}
