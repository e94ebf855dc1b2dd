use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use trellis_hierarchy::{
    compare_siblings, Hierarchy, HierarchyEvents, ItemId, Node, ObserverResult, Project,
    ProjectDocument,
};

#[derive(Default)]
struct Counts {
    added: usize,
    deleted: Vec<ItemId>,
    invalidated: Vec<ItemId>,
}

struct Counter(Rc<RefCell<Counts>>);

impl HierarchyEvents for Counter {
    fn on_item_added(&mut self, _parent: ItemId, _previous: ItemId, _added: ItemId) -> ObserverResult {
        self.0.borrow_mut().added += 1;
        Ok(())
    }

    fn on_item_deleted(&mut self, item: ItemId) -> ObserverResult {
        self.0.borrow_mut().deleted.push(item);
        Ok(())
    }

    fn on_invalidate_items(&mut self, parent: ItemId) -> ObserverResult {
        self.0.borrow_mut().invalidated.push(parent);
        Ok(())
    }
}

fn assert_sorted(tree: &Hierarchy, parent: ItemId) {
    let children: Vec<_> = tree.children(parent).collect();
    for pair in children.windows(2) {
        let left = tree.node(pair[0]).expect("live child");
        let right = tree.node(pair[1]).expect("live child");
        assert_ne!(
            compare_siblings(left, right),
            Ordering::Greater,
            "{:?} sorted after {:?}",
            left.caption(),
            right.caption()
        );
    }
    for child in children {
        assert_sorted(tree, child);
    }
}

#[test]
fn siblings_stay_sorted_through_mixed_mutations() {
    let mut tree = Hierarchy::new("/repo/app/app.proj", "app");
    let refs = tree
        .add_child(ItemId::ROOT, Node::reference_folder("References"))
        .expect("references folder");
    let mut live: Vec<(ItemId, ItemId)> = Vec::new();
    let names = ["delta", "Alpha", "charlie", "bravo", "Echo", "alpha2", "zulu", "Mike"];
    let mut seed: u32 = 17;
    for step in 0..60 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let name = names[(seed >> 16) as usize % names.len()];
        match step % 5 {
            0 | 1 => {
                let id = tree
                    .add_child(ItemId::ROOT, Node::file(format!("{name}{step}.cs")))
                    .expect("add file");
                live.push((ItemId::ROOT, id));
            }
            2 => {
                let id = tree
                    .add_child(ItemId::ROOT, Node::folder(format!("{name}{step}")))
                    .expect("add folder");
                live.push((ItemId::ROOT, id));
            }
            3 => {
                let id = tree
                    .add_child(refs, Node::reference(format!("{name}.Lib{step}")))
                    .expect("add reference");
                live.push((refs, id));
            }
            _ => {
                if !live.is_empty() {
                    let index = (seed as usize) % live.len();
                    let (parent, id) = live.swap_remove(index);
                    tree.remove_child(parent, id).expect("remove");
                }
            }
        }
        assert_sorted(&tree, ItemId::ROOT);
    }
    assert_eq!(tree.len(), live.len() + 1);
}

#[test]
fn example_scenario_insert_and_recursive_remove() {
    let mut tree = Hierarchy::new("/repo/app/app.proj", "app");
    let counts = Rc::new(RefCell::new(Counts::default()));
    tree.advise(Box::new(Counter(counts.clone())));

    let src = tree.add_child(ItemId::ROOT, Node::folder("src")).expect("src");
    let a = tree.add_child(src, Node::file("src/a.cs")).expect("a");
    let b = tree.add_child(src, Node::file("src/d.cs")).expect("d");
    let c = tree.add_child(src, Node::file("src/c.cs")).expect("c");
    assert_eq!(tree.children(src).collect::<Vec<_>>(), vec![a, c, b]);

    tree.remove_child(ItemId::ROOT, src).expect("remove folder");

    let counts = counts.borrow();
    assert_eq!(counts.added, 4);
    assert_eq!(counts.deleted.len(), 4);
    for id in [src, a, b, c] {
        assert!(counts.deleted.contains(&id));
        assert!(!tree.contains(id));
    }
    assert_eq!(counts.invalidated, vec![ItemId::ROOT]);
}

#[test]
fn every_reachable_node_round_trips_through_its_full_path() {
    let xml = r#"
<Project Name="round">
  <File RelPath="a/b/c/deep.cs" BuildAction="Compile"/>
  <File RelPath="a/top.cs" BuildAction="Compile"/>
  <File RelPath="../outside/linked.cs" BuildAction="Compile" LinkedIntoProjectAt="linked.cs"/>
  <Folder RelPath="empty"/>
  <Reference Name="Lib" HintPath="../lib/Lib.dll"/>
  <Reference Name="System"/>
</Project>
"#;
    let doc = ProjectDocument::from_xml(xml).expect("parse");
    let project = Project::from_document("/repo/round/round.proj".into(), doc).expect("load");
    let tree = project.tree();
    let all = tree.subtree(ItemId::ROOT);
    assert_eq!(all.len(), tree.len() + 1);
    for id in all {
        let path = tree.full_path(id).expect("full path");
        assert_eq!(tree.find_by_path(ItemId::ROOT, &path), Some(id), "{path:?}");
    }
}

#[test]
fn path_search_stays_inside_the_start_subtree() {
    let mut tree = Hierarchy::new("/repo/app/app.proj", "app");
    let a = tree
        .add_child(ItemId::ROOT, Node::folder("a"))
        .expect("folder a");
    let b = tree
        .add_child(ItemId::ROOT, Node::folder("b"))
        .expect("folder b");
    let inner = tree
        .add_child(a, Node::file("a/inner.cs"))
        .expect("file in a");
    let x = tree.add_child(b, Node::file("b/x.cs")).expect("file in b");

    let target = std::path::Path::new("/repo/app/b/x.cs");
    assert_eq!(tree.find_by_path(a, target), None);
    assert_eq!(tree.find_by_path(b, target), Some(x));
    assert_eq!(tree.find_by_path(ItemId::ROOT, target), Some(x));

    let own = tree.full_path(a).expect("path of a");
    assert_eq!(tree.find_by_path(a, &own), Some(a));
    assert_eq!(
        tree.find_by_path(a, std::path::Path::new("/repo/app/a/inner.cs")),
        Some(inner)
    );
    assert_eq!(tree.find_by_path(inner, target), None);
}
