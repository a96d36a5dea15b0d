use comic_core::{Drive, Event, Kind, Server, event::tag};
use comic_drive::{build_tree, edit, get_node_by_path, render_tree};

fn drive_event() -> Event {
    let sha = |c: char| c.to_string().repeat(64);
    Event {
        id: "e1".into(),
        pubkey: "pk".into(),
        created_at: 100,
        kind: Kind::BLOSSOM_DRIVE,
        tags: vec![
            tag(["name", "Hero"]),
            tag(["d", "hero"]),
            tag(["server", "https://blossom.example.com"]),
            tag(["folder", "/sad"]),
            tag(["x", sha('a').as_str(), "/happy/smile.svg", "120", "image/svg+xml"]),
            tag(["x", sha('b').as_str(), "/happy/laugh.svg", "80", "image/svg+xml"]),
            tag(["emotion", "smile", "grin"]),
        ],
        content: String::new(),
        sig: String::new(),
    }
}

#[test]
fn edits_survive_publishing() {
    let drive = Drive::from_event(&drive_event());
    let root = build_tree(&drive);
    assert!(render_tree(&root).starts_with("Hero/ [drive]\n"));

    let laugh = get_node_by_path(&root, "/happy/laugh.svg").unwrap();
    let sad = get_node_by_path(&root, "/sad").unwrap();
    let moved = edit::drop_onto(&drive, &root, laugh, sad).unwrap();

    let root = build_tree(&moved.drive);
    let happy = get_node_by_path(&root, "/happy").unwrap();
    let deleted = edit::delete(&moved.drive, happy).unwrap();
    assert_eq!(deleted.removed_blobs, vec!["a".repeat(64)]);

    let servers = vec![Server::new("https://blossom.example.com")];
    let unsigned = deleted.drive.to_unsigned_event("pk", &servers, 200);
    assert_eq!(unsigned.kind, Kind::BLOSSOM_DRIVE);

    let event = Event {
        id: unsigned.compute_id().to_hex(),
        pubkey: unsigned.pubkey.clone(),
        created_at: unsigned.created_at,
        kind: unsigned.kind,
        tags: unsigned.tags.clone(),
        content: unsigned.content.clone(),
        sig: String::new(),
    };
    let reparsed = Drive::from_event(&event);
    let paths: Vec<_> = reparsed.x.iter().map(|x| x.path.as_str()).collect();
    assert_eq!(paths, vec!["/sad/laugh.svg"]);
    assert_eq!(reparsed.folders, Vec::<String>::new());
    assert_eq!(reparsed.emotions.len(), 1);
}
