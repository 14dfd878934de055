mod common;

use common::{connect, v3, Kind, MockPeer, PeerOptions};
use pretty_assertions::assert_eq;
use sftp_fs_client::{
    client::{
        error::Error,
        fs::{Direction, ListOrder, SortKey},
        Principal, SessionConfig, SessionState,
    },
    extensions,
    protocol::{PacketType, Request, StatusCode},
};

fn names(entries: &[sftp_fs_client::protocol::DirectoryEntry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.filename.as_str()).collect()
}

fn paths_of(peer: &MockPeer, packet_type: PacketType) -> Vec<String> {
    peer.requests()
        .into_iter()
        .filter(|request| request.packet_type() == packet_type)
        .filter_map(|request| match request {
            Request::MkDir(p) | Request::SetStat(p) => Some(p.path),
            Request::Remove(p) | Request::RmDir(p) | Request::OpenDir(p) => Some(p.path),
            Request::Stat(p) | Request::Lstat(p) => Some(p.path),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn recursive_mkdir_creates_every_level() {
    let (peer, mut session) = v3().await;

    session.mkdir("/a/b/c", None, true).await.unwrap();
    assert_eq!(paths_of(&peer, PacketType::MkDir), ["/a", "/a/b", "/a/b/c"]);

    for dir in ["/a", "/a/b", "/a/b/c"] {
        assert!(session.stat(dir).await.unwrap().is_dir(), "{dir}");
    }
}

#[tokio::test]
async fn recursive_mkdir_tolerates_existing_parents() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/x");

    session.mkdir("/x/y", Some(0o700), true).await.unwrap();
    assert_eq!(peer.node("/x/y").unwrap().permissions, 0o700);
    assert_eq!(peer.node("/x").unwrap().permissions, 0o755);

    let error = session.mkdir("/x/y", None, true).await.unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::FileAlreadyExists));
}

#[tokio::test]
async fn mkdir_without_parent_fails() {
    let (_peer, mut session) = v3().await;

    let error = session.mkdir("/p/q", None, false).await.unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::NoSuchFile));
}

#[tokio::test]
async fn recursive_delete_removes_directory_last() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/dir");
    peer.add_file("/dir/file", b"x");
    peer.add_dir("/dir/sub");

    session.delete("/dir", true).await.unwrap();

    let last = peer.requests().pop().unwrap();
    assert!(matches!(&last, Request::RmDir(p) if p.path == "/dir"), "{last:?}");
    assert!(!peer.exists("/dir"));
    assert!(peer.paths_under("/dir").is_empty());
    assert_eq!(paths_of(&peer, PacketType::RmDir), ["/dir/sub", "/dir"]);
}

#[tokio::test]
async fn delete_of_directory_needs_recursive() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/keep");
    peer.add_file("/keep/f", b"");

    let error = session.delete("/keep", false).await.unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::FileIsADirectory));
    assert!(peer.exists("/keep/f"));
}

#[tokio::test]
async fn recursive_delete_of_missing_path_reports_remove_error() {
    let (_peer, mut session) = v3().await;

    let error = session.delete("/ghost", true).await.unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::NoSuchFile));
}

#[tokio::test]
async fn stat_cache_is_invalidated_by_delete() {
    let (peer, mut session) = v3().await;
    peer.add_file("/cached", b"data");

    assert_eq!(session.stat("/cached").await.unwrap().size, Some(4));
    assert_eq!(session.stat("/cached").await.unwrap().size, Some(4));
    assert_eq!(peer.count(PacketType::Stat), 1);

    session.delete("/cached", false).await.unwrap();
    let error = session.stat("/cached").await.unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::NoSuchFile));
    assert_eq!(peer.count(PacketType::Stat), 2);
    assert!(!session.file_exists("/cached").await.unwrap());
}

#[tokio::test]
async fn disabled_cache_always_asks() {
    let peer = MockPeer::new(PeerOptions::default());
    peer.add_file("/f", b"");
    let mut session = connect(&peer, SessionConfig::default().stat_cache(false)).await;

    let _ = session.stat("/f").await.unwrap();
    let _ = session.stat("/f").await.unwrap();
    assert_eq!(peer.count(PacketType::Stat), 2);
}

#[tokio::test]
async fn listing_orders() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/d");
    peer.add_file("/d/b.txt", b"12345");
    peer.add_file("/d/A.txt", b"1");
    peer.add_dir("/d/sub");
    peer.add_dir("/d/Zed");

    let unsorted = session.list("/d").await.unwrap();
    assert_eq!(names(&unsorted), [".", "..", "A.txt", "Zed", "b.txt", "sub"]);

    session.set_list_order(ListOrder::by(SortKey::Filename, Direction::Ascending));
    let sorted = session.list("/d").await.unwrap();
    assert_eq!(names(&sorted), [".", "..", "sub", "Zed", "A.txt", "b.txt"]);

    session.set_list_order(ListOrder::by(SortKey::Size, Direction::Descending));
    let by_size = session.nlist("/d", false).await.unwrap();
    assert_eq!(&by_size[4..], ["b.txt", "A.txt"]);
}

#[tokio::test]
async fn recursive_listing_is_relative_to_root() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/r");
    peer.add_file("/r/a.txt", b"");
    peer.add_dir("/r/s");
    peer.add_file("/r/s/b.txt", b"");
    peer.add_dir("/r/s/t");
    peer.add_file("/r/s/t/c.txt", b"");
    session.set_list_order(ListOrder::by(SortKey::Filename, Direction::Ascending));

    let names = session.nlist("/r", true).await.unwrap();
    assert_eq!(
        names,
        [".", "..", "s", "a.txt", "s/t", "s/b.txt", "s/t/c.txt"]
    );
}

#[tokio::test]
async fn v3_listing_type_comes_from_long_name() {
    let peer = MockPeer::new(PeerOptions {
        untyped_listing: true,
        ..Default::default()
    });
    peer.add_dir("/u");
    peer.add_dir("/u/dir");
    peer.add_file("/u/file", b"");
    peer.add_symlink("/u/link", "file");
    let mut session = connect(&peer, SessionConfig::default()).await;

    let entries = session.list("/u").await.unwrap();
    let find = |name: &str| {
        entries
            .iter()
            .find(|entry| entry.filename == name)
            .unwrap()
            .attrs
            .clone()
    };

    assert_eq!(find("dir").permissions, None);
    assert!(find("dir").is_dir());
    assert!(find("file").is_regular());
    assert!(find("link").is_symlink());
}

#[tokio::test]
async fn chdir_makes_paths_relative() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/work");
    peer.add_file("/plain", b"");

    session.chdir("/work").await.unwrap();
    assert_eq!(session.pwd(), "/work");

    session.put("notes", &b"n"[..], Default::default()).await.unwrap();
    assert!(peer.exists("/work/notes"));
    assert_eq!(session.realpath("../plain").await.unwrap(), "/plain");

    let error = session.chdir("/plain").await.unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::NotADirectory));
    assert_eq!(session.pwd(), "/work");
}

#[tokio::test]
async fn emulated_paths_without_canonicalization() {
    let peer = MockPeer::new(PeerOptions::default());
    peer.add_dir("/e");
    let mut session = connect(&peer, SessionConfig::default().canonicalize_paths(false)).await;
    assert_eq!(peer.count(PacketType::RealPath), 0);

    session.chdir("/e").await.unwrap();
    assert_eq!(session.realpath("x/../y").await.unwrap(), "/e/y");
    assert_eq!(peer.count(PacketType::RealPath), 0);
}

#[tokio::test]
async fn touch_creates_then_updates() {
    let (peer, mut session) = v3().await;

    session.touch("/stamp", Some(1000), None).await.unwrap();
    let node = peer.node("/stamp").unwrap();
    assert_eq!((node.mtime, node.atime), (1000, 1000));
    assert_eq!(node.kind, Kind::File(Vec::new()));

    session.touch("/stamp", Some(2000), Some(1500)).await.unwrap();
    let node = peer.node("/stamp").unwrap();
    assert_eq!((node.mtime, node.atime), (2000, 1500));
    assert_eq!(peer.count(PacketType::SetStat), 1);
}

#[tokio::test]
async fn recursive_chmod_skips_symlinks() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/c");
    peer.add_file("/c/f", b"");
    peer.add_symlink("/c/link", "f");
    peer.add_dir("/c/s");
    peer.add_file("/c/s/g", b"");

    session.chmod("/c", 0o40700, true).await.unwrap();

    for path in ["/c", "/c/f", "/c/s", "/c/s/g"] {
        assert_eq!(peer.node(path).unwrap().permissions, 0o700, "{path}");
    }
    assert_eq!(peer.node("/c/link").unwrap().permissions, 0o644);
    assert_eq!(
        paths_of(&peer, PacketType::SetStat),
        ["/c/f", "/c/s/g", "/c/s", "/c"]
    );
}

#[tokio::test]
async fn chown_by_id_and_name() {
    let (peer, mut session) = v3().await;
    peer.add_file("/owned", b"");

    session.chown("/owned", Principal::Id(42), false).await.unwrap();
    session
        .chgrp("/owned", Principal::Name("7".to_owned()), false)
        .await
        .unwrap();
    let node = peer.node("/owned").unwrap();
    assert_eq!((node.uid, node.gid), (42, 7));

    let error = session
        .chown("/owned", Principal::Name("alice".to_owned()), false)
        .await
        .unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::InvalidParameter));
}

#[tokio::test]
async fn truncate_and_size() {
    let (peer, mut session) = v3().await;
    peer.add_file("/long", b"0123456789");

    session.truncate("/long", 4).await.unwrap();
    assert_eq!(session.size("/long").await.unwrap(), 4);
}

#[tokio::test]
async fn rename_moves_subtree_and_invalidates() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/old");
    peer.add_file("/old/inner", b"i");

    assert!(session.is_dir("/old").await.unwrap());
    session.rename("/old", "/new").await.unwrap();

    assert!(peer.exists("/new/inner"));
    assert!(!session.file_exists("/old").await.unwrap());
    assert!(session.is_file("/new/inner").await.unwrap());
}

#[tokio::test]
async fn symlink_arguments_follow_the_server() {
    for (identifier, linkpath) in [
        (None, "/link"),
        (Some("SSH-2.0-OpenSSH_9.6"), "/target"),
    ] {
        let peer = MockPeer::new(PeerOptions {
            server_identifier: identifier.map(str::to_owned),
            ..Default::default()
        });
        peer.add_file("/target", b"t");
        let mut session = connect(&peer, SessionConfig::default()).await;

        session.symlink("/target", "/link").await.unwrap();
        assert_eq!(
            peer.node("/link").unwrap().kind,
            Kind::Symlink("/target".to_owned())
        );

        let sent = peer.requests().into_iter().find_map(|request| match request {
            Request::Symlink(symlink) => Some(symlink.linkpath),
            _ => None,
        });
        assert_eq!(sent.as_deref(), Some(linkpath));

        assert_eq!(session.readlink("/link").await.unwrap(), "/target");
        assert!(session.is_link("/link").await.unwrap());
        assert!(session.is_file("/link").await.unwrap());
    }
}

#[tokio::test]
async fn version_six_links() {
    let peer = MockPeer::new(PeerOptions {
        versions: Some("3,6".to_owned()),
        ..Default::default()
    });
    peer.add_file("/target", b"t");
    let mut session = connect(&peer, SessionConfig::default().preferred_version(Some(6))).await;

    session.symlink("/target", "/soft").await.unwrap();
    session.hardlink("/target", "/hard").await.unwrap();

    assert_eq!(peer.count(PacketType::Link), 2);
    assert_eq!(peer.count(PacketType::Symlink), 0);
    assert_eq!(peer.node("/hard").unwrap().kind, Kind::File(b"t".to_vec()));
    assert!(session.is_link("/soft").await.unwrap());
}

#[tokio::test]
async fn hardlink_through_extension() {
    let peer = MockPeer::new(PeerOptions {
        extensions: vec![(extensions::HARDLINK.to_owned(), "1".to_owned())],
        ..Default::default()
    });
    peer.add_file("/target", b"t");
    let mut session = connect(&peer, SessionConfig::default()).await;

    session.hardlink("/target", "/hard").await.unwrap();
    assert_eq!(peer.node("/hard").unwrap().kind, Kind::File(b"t".to_vec()));
}

#[tokio::test]
async fn hardlink_unsupported_without_extension() {
    let (peer, mut session) = v3().await;
    peer.add_file("/target", b"t");

    let error = session.hardlink("/target", "/hard").await.unwrap_err();
    assert_eq!(error.status_code(), Some(StatusCode::OpUnsupported));
    assert_eq!(peer.count(PacketType::Extended), 0);
}

#[tokio::test]
async fn subtree_failures_are_aggregated() {
    let peer = MockPeer::new(PeerOptions {
        denied: vec!["/agg/b".to_owned()],
        ..Default::default()
    });
    peer.add_dir("/agg");
    peer.add_file("/agg/a", b"");
    peer.add_file("/agg/b", b"");
    peer.add_file("/agg/c", b"");
    let mut session = connect(&peer, SessionConfig::default()).await;

    let error = session.delete("/agg", true).await.unwrap_err();
    match &error {
        Error::Batch { failed, total, .. } => assert_eq!((*failed, *total), (2, 4)),
        other => panic!("expected an aggregate error, got {other}"),
    }
    assert_eq!(error.status_code(), Some(StatusCode::PermissionDenied));

    // the walk went on past the failure
    assert!(!peer.exists("/agg/a"));
    assert!(!peer.exists("/agg/c"));
    assert!(peer.exists("/agg/b"));
    assert_eq!(paths_of(&peer, PacketType::Remove), ["/agg", "/agg/a", "/agg/b", "/agg/c"]);
}

#[tokio::test]
async fn closed_session_refuses_requests() {
    let (_peer, mut session) = v3().await;

    session.close().await.unwrap();
    assert!(!session.is_connected());
    assert_eq!(session.state(), SessionState::Closed);
    let error = session.stat("/").await.unwrap_err();
    assert!(error.is_transport(), "{error}");
}

#[tokio::test]
async fn large_listing_exceeds_the_packet_cap() {
    let (peer, mut session) = v3().await;
    peer.add_dir("/big");
    for i in 0..2500 {
        peer.add_file(&format!("/big/a-rather-long-file-name-for-listing-{i:05}"), b"");
    }

    let entries = session.list("/big").await.unwrap();
    assert_eq!(entries.len(), 2502);
    assert!(session.is_connected());
    assert!(session.is_file("/big/a-rather-long-file-name-for-listing-02499").await.unwrap());
}

#[tokio::test]
async fn recursive_delete_treats_unlistable_directories_as_empty() {
    let peer = MockPeer::new(PeerOptions {
        unlistable: vec!["/tree/locked".to_owned()],
        ..Default::default()
    });
    peer.add_dir("/tree");
    peer.add_file("/tree/a", b"");
    peer.add_dir("/tree/locked");
    peer.add_file("/tree/locked/x", b"");
    peer.add_file("/tree/z", b"");
    let mut session = connect(&peer, SessionConfig::default()).await;

    let error = session.delete("/tree", true).await.unwrap_err();
    match &error {
        Error::Batch { failed, total, .. } => assert_eq!((*failed, *total), (2, 4)),
        other => panic!("expected an aggregate error, got {other}"),
    }
    assert_eq!(error.status_code(), Some(StatusCode::DirNotEmpty));

    // siblings went, the unlistable directory was still tried
    assert!(!peer.exists("/tree/a"));
    assert!(!peer.exists("/tree/z"));
    assert!(peer.exists("/tree/locked/x"));
    assert_eq!(paths_of(&peer, PacketType::RmDir), ["/tree/locked", "/tree"]);
    assert!(paths_of(&peer, PacketType::OpenDir).contains(&"/tree/locked".to_owned()));
    assert!(session.is_connected());
}

#[tokio::test]
async fn recursive_chmod_sets_unlistable_directories_themselves() {
    let peer = MockPeer::new(PeerOptions {
        unlistable: vec!["/tree/locked".to_owned()],
        denied: vec!["/tree/z".to_owned()],
        ..Default::default()
    });
    peer.add_dir("/tree");
    peer.add_file("/tree/a", b"");
    peer.add_dir("/tree/locked");
    peer.add_file("/tree/locked/x", b"");
    peer.add_file("/tree/z", b"");
    let mut session = connect(&peer, SessionConfig::default()).await;

    let error = session.chmod("/tree", 0o700, true).await.unwrap_err();
    match &error {
        Error::Batch { failed, total, .. } => assert_eq!((*failed, *total), (1, 4)),
        other => panic!("expected an aggregate error, got {other}"),
    }
    assert_eq!(error.status_code(), Some(StatusCode::PermissionDenied));

    assert_eq!(
        paths_of(&peer, PacketType::SetStat),
        ["/tree/a", "/tree/locked", "/tree/z", "/tree"]
    );
    assert_eq!(peer.node("/tree/locked").unwrap().permissions, 0o700);
    assert_eq!(peer.node("/tree/locked/x").unwrap().permissions, 0o644);
    assert_eq!(peer.node("/tree").unwrap().permissions, 0o700);
}

#[tokio::test]
async fn lost_channel_fails_the_session() {
    let (peer, mut session) = v3().await;
    assert_eq!(session.state(), SessionState::Ready);

    peer.state().closed = true;
    let error = session.stat("/fresh").await.unwrap_err();
    assert!(error.is_transport(), "{error}");
    assert!(!session.is_connected());
    assert_eq!(session.state(), SessionState::Failed);
}
