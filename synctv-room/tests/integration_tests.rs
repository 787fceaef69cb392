//! End-to-end room behavior through the public API.
//!
//! Run with: cargo test --test integration_tests

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use synctv_room::config::{HubConfig, PasswordConfig, RoomConfig};
use synctv_room::models::{Message, MovieBase, MovieId};
use synctv_room::{ClientConn, Error, LiveServer, MemoryConn, MemoryLiveServer, Room, RoomManager, RoomOption, User};
use synctv_vendors::VendorRegistry;
use tokio::time::timeout;

fn test_config() -> RoomConfig {
    RoomConfig {
        hub: HubConfig {
            client_queue_capacity: 256,
            send_timeout_ms: 500,
            seek_tolerance_secs: 1.0,
        },
        password: PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
    }
}

fn manager() -> (RoomManager, Arc<MemoryLiveServer>) {
    let live = Arc::new(MemoryLiveServer::new());
    let vendors = Arc::new(VendorRegistry::new().unwrap());
    (RoomManager::new(live.clone(), vendors, test_config()), live)
}

fn vod(name: &str) -> MovieBase {
    MovieBase {
        url: format!("https://example.com/{name}.mp4"),
        name: name.to_string(),
        ..MovieBase::default()
    }
}

fn live_source(name: &str) -> MovieBase {
    MovieBase {
        url: format!("rtmp://example.com/{name}"),
        name: name.to_string(),
        live: true,
        proxy: true,
        ..MovieBase::default()
    }
}

async fn next_where(peer: &MemoryConn, pred: impl Fn(&Message) -> bool) -> Option<Message> {
    loop {
        let frame = timeout(Duration::from_millis(500), peer.recv())
            .await
            .ok()??
            .ok()?;
        let message: Message = serde_json::from_str(&frame).unwrap();
        if pred(&message) {
            return Some(message);
        }
    }
}

#[tokio::test]
async fn test_room_lifecycle() {
    let (manager, live) = manager();
    let root = Arc::new(
        User::new("owner", "owner-pass", &test_config().password, [])
            .await
            .unwrap(),
    );
    let room = manager
        .create_room("movie-night", "letmein", [RoomOption::with_root_user(root.clone())])
        .await
        .unwrap();

    assert!(room.is_initialized());
    assert!(room.need_password());
    assert!(room.check_password("letmein").await);
    assert!(root.is_admin());
    assert!(Arc::ptr_eq(&root.room().unwrap(), &room));
    assert!(matches!(
        manager.create_room("movie-night", "", []).await,
        Err(Error::AlreadyExists(_))
    ));

    let guest = room.new_user("guest", "", []).await.unwrap();
    let (conn, peer) = MemoryConn::pair();
    room.reg_client(guest.clone(), Arc::new(conn)).unwrap();

    let a = room
        .push_back_movie(room.new_movie(vod("a"), root.clone()))
        .await
        .unwrap();
    let stream = room
        .push_back_movie(room.new_movie(live_source("cam"), guest.clone()))
        .await
        .unwrap();
    assert!(next_where(&peer, |m| matches!(m, Message::ChangeMovies)).await.is_some());
    assert_eq!(live.app("movie-night").unwrap().channel_count(), 1);

    room.change_current_movie(a.id).unwrap();
    match next_where(&peer, |m| matches!(m, Message::ChangeCurrent { .. })).await {
        Some(Message::ChangeCurrent { current }) => {
            assert_eq!(current.movie.map(|m| m.id), Some(a.id));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    room.del_movie(&[stream.id]).await.unwrap();
    assert_eq!(live.app("movie-night").unwrap().channel_count(), 0);
    assert_eq!(room.movie_ids(), vec![a.id]);

    manager.delete_room("movie-night").await.unwrap();
    assert!(room.closed());
    assert!(matches!(manager.get_room("movie-night"), Err(Error::NotFound(_))));
    timeout(Duration::from_secs(1), peer.closed()).await.unwrap();
    assert!(live.app("movie-night").is_none());
    assert!(matches!(
        room.push_back_movie(room.new_movie(vod("late"), root)).await,
        Err(Error::AlreadyClosed)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_playlist_edits_stay_consistent() {
    let live: Arc<dyn LiveServer> = Arc::new(MemoryLiveServer::new());
    let room = Room::new("busy", "", live, [RoomOption::with_config(test_config())])
        .await
        .unwrap();
    room.init();
    room.start();
    let user = room.new_user("u", "", []).await.unwrap();

    // Each task pushes its own entries, then deletes every other one
    let mut tasks = Vec::new();
    for worker in 0..8 {
        let room = room.clone();
        let user = user.clone();
        tasks.push(tokio::spawn(async move {
            let mut kept = Vec::new();
            for i in 0..25 {
                let info = room
                    .push_back_movie(room.new_movie(vod(&format!("w{worker}-{i}")), user.clone()))
                    .await
                    .unwrap();
                if i % 2 == 0 {
                    room.del_movie(&[info.id]).await.unwrap();
                } else {
                    kept.push(info.id);
                }
            }
            kept
        }));
    }

    let mut expected = BTreeSet::new();
    for task in tasks {
        expected.extend(task.await.unwrap());
    }

    // Swaps reorder but never change membership, even while entries vanish
    let ids = room.movie_ids();
    assert_eq!(ids.iter().copied().collect::<BTreeSet<_>>(), expected);
    assert_eq!(ids.len(), 8 * 12);
    let (doomed, survivors): (Vec<MovieId>, Vec<MovieId>) =
        ids.iter().copied().partition(|id| id.as_u64() % 3 == 0);

    let pusher = {
        let room = room.clone();
        let user = user.clone();
        tokio::spawn(async move {
            let mut pushed = Vec::new();
            for i in 0..20 {
                let movie = room.new_movie(vod(&format!("late-{i}")), user.clone());
                let info = if i % 2 == 0 {
                    room.push_front_movie(movie).await
                } else {
                    room.push_back_movie(movie).await
                };
                pushed.push(info.unwrap().id);
                tokio::task::yield_now().await;
            }
            pushed
        })
    };
    let mut tasks = Vec::new();
    for chunk in doomed.chunks(4) {
        let room = room.clone();
        let chunk = chunk.to_vec();
        tasks.push(tokio::spawn(async move {
            for id in chunk {
                room.del_movie(&[id]).await.unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for offset in 0..4 {
        let room = room.clone();
        let ids = ids.clone();
        tasks.push(tokio::spawn(async move {
            for (i, &a) in ids.iter().enumerate().skip(offset) {
                let b = ids[(i * 7 + offset) % ids.len()];
                match room.swap_movie(a, b) {
                    Ok(()) => {}
                    Err(Error::NotFound(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    let pushed = pusher.await.unwrap();

    let expected: BTreeSet<MovieId> = expected
        .into_iter()
        .filter(|id| survivors.contains(id))
        .chain(pushed.iter().copied())
        .collect();
    let actual: BTreeSet<MovieId> = room.movie_ids().into_iter().collect();
    assert_eq!(actual, expected);
    assert_eq!(room.movie_num(), survivors.len() + pushed.len());
    assert_eq!(room.movie_list().len(), room.movie_num());
}

#[tokio::test]
async fn test_public_rooms_and_idle_cleanup() {
    let (manager, _) = manager();
    manager.create_room("open", "", []).await.unwrap();
    manager
        .create_room("secret", "", [RoomOption::with_hidden(true)])
        .await
        .unwrap();

    let public: Vec<String> = manager
        .public_rooms()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(public, vec!["open".to_string()]);
    assert_eq!(manager.room_num(), 2);

    // Nothing is idle for an hour yet
    assert!(manager.close_inactive(Duration::from_secs(3600)).await.is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut closed = manager.close_inactive(Duration::from_millis(1)).await;
    closed.sort();
    assert_eq!(closed, vec!["open".to_string(), "secret".to_string()]);
    assert_eq!(manager.room_num(), 0);
}

#[tokio::test]
async fn test_close_all_shuts_rooms_and_vendors() {
    let (manager, _) = manager();
    let a = manager.create_room("a", "", []).await.unwrap();
    let b = manager.create_room("b", "", []).await.unwrap();

    manager.close_all().await;

    assert!(a.closed());
    assert!(b.closed());
    assert_eq!(manager.room_num(), 0);
    assert!(manager.vendors().is_closed());
    // Lookups still resolve to the local client
    let _ = manager.vendors().load_emby_client("anything");
}
