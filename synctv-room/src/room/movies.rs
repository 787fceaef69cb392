use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::models::{now_millis, Movie, MovieBase, MovieId, MovieInfo};

struct Node {
    movie: Movie,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked list stored in a slot arena, indexed by movie id.
///
/// Freed slots are recycled, so a slot index is only meaningful while the
/// movie it was assigned to is still in the list.
#[derive(Default)]
struct MovieList {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<MovieId, usize>,
}

impl MovieList {
    fn node(&self, slot: usize) -> &Node {
        self.slots[slot]
            .as_ref()
            .unwrap_or_else(|| unreachable!("index points at a vacant slot"))
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        self.slots[slot]
            .as_mut()
            .unwrap_or_else(|| unreachable!("index points at a vacant slot"))
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            slot
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn push_back(&mut self, movie: Movie) -> Result<()> {
        if self.index.contains_key(&movie.id) {
            return Err(Error::AlreadyExists(format!("movie {}", movie.id)));
        }
        let id = movie.id;
        let slot = self.alloc(Node {
            movie,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(id, slot);
        Ok(())
    }

    fn push_front(&mut self, movie: Movie) -> Result<()> {
        if self.index.contains_key(&movie.id) {
            return Err(Error::AlreadyExists(format!("movie {}", movie.id)));
        }
        let id = movie.id;
        let slot = self.alloc(Node {
            movie,
            prev: None,
            next: self.head,
        });
        match self.head {
            Some(head) => self.node_mut(head).prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        self.index.insert(id, slot);
        Ok(())
    }

    fn unlink(&mut self, slot: usize) -> Movie {
        let node = self.slots[slot]
            .take()
            .unwrap_or_else(|| unreachable!("unlinking a vacant slot"));
        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }
        self.free.push(slot);
        self.index.remove(&node.movie.id);
        node.movie
    }

    /// Positions stay put; only the payloads trade places
    fn swap(&mut self, a: MovieId, b: MovieId) -> Result<()> {
        let sa = *self
            .index
            .get(&a)
            .ok_or_else(|| Error::NotFound(format!("movie {a}")))?;
        let sb = *self
            .index
            .get(&b)
            .ok_or_else(|| Error::NotFound(format!("movie {b}")))?;
        if sa == sb {
            return Ok(());
        }

        let (lo, hi) = (sa.min(sb), sa.max(sb));
        let (left, right) = self.slots.split_at_mut(hi);
        match (left[lo].as_mut(), right[0].as_mut()) {
            (Some(x), Some(y)) => std::mem::swap(&mut x.movie, &mut y.movie),
            _ => unreachable!("index points at a vacant slot"),
        }
        self.index.insert(a, sb);
        self.index.insert(b, sa);
        Ok(())
    }

    fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn clear(&mut self) -> Vec<Movie> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.slots[slot]
                .take()
                .unwrap_or_else(|| unreachable!("list links a vacant slot"));
            cursor = node.next;
            out.push(node.movie);
        }
        *self = Self::default();
        out
    }
}

struct Iter<'a> {
    list: &'a MovieList,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Movie;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?);
        self.cursor = node.next;
        Some(&node.movie)
    }
}

/// The room's ordered playlist
#[derive(Default)]
pub struct Movies {
    list: RwLock<MovieList>,
}

impl Movies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back_movie(&self, movie: Movie) -> Result<()> {
        self.list.write().push_back(movie)
    }

    pub fn push_front_movie(&self, movie: Movie) -> Result<()> {
        self.list.write().push_front(movie)
    }

    /// Removes every listed movie or none of them.
    ///
    /// Repeated ids are removed once. The removed entries are returned in the
    /// order their ids were given so the caller can release their resources.
    pub fn get_and_del_movie(&self, ids: &[MovieId]) -> Result<Vec<Movie>> {
        let mut list = self.list.write();
        if let Some(missing) = ids.iter().find(|id| !list.index.contains_key(*id)) {
            return Err(Error::NotFound(format!("movie {missing}")));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(slot) = list.index.get(id).copied() {
                removed.push(list.unlink(slot));
            }
        }
        Ok(removed)
    }

    /// Empties the playlist, returning entries in playlist order
    pub fn get_and_clear(&self) -> Vec<Movie> {
        self.list.write().clear()
    }

    pub fn swap_movie(&self, a: MovieId, b: MovieId) -> Result<()> {
        self.list.write().swap(a, b)
    }

    /// Runs `f` against the stored entry under the read lock
    pub fn with_movie<R>(&self, id: MovieId, f: impl FnOnce(&Movie) -> R) -> Result<R> {
        let list = self.list.read();
        let slot = *list
            .index
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("movie {id}")))?;
        Ok(f(&list.node(slot).movie))
    }

    pub fn movie_info(&self, id: MovieId) -> Result<MovieInfo> {
        self.with_movie(id, Movie::info)
    }

    #[must_use]
    pub fn has_movie(&self, id: MovieId) -> bool {
        self.list.read().index.contains_key(&id)
    }

    /// Replaces the source fields of an entry and its live key
    pub fn edit_movie(&self, id: MovieId, base: MovieBase, pull_key: String) -> Result<MovieInfo> {
        let mut list = self.list.write();
        let slot = *list
            .index
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("movie {id}")))?;
        let movie = &mut list.node_mut(slot).movie;
        movie.base = base;
        movie.pull_key = pull_key;
        movie.last_edit_at = now_millis();
        Ok(movie.info())
    }

    #[must_use]
    pub fn ids(&self) -> Vec<MovieId> {
        self.list.read().iter().map(Movie::id).collect()
    }

    #[must_use]
    pub fn movie_list(&self) -> Vec<MovieInfo> {
        self.list.read().iter().map(Movie::info).collect()
    }

    /// One page of the playlist plus the total entry count
    #[must_use]
    pub fn movies_page(&self, offset: usize, limit: usize) -> (Vec<MovieInfo>, usize) {
        let list = self.list.read();
        let page = list.iter().skip(offset).take(limit).map(Movie::info).collect();
        (page, list.index.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list.read().index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::fast_config;
    use crate::room::User;
    use std::sync::Arc;

    async fn creator() -> Arc<User> {
        Arc::new(User::new("alice", "", &fast_config(), []).await.unwrap())
    }

    fn movie(id: u64, creator: &Arc<User>) -> Movie {
        Movie::new(
            MovieId(id),
            MovieBase {
                url: format!("https://example.com/{id}.mp4"),
                name: format!("movie {id}"),
                ..MovieBase::default()
            },
            creator.clone(),
        )
    }

    fn ids(raw: &[u64]) -> Vec<MovieId> {
        raw.iter().copied().map(MovieId).collect()
    }

    #[tokio::test]
    async fn test_push_order() {
        let u = creator().await;
        let movies = Movies::new();
        movies.push_back_movie(movie(1, &u)).unwrap();
        movies.push_back_movie(movie(2, &u)).unwrap();
        movies.push_front_movie(movie(3, &u)).unwrap();
        assert_eq!(movies.ids(), ids(&[3, 1, 2]));
        assert_eq!(movies.len(), 3);

        let err = movies.push_back_movie(movie(2, &u)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_lookup_returns_stored_fields() {
        let u = creator().await;
        let movies = Movies::new();
        let m = movie(5, &u);
        let expected = m.info();
        movies.push_back_movie(m).unwrap();

        assert_eq!(movies.movie_info(MovieId(5)).unwrap(), expected);
        let creator_name = movies
            .with_movie(MovieId(5), |m| m.creator().name().to_string())
            .unwrap();
        assert_eq!(creator_name, "alice");
        assert!(movies.movie_info(MovieId(6)).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_batch_delete_is_all_or_nothing() {
        let u = creator().await;
        let movies = Movies::new();
        for id in 1..=4 {
            movies.push_back_movie(movie(id, &u)).unwrap();
        }

        let err = movies.get_and_del_movie(&ids(&[1, 9])).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(movies.len(), 4);

        let removed = movies.get_and_del_movie(&ids(&[3, 1, 3])).unwrap();
        let removed: Vec<_> = removed.iter().map(Movie::id).collect();
        assert_eq!(removed, ids(&[3, 1]));
        assert_eq!(movies.ids(), ids(&[2, 4]));
        assert!(!movies.has_movie(MovieId(1)));
    }

    #[tokio::test]
    async fn test_slots_are_reused() {
        let u = creator().await;
        let movies = Movies::new();
        movies.push_back_movie(movie(1, &u)).unwrap();
        movies.push_back_movie(movie(2, &u)).unwrap();
        movies.get_and_del_movie(&ids(&[1])).unwrap();
        movies.push_front_movie(movie(3, &u)).unwrap();
        movies.push_back_movie(movie(4, &u)).unwrap();
        assert_eq!(movies.ids(), ids(&[3, 2, 4]));
        assert_eq!(movies.list.read().slots.len(), 3);
    }

    #[tokio::test]
    async fn test_swap_twice_restores_order() {
        let u = creator().await;
        let movies = Movies::new();
        for id in 1..=5 {
            movies.push_back_movie(movie(id, &u)).unwrap();
        }

        movies.swap_movie(MovieId(1), MovieId(4)).unwrap();
        assert_eq!(movies.ids(), ids(&[4, 2, 3, 1, 5]));
        assert_eq!(movies.movie_info(MovieId(1)).unwrap().id, MovieId(1));

        movies.swap_movie(MovieId(1), MovieId(4)).unwrap();
        assert_eq!(movies.ids(), ids(&[1, 2, 3, 4, 5]));

        // Adjacent entries
        movies.swap_movie(MovieId(2), MovieId(3)).unwrap();
        assert_eq!(movies.ids(), ids(&[1, 3, 2, 4, 5]));
    }

    #[tokio::test]
    async fn test_swap_edge_cases() {
        let u = creator().await;
        let movies = Movies::new();
        movies.push_back_movie(movie(1, &u)).unwrap();
        movies.push_back_movie(movie(2, &u)).unwrap();

        movies.swap_movie(MovieId(1), MovieId(1)).unwrap();
        assert_eq!(movies.ids(), ids(&[1, 2]));
        assert!(movies.swap_movie(MovieId(7), MovieId(7)).unwrap_err().is_not_found());
        assert!(movies.swap_movie(MovieId(1), MovieId(7)).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clear_and_page() {
        let u = creator().await;
        let movies = Movies::new();
        for id in 1..=5 {
            movies.push_back_movie(movie(id, &u)).unwrap();
        }

        let (page, total) = movies.movies_page(1, 2);
        assert_eq!(total, 5);
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), ids(&[2, 3]));
        let (page, _) = movies.movies_page(4, 10);
        assert_eq!(page.len(), 1);

        let cleared: Vec<_> = movies.get_and_clear().iter().map(Movie::id).collect();
        assert_eq!(cleared, ids(&[1, 2, 3, 4, 5]));
        assert!(movies.is_empty());
        movies.push_back_movie(movie(6, &u)).unwrap();
        assert_eq!(movies.ids(), ids(&[6]));
    }

    #[tokio::test]
    async fn test_edit_movie() {
        let u = creator().await;
        let movies = Movies::new();
        movies.push_back_movie(movie(1, &u)).unwrap();
        let before = movies.movie_info(MovieId(1)).unwrap();

        let base = MovieBase {
            url: "https://example.com/new.m3u8".to_string(),
            name: "renamed".to_string(),
            ..MovieBase::default()
        };
        let after = movies.edit_movie(MovieId(1), base, String::new()).unwrap();
        assert_eq!(after.base.name, "renamed");
        assert_eq!(after.create_at, before.create_at);
        assert!(after.last_edit_at >= before.last_edit_at);
        assert!(movies
            .edit_movie(MovieId(2), MovieBase::default(), String::new())
            .unwrap_err()
            .is_not_found());
    }
}
