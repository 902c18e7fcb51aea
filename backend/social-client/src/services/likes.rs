//! Optimistic like toggle for one post
//!
//! A toggle flips the local liker set at once and queues a delta command.
//! One writer task per post persists the commands in order; each write sends
//! the last acknowledged set with that delta applied. When a write fails for
//! good its command is dropped and the local set is rebuilt from the
//! acknowledged set plus the deltas still queued.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::dispatcher::{MutationDispatcher, QueryKey};
use crate::domain::{LikerSet, Post};
use crate::error::{ClientError, ClientResult};
use crate::repository::PostRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeDelta {
    AddLiker(String),
    RemoveLiker(String),
}

impl LikeDelta {
    pub fn user_id(&self) -> &str {
        match self {
            LikeDelta::AddLiker(user_id) | LikeDelta::RemoveLiker(user_id) => user_id,
        }
    }

    fn apply(&self, likes: &mut LikerSet) {
        match self {
            LikeDelta::AddLiker(user_id) => {
                likes.insert(user_id);
            }
            LikeDelta::RemoveLiker(user_id) => {
                likes.remove(user_id);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeCommand {
    pub version: u64,
    pub delta: LikeDelta,
}

/// What the UI shows right after a toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeSnapshot {
    pub likes: LikerSet,
    pub liked: bool,
    pub count: usize,
    pub version: u64,
}

struct LikeState {
    confirmed: LikerSet,
    pending: VecDeque<LikeCommand>,
    local: LikerSet,
    next_version: u64,
    last_error: Option<String>,
}

impl LikeState {
    fn rebuild_local(&mut self) {
        let mut local = self.confirmed.clone();
        for command in &self.pending {
            command.delta.apply(&mut local);
        }
        self.local = local;
    }
}

pub struct LikeController {
    post_id: String,
    state: Arc<Mutex<LikeState>>,
    commands: mpsc::UnboundedSender<LikeCommand>,
    pending_tx: Arc<watch::Sender<usize>>,
    pending_rx: watch::Receiver<usize>,
}

impl LikeController {
    /// Seed from the post's liker set and start its writer task
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(post: &Post, posts: PostRepository, dispatcher: Arc<MutationDispatcher>) -> Self {
        let state = Arc::new(Mutex::new(LikeState {
            confirmed: post.likes.clone(),
            pending: VecDeque::new(),
            local: post.likes.clone(),
            next_version: 1,
            last_error: None,
        }));
        let (commands, receiver) = mpsc::unbounded_channel();
        let (pending_tx, pending_rx) = watch::channel(0usize);
        let pending_tx = Arc::new(pending_tx);

        tokio::spawn(run_writer(
            post.id.clone(),
            receiver,
            Arc::clone(&state),
            Arc::clone(&pending_tx),
            posts,
            dispatcher,
        ));

        Self {
            post_id: post.id.clone(),
            state,
            commands,
            pending_tx,
            pending_rx,
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    /// Flip `user_id` in the local liker set and queue the write
    pub fn toggle_like(&self, user_id: &str) -> ClientResult<LikeSnapshot> {
        if user_id.trim().is_empty() {
            return Err(ClientError::ValidationFailed(
                "A signed-in user is required to like a post".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let delta = if state.local.contains(user_id) {
            LikeDelta::RemoveLiker(user_id.to_string())
        } else {
            LikeDelta::AddLiker(user_id.to_string())
        };

        let command = LikeCommand {
            version: state.next_version,
            delta,
        };
        // queue first so a stopped writer leaves the local set untouched
        self.commands.send(command.clone()).map_err(|_| {
            ClientError::RequestFailed(format!("like writer for post {} stopped", self.post_id))
        })?;

        state.next_version += 1;
        command.delta.apply(&mut state.local);
        state.pending.push_back(command.clone());
        self.pending_tx.send_replace(state.pending.len());

        debug!(post_id = %self.post_id, version = command.version, delta = ?command.delta, "Like toggled");

        Ok(LikeSnapshot {
            liked: state.local.contains(user_id),
            count: state.local.len(),
            likes: state.local.clone(),
            version: command.version,
        })
    }

    pub fn likes(&self) -> LikerSet {
        self.state.lock().local.clone()
    }

    pub fn like_count(&self) -> usize {
        self.state.lock().local.len()
    }

    pub fn has_liked(&self, user_id: &str) -> bool {
        self.state.lock().local.contains(user_id)
    }

    /// Liker set as last acknowledged by the store
    pub fn confirmed_likes(&self) -> LikerSet {
        self.state.lock().confirmed.clone()
    }

    pub fn pending_writes(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Error of the most recent write that was rolled back
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Wait until every queued write has been persisted or rolled back
    pub async fn settled(&self) {
        let mut pending = self.pending_rx.clone();
        // an Err means the writer is gone, so nothing is left in flight
        let _ = pending.wait_for(|count| *count == 0).await;
    }
}

async fn run_writer(
    post_id: String,
    mut receiver: mpsc::UnboundedReceiver<LikeCommand>,
    state: Arc<Mutex<LikeState>>,
    pending_tx: Arc<watch::Sender<usize>>,
    posts: PostRepository,
    dispatcher: Arc<MutationDispatcher>,
) {
    let mutation = format!("like:{}", post_id);

    while let Some(command) = receiver.recv().await {
        let invalidates = [
            QueryKey::Post(post_id.clone()),
            QueryKey::RecentPosts,
            QueryKey::LikedPosts(command.delta.user_id().to_string()),
            QueryKey::AnyUser,
        ];
        let target = {
            let mut target = state.lock().confirmed.clone();
            command.delta.apply(&mut target);
            target
        };

        let result = dispatcher
            .dispatch(&mutation, &invalidates, |_| {
                let posts = posts.clone();
                let post_id = post_id.clone();
                let target = target.clone();
                async move { posts.update_likes(&post_id, &target).await }
            })
            .await;

        {
            let mut guard = state.lock();
            guard.pending.retain(|c| c.version != command.version);
            match result {
                Ok(post) => {
                    guard.confirmed = post.likes;
                    guard.last_error = None;
                }
                Err(ClientError::InvalidDocument(reason)) => {
                    // the store accepted the write, only its echo failed to decode
                    warn!(
                        post_id = %post_id,
                        version = command.version,
                        reason = %reason,
                        "Like write stored but response unreadable"
                    );
                    guard.confirmed = target;
                    guard.last_error = None;
                }
                Err(e) => {
                    warn!(
                        post_id = %post_id,
                        version = command.version,
                        error = %e,
                        "Like write failed, rolling back"
                    );
                    guard.last_error = Some(e.to_string());
                }
            }
            guard.rebuild_local();
            pending_tx.send_replace(guard.pending.len());
        }
    }

    info!(post_id = %post_id, "Like writer stopped");
}
