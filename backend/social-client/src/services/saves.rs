use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use super::dispatcher::{MutationDispatcher, QueryKey};
use crate::domain::{SaveRelation, UserProfile};
use crate::error::{ClientError, ClientResult};
use crate::repository::SaveRepository;

struct SaveState {
    relation: Option<SaveRelation>,
    is_saved: bool,
    busy: bool,
}

/// Optimistic save (bookmark) toggle for one user and one post
///
/// Only one toggle may be in flight; a second call while busy is refused
/// without touching the store.
pub struct SaveController {
    user_id: String,
    post_id: String,
    state: Arc<Mutex<SaveState>>,
    saves: SaveRepository,
    dispatcher: Arc<MutationDispatcher>,
}

/// Clears the busy flag however the toggle ends, including cancellation
struct BusyGuard(Arc<Mutex<SaveState>>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.lock().busy = false;
    }
}

impl SaveController {
    /// Seed from the save relations embedded in the current user's profile
    pub fn new(
        user: &UserProfile,
        post_id: &str,
        saves: SaveRepository,
        dispatcher: Arc<MutationDispatcher>,
    ) -> Self {
        let relation = user.saved_relation(post_id).cloned();
        Self {
            user_id: user.id.clone(),
            post_id: post_id.to_string(),
            state: Arc::new(Mutex::new(SaveState {
                is_saved: relation.is_some(),
                relation,
                busy: false,
            })),
            saves,
            dispatcher,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.state.lock().is_saved
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    pub fn relation(&self) -> Option<SaveRelation> {
        self.state.lock().relation.clone()
    }

    fn mutation_name(&self) -> String {
        format!("save:{}:{}", self.user_id, self.post_id)
    }

    /// Flip the saved state; returns the new `is_saved`
    pub async fn toggle_save(&self) -> ClientResult<bool> {
        if self.user_id.is_empty() {
            return Err(ClientError::ValidationFailed(
                "A signed-in user is required to save a post".to_string(),
            ));
        }

        let relation = {
            let mut state = self.state.lock();
            if state.busy {
                return Err(ClientError::Busy(format!(
                    "save of post {} is still in flight",
                    self.post_id
                )));
            }
            state.busy = true;
            state.is_saved = state.relation.is_none();
            state.relation.clone()
        };
        let _busy = BusyGuard(Arc::clone(&self.state));

        let invalidates = [
            QueryKey::AnyUser,
            QueryKey::SavedPosts(self.user_id.clone()),
            QueryKey::RecentPosts,
        ];

        match relation {
            Some(existing) => {
                debug!(post_id = %self.post_id, save_id = %existing.id, "Removing save");
                let result = self
                    .dispatcher
                    .dispatch(&self.mutation_name(), &invalidates, |_| {
                        let saves = self.saves.clone();
                        let save_id = existing.id.clone();
                        async move {
                            match saves.delete_save(&save_id).await {
                                // already gone counts as removed
                                Err(ClientError::NotFound(_)) => Ok(()),
                                other => other,
                            }
                        }
                    })
                    .await;

                let mut state = self.state.lock();
                match result {
                    Ok(()) => {
                        state.relation = None;
                        state.is_saved = false;
                        Ok(false)
                    }
                    Err(e) => {
                        warn!(post_id = %self.post_id, error = %e, "Unsave failed, rolling back");
                        state.is_saved = true;
                        Err(e)
                    }
                }
            }
            None => {
                debug!(post_id = %self.post_id, user_id = %self.user_id, "Creating save");
                let result = self
                    .dispatcher
                    .dispatch(&self.mutation_name(), &invalidates, |attempt| {
                        let saves = self.saves.clone();
                        let user_id = self.user_id.clone();
                        let post_id = self.post_id.clone();
                        async move {
                            // a timed-out attempt may still have created the relation
                            if attempt > 1 {
                                saves.ensure_save(&user_id, &post_id).await
                            } else {
                                saves.create_save(&user_id, &post_id).await
                            }
                        }
                    })
                    .await;

                let mut state = self.state.lock();
                match result {
                    Ok(relation) => {
                        state.relation = Some(relation);
                        state.is_saved = true;
                        Ok(true)
                    }
                    Err(e) => {
                        warn!(post_id = %self.post_id, error = %e, "Save failed, rolling back");
                        state.is_saved = false;
                        Err(e)
                    }
                }
            }
        }
    }
}
