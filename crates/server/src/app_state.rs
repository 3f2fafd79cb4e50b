use crate::{chat::ChatRelay, session::SessionStore};
use server_api::ApiContext;
use storage::Storage;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) storage: Storage,
    pub(crate) sessions: SessionStore,
    pub(crate) chat: ChatRelay,
}
