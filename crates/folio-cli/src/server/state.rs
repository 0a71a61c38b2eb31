use std::sync::Arc;

use folio_engine::Desk;
use ring::digest;

#[derive(Clone)]
pub struct AppState {
    pub desk: Desk,
    admin_token_digest: Arc<[u8]>,
}

impl AppState {
    pub fn new(desk: Desk, admin_token: &str) -> Self {
        Self {
            desk,
            admin_token_digest: sha256(admin_token).into(),
        }
    }

    /// Compared by SHA-256 digest, never by the raw token.
    pub fn is_admin(&self, presented: &str) -> bool {
        sha256(presented).as_slice() == &*self.admin_token_digest
    }
}

fn sha256(s: &str) -> Vec<u8> {
    digest::digest(&digest::SHA256, s.as_bytes()).as_ref().to_vec()
}
